use std::{borrow::Cow, fmt, io::Cursor};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Codec {
    Uncompressed,
    Lz4,
    Zstd { level: i32 },
}

impl Codec {
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Uncompressed => Ok(data.to_vec()),
            Codec::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Codec::Zstd { level } => zstd::encode_all(Cursor::new(data), *level)
                .map_err(|e| Error::Codec(format!("zstd compress: {}", e))),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Uncompressed => Ok(data.to_vec()),
            Codec::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| Error::Codec(format!("lz4 decompress: {}", e))),
            Codec::Zstd { .. } => zstd::decode_all(Cursor::new(data))
                .map_err(|e| Error::Codec(format!("zstd decompress: {}", e))),
        }
    }

    fn is_identity(&self) -> bool {
        matches!(self, Codec::Uncompressed)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Uncompressed => write!(f, "uncompressed"),
            Codec::Lz4 => write!(f, "lz4"),
            Codec::Zstd { level } => write!(f, "zstd({})", level),
        }
    }
}

// What a codec gets applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    // Each sample is compressed whole before it is split into chunks. Chunks
    // then hold already-compressed bytes and are never compressed again.
    Sample,
    // Samples are split raw. A chunk is compressed once it reaches the full
    // chunk size; the trailing incomplete chunk stays raw so the next write
    // can append to it.
    Chunk,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Sample => write!(f, "sample"),
            Subject::Chunk => write!(f, "chunk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    pub codec: Codec,
    pub subject: Subject,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::uncompressed()
    }
}

impl Compression {
    pub fn new(codec: Codec, subject: Subject) -> Self {
        Compression { codec, subject }
    }

    pub fn uncompressed() -> Self {
        Compression::new(Codec::Uncompressed, Subject::Sample)
    }

    /// The bytes handed to the chunk splitter for one raw sample.
    pub fn encode_sample<'a>(&self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self.subject {
            Subject::Sample if !self.codec.is_identity() => {
                Ok(Cow::Owned(self.codec.compress(raw)?))
            }
            _ => Ok(Cow::Borrowed(raw)),
        }
    }

    /// The bytes actually stored for a chunk holding `chunk` (its
    /// pre-storage form). Only full chunks under the chunk subject are
    /// compressed.
    pub fn encode_chunk<'a>(&self, chunk: &'a [u8], chunk_size: usize) -> Result<Cow<'a, [u8]>> {
        match self.subject {
            Subject::Chunk if chunk.len() == chunk_size && !self.codec.is_identity() => {
                Ok(Cow::Owned(self.codec.compress(chunk)?))
            }
            _ => Ok(Cow::Borrowed(chunk)),
        }
    }

    /// Inverse of `encode_chunk`. `complete` says whether the chunk was full
    /// when it was stored.
    pub fn decode_chunk<'a>(&self, stored: &'a [u8], complete: bool) -> Result<Cow<'a, [u8]>> {
        match self.subject {
            Subject::Chunk if complete && !self.codec.is_identity() => {
                Ok(Cow::Owned(self.codec.decompress(stored)?))
            }
            _ => Ok(Cow::Borrowed(stored)),
        }
    }

    /// Inverse of `encode_sample`.
    pub fn decode_sample<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self.subject {
            Subject::Sample if !self.codec.is_identity() => {
                Ok(Cow::Owned(self.codec.decompress(payload)?))
            }
            _ => Ok(Cow::Borrowed(payload)),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.codec, self.subject)
    }
}
