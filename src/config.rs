use serde::{Deserialize, Serialize};

use crate::{
    compression::Compression,
    error::{Error, Result},
};

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Options for a single write to a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Size in bytes of every chunk but the last (default: 16MB). Must match
    /// the tensor's existing chunk size.
    pub chunk_size: usize,

    /// Codec and what it is applied to (default: uncompressed). Must match
    /// the tensor's existing compression.
    pub compression: Compression,

    /// Whether the array's first dimension indexes samples (default: true).
    /// Otherwise the whole array is written as one sample.
    pub batched: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: Compression::default(),
            batched: true,
        }
    }
}

impl WriteOptions {
    pub fn new(chunk_size: usize, compression: Compression) -> Self {
        Self {
            chunk_size,
            compression,
            ..Default::default()
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn batched(mut self, batched: bool) -> Self {
        self.batched = batched;
        self
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(s)
            .map_err(|e| Error::InvalidOptions(format!("malformed options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidOptions("chunk_size must be positive".into()));
        }
        Ok(())
    }
}
