use tracing::{debug, trace, warn};

use crate::{
    array::Sample,
    chunker::split,
    compression::Compression,
    error::{Error, Result},
    index_map::{chunk_key, chunk_name, tail_continuation, IndexMap, IndexMapEntry},
    meta::Meta,
    store::Storage,
};

// The tensor's incomplete chunk, as seen by a write in progress.
#[derive(Debug)]
enum Tail {
    // Left behind by an earlier write and not touched yet.
    Stored { name: String, occupied: usize },
    // Being filled by this write, in pre-storage form. `committed` is set
    // when the chunk already exists in the store.
    Buffered {
        name: String,
        bytes: Vec<u8>,
        committed: bool,
    },
}

impl Tail {
    fn occupied(&self) -> usize {
        match self {
            Tail::Stored { occupied, .. } => *occupied,
            Tail::Buffered { bytes, .. } => bytes.len(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Tail::Stored { name, .. } | Tail::Buffered { name, .. } => name,
        }
    }
}

fn tail_matches_last_entry(index_map: &IndexMap, name: &str, occupied: usize) -> bool {
    match index_map.entries().last() {
        Some(last) => {
            last.chunk_names.last().map(String::as_str) == Some(name) && last.end_byte == occupied
        }
        None => false,
    }
}

// Turns samples into chunks for one write call. Chunk indices come from a
// counter seeded from the committed index map.
//
// New chunks are stored as soon as they are full. The only chunk that is ever
// rewritten is the one left incomplete by an earlier write; that rewrite is
// held back until `finish`, so it happens once, after every new chunk and
// right before the index map and meta are committed.
#[derive(Debug)]
pub(crate) struct ChunkWriter<'k> {
    key: &'k str,
    chunk_size: usize,
    compression: Compression,
    next_index: usize,
    tail: Option<Tail>,
    // A committed chunk that this write filled up.
    deferred: Option<(String, Vec<u8>)>,
}

impl<'k> ChunkWriter<'k> {
    // Reads everything needed to continue the tensor. Performs no writes, so
    // a corrupt index map is reported before anything changes.
    pub(crate) fn open<S: Storage>(
        key: &'k str,
        meta: &Meta,
        index_map: &IndexMap,
        store: &S,
    ) -> Result<Self> {
        let corrupt = |msg: String| {
            warn!(key, %msg, "refusing to write to corrupt tensor");
            Error::CorruptIndexMap(msg)
        };

        let continuation = match tail_continuation(key, store, index_map) {
            Err(Error::CorruptIndexMap(msg)) => return Err(corrupt(msg)),
            other => other?,
        };
        let next_index = match index_map.next_chunk_index() {
            Err(Error::CorruptIndexMap(msg)) => return Err(corrupt(msg)),
            other => other?,
        };

        let tail = match continuation {
            Some(c) if c.occupied == 0 || c.occupied >= meta.chunk_size => {
                return Err(corrupt(format!(
                    "incomplete chunk {} holds {} bytes, chunk size is {}",
                    c.chunk_name, c.occupied, meta.chunk_size
                )));
            }
            // The incomplete chunk is the last one the last entry wrote to and
            // ends exactly where that entry ends. Anything else means a write
            // rewrote it and then failed before committing the index map.
            Some(c) if !tail_matches_last_entry(index_map, &c.chunk_name, c.occupied) => {
                let (sample, end_byte) = match index_map.entries().last() {
                    Some(last) => (index_map.len() - 1, last.end_byte),
                    None => (0, 0),
                };
                return Err(corrupt(format!(
                    "incomplete chunk {} holds {} bytes but sample {} ends at byte {}",
                    c.chunk_name, c.occupied, sample, end_byte
                )));
            }
            Some(c) => {
                debug!(key, chunk = %c.chunk_name, occupied = c.occupied, "continuing incomplete chunk");
                Some(Tail::Stored {
                    name: c.chunk_name,
                    occupied: c.occupied,
                })
            }
            None => None,
        };

        Ok(ChunkWriter {
            key,
            chunk_size: meta.chunk_size,
            compression: meta.compression,
            next_index,
            tail,
            deferred: None,
        })
    }

    fn new_chunk_name(&mut self) -> String {
        let name = chunk_name(self.next_index);
        self.next_index += 1;
        name
    }

    fn store_chunk<S: Storage>(&self, store: &mut S, name: &str, bytes: &[u8]) -> Result<()> {
        let stored = self.compression.encode_chunk(bytes, self.chunk_size)?;
        trace!(
            key = self.key,
            chunk = name,
            bytes = bytes.len(),
            stored = stored.len(),
            "storing chunk"
        );
        store.set(&chunk_key(self.key, name), &stored)?;
        Ok(())
    }

    // The tail as a mutable buffer, fetching the stored bytes on first use.
    fn buffered_tail<S: Storage>(&mut self, store: &S) -> Result<(&str, &mut Vec<u8>)> {
        if let Some(Tail::Stored { name, occupied }) = &self.tail {
            let bytes = store
                .get(&chunk_key(self.key, name))?
                .ok_or_else(|| Error::CorruptIndexMap(format!("incomplete chunk {} vanished", name)))?;
            if bytes.len() != *occupied {
                return Err(Error::CorruptIndexMap(format!(
                    "incomplete chunk {} changed length from {} to {}",
                    name,
                    occupied,
                    bytes.len()
                )));
            }
            self.tail = Some(Tail::Buffered {
                name: name.clone(),
                bytes,
                committed: true,
            });
        }
        match self.tail.as_mut() {
            Some(Tail::Buffered { name, bytes, .. }) => Ok((name.as_str(), bytes)),
            _ => Err(Error::CorruptIndexMap(
                "continuation without an incomplete chunk".into(),
            )),
        }
    }

    // Called once the tail reaches the chunk size.
    fn complete_tail<S: Storage>(&mut self, store: &mut S) -> Result<()> {
        match self.tail.take() {
            Some(Tail::Buffered {
                name,
                bytes,
                committed: true,
            }) => {
                self.deferred = Some((name, bytes));
                Ok(())
            }
            Some(Tail::Buffered { name, bytes, .. }) => self.store_chunk(store, &name, &bytes),
            Some(tail @ Tail::Stored { .. }) => {
                self.tail = Some(tail);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Chunks one sample and returns the index entry describing where it went.
    pub(crate) fn write_sample<S: Storage>(
        &mut self,
        store: &mut S,
        sample: &Sample,
    ) -> Result<IndexMapEntry> {
        let payload = self.compression.encode_sample(&sample.data)?;
        if payload.is_empty() {
            return Err(Error::ShapeValidation(format!(
                "sample of shape {:?} has no bytes",
                sample.shape
            )));
        }

        let occupied = self.tail.as_ref().map_or(0, Tail::occupied);
        let mut chunk_names = Vec::new();
        let mut start_byte = 0;
        let mut end_byte = 0;

        for slice in split(&payload, self.chunk_size, occupied) {
            if !slice.continuation && slice.bytes.len() == self.chunk_size {
                // A whole chunk on its own, no need to buffer it.
                let name = self.new_chunk_name();
                self.store_chunk(store, &name, slice.bytes)?;
                end_byte = self.chunk_size;
                chunk_names.push(name);
                continue;
            }

            if !slice.continuation {
                let name = self.new_chunk_name();
                self.tail = Some(Tail::Buffered {
                    name,
                    bytes: Vec::new(),
                    committed: false,
                });
            }

            let (name, bytes) = self.buffered_tail(&*store)?;
            if chunk_names.is_empty() {
                start_byte = bytes.len();
            }
            bytes.extend_from_slice(slice.bytes);
            end_byte = bytes.len();
            chunk_names.push(name.to_owned());

            if end_byte == self.chunk_size {
                self.complete_tail(store)?;
            }
        }

        let incomplete_chunk_names = match &self.tail {
            Some(tail) => vec![tail.name().to_owned()],
            None => Vec::new(),
        };

        Ok(IndexMapEntry {
            chunk_names,
            incomplete_chunk_names,
            start_byte,
            end_byte,
            shape: sample.shape.clone(),
        })
    }

    /// Stores whatever is still buffered: the partially filled last chunk
    /// and, last of all, the rewritten committed chunk.
    pub(crate) fn finish<S: Storage>(self, store: &mut S) -> Result<()> {
        if let Some(Tail::Buffered { name, bytes, .. }) = &self.tail {
            self.store_chunk(store, name, bytes)?;
        }
        if let Some((name, bytes)) = &self.deferred {
            self.store_chunk(store, name, bytes)?;
        }
        Ok(())
    }
}
