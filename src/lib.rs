//! Stores tensors as a sequence of samples packed into fixed-size chunks.
//!
//! Every write appends samples to a tensor key. Samples are split across
//! chunks of `chunk_size` bytes; the last chunk of a write may be left short,
//! and the next write to the same key fills it up before starting a new one.
//! Each key keeps a meta record (dtype, compression, chunk size, length) and
//! an index map with one entry per sample saying which chunks hold it.

pub mod array;
pub mod chunker;
pub mod compression;
pub mod config;
pub mod engine;
pub mod error;
pub mod index_map;
pub mod meta;
pub mod store;

pub use array::{Array, Batch, Dtype, Element, Sample};
pub use compression::{Codec, Compression, Subject};
pub use config::WriteOptions;
pub use engine::ChunkEngine;
pub use error::{Error, Result};
pub use index_map::{IndexMap, IndexMapEntry};
pub use meta::Meta;
pub use store::{FsStore, MemoryStore, Storage};
