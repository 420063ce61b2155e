use tracing::debug;

use crate::{
    array::{normalize, Array, Batch, Sample},
    config::WriteOptions,
    error::{Error, Result},
    index_map::{get_index_map, set_index_map, IndexMap},
    meta::{get_meta, set_meta, validate_and_update, Meta, MetaCandidate},
    store::Storage,
};

use self::{reader::SampleReader, writer::ChunkWriter};

mod reader;
mod writer;

#[cfg(test)]
mod trace_test;

/// Writes samples of tensors into fixed-size chunks of a backing store and
/// reads them back.
///
/// Each tensor key owns a meta record, an index map with one entry per
/// sample, and chunks stored under `"{key}/c{index}"`. Writes to one key must
/// not run concurrently.
#[derive(Debug)]
pub struct ChunkEngine<S: Storage> {
    store: S,
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.ends_with('/') {
        return Err(Error::InvalidOptions(format!("invalid tensor key {:?}", key)));
    }
    Ok(())
}

impl<S: Storage> ChunkEngine<S> {
    pub fn new(store: S) -> Self {
        ChunkEngine { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Appends the samples of `array` to tensor `key`.
    pub fn write(&mut self, key: &str, array: Array, opts: &WriteOptions) -> Result<Meta> {
        opts.validate()?;
        let batch = normalize(array, opts.batched)?;
        self.write_batch(key, &batch, opts)
    }

    /// Appends `batch` to tensor `key` and returns the tensor's new meta.
    ///
    /// Everything that can be rejected (options, shapes, meta compatibility,
    /// a corrupt index map) is checked before the first store write. A
    /// failure after that leaves the committed meta and index map as they
    /// were, but may leave unreferenced chunks behind; the next write reuses
    /// their keys.
    ///
    /// The one exception is a failure after the tensor's existing incomplete
    /// chunk has been rewritten in its completed form but before the index
    /// map is committed. The committed index map then no longer describes
    /// that chunk: samples stored in it may fail to read, and every later
    /// write to the key fails with `CorruptIndexMap`.
    pub fn write_batch(&mut self, key: &str, batch: &Batch, opts: &WriteOptions) -> Result<Meta> {
        opts.validate()?;
        check_key(key)?;

        let meta = validate_and_update(
            key,
            &self.store,
            MetaCandidate {
                dtype: batch.dtype(),
                compression: opts.compression,
                chunk_size: opts.chunk_size,
                sample_count: batch.len(),
            },
        )?;
        let mut index_map = get_index_map(key, &self.store)?;
        let mut writer = ChunkWriter::open(key, &meta, &index_map, &self.store)?;
        if index_map.len() + batch.len() != meta.length {
            return Err(Error::CorruptIndexMap(format!(
                "index map has {} entries but meta says {} samples",
                index_map.len(),
                meta.length - batch.len()
            )));
        }

        debug!(
            key,
            samples = batch.len(),
            chunk_size = meta.chunk_size,
            compression = %meta.compression,
            "writing samples"
        );

        for sample in batch.samples() {
            let entry = writer.write_sample(&mut self.store, sample)?;
            index_map.append(entry);
        }
        writer.finish(&mut self.store)?;

        set_index_map(key, &mut self.store, &index_map)?;
        set_meta(key, &mut self.store, &meta)?;

        debug!(key, length = meta.length, "committed write");
        Ok(meta)
    }

    pub fn meta(&self, key: &str) -> Result<Option<Meta>> {
        get_meta(key, &self.store)
    }

    pub fn index_map(&self, key: &str) -> Result<IndexMap> {
        get_index_map(key, &self.store)
    }

    /// Number of samples written to `key`.
    pub fn len(&self, key: &str) -> Result<usize> {
        Ok(self.meta(key)?.map_or(0, |m| m.length))
    }

    fn reader<'a>(&'a self, key: &'a str) -> Result<Option<SampleReader<'a, S>>> {
        let meta = match self.meta(key)? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let index_map = self.index_map(key)?;
        Ok(Some(SampleReader::new(&self.store, key, meta, index_map)?))
    }

    pub fn read_sample(&self, key: &str, index: usize) -> Result<Sample> {
        match self.reader(key)? {
            Some(mut reader) => reader.read(index),
            None => Err(Error::SampleOutOfRange { index, length: 0 }),
        }
    }

    pub fn read_all(&self, key: &str) -> Result<Vec<Sample>> {
        let mut reader = match self.reader(key)? {
            Some(reader) => reader,
            None => return Ok(Vec::new()),
        };
        (0..reader.len()).map(|i| reader.read(i)).collect()
    }
}
