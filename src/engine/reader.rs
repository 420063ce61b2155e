use crate::{
    array::Sample,
    error::{Error, Result},
    index_map::{chunk_key, IndexMap},
    meta::Meta,
    store::Storage,
};

// Reassembles samples from their chunks. Consecutive samples usually share a
// chunk, so the last decoded chunk is kept around.
pub(crate) struct SampleReader<'a, S: Storage> {
    store: &'a S,
    key: &'a str,
    meta: Meta,
    index_map: IndexMap,
    // Only this chunk is stored raw under the chunk subject; every other one
    // was compressed when it filled up.
    incomplete: Option<String>,
    cached: Option<(String, Vec<u8>)>,
}

impl<'a, S: Storage> SampleReader<'a, S> {
    pub(crate) fn new(store: &'a S, key: &'a str, meta: Meta, index_map: IndexMap) -> Result<Self> {
        if index_map.len() != meta.length {
            return Err(Error::CorruptIndexMap(format!(
                "index map has {} entries but meta says {} samples",
                index_map.len(),
                meta.length
            )));
        }
        let incomplete = index_map.incomplete_chunk()?.map(str::to_owned);
        Ok(SampleReader {
            store,
            key,
            meta,
            index_map,
            incomplete,
            cached: None,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.index_map.len()
    }

    fn chunk(&mut self, name: &str) -> Result<&[u8]> {
        let hit = matches!(&self.cached, Some((cached, _)) if cached == name);
        if !hit {
            let stored = self.store.get(&chunk_key(self.key, name))?.ok_or_else(|| {
                Error::CorruptIndexMap(format!("chunk {} is missing from the store", name))
            })?;
            let complete = self.incomplete.as_deref() != Some(name);
            let decoded = self
                .meta
                .compression
                .decode_chunk(&stored, complete)?
                .into_owned();
            self.cached = Some((name.to_owned(), decoded));
        }
        match &self.cached {
            Some((_, bytes)) => Ok(bytes),
            None => Err(Error::CorruptIndexMap(format!("chunk {} not loaded", name))),
        }
    }

    pub(crate) fn read(&mut self, index: usize) -> Result<Sample> {
        let entry = match self.index_map.get(index) {
            Some(entry) => entry.clone(),
            None => {
                return Err(Error::SampleOutOfRange {
                    index,
                    length: self.index_map.len(),
                })
            }
        };

        let mut payload = Vec::new();
        let last = entry.chunk_names.len().saturating_sub(1);
        for (i, name) in entry.chunk_names.iter().enumerate() {
            let chunk = self.chunk(name)?;
            let start = if i == 0 { entry.start_byte } else { 0 };
            let end = if i == last { entry.end_byte } else { chunk.len() };
            if start > end || end > chunk.len() {
                return Err(Error::CorruptIndexMap(format!(
                    "sample {} wants bytes {}..{} of chunk {} which has {}",
                    index,
                    start,
                    end,
                    name,
                    chunk.len()
                )));
            }
            payload.extend_from_slice(&chunk[start..end]);
        }

        let data = self.meta.compression.decode_sample(&payload)?.into_owned();
        let sample = Sample::new(entry.shape, data);
        sample.validate(self.meta.dtype).map_err(|e| {
            Error::CorruptIndexMap(format!("sample {} doesn't match its entry: {}", index, e))
        })?;
        Ok(sample)
    }
}
