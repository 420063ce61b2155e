use serde::{Deserialize, Serialize};

use crate::{
    array::Dtype,
    compression::Compression,
    error::{Error, Result},
    store::Storage,
};

const META_FILENAME: &str = "meta.json";

/// Per-tensor metadata. Everything but `length` is fixed by the first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub dtype: Dtype,
    pub compression: Compression,
    pub chunk_size: usize,
    pub length: usize,
}

/// What a pending write would like the meta to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaCandidate {
    pub dtype: Dtype,
    pub compression: Compression,
    pub chunk_size: usize,
    pub sample_count: usize,
}

impl Meta {
    pub fn new(dtype: Dtype, compression: Compression, chunk_size: usize) -> Self {
        Meta {
            dtype,
            compression,
            chunk_size,
            length: 0,
        }
    }
}

pub fn meta_key(key: &str) -> String {
    format!("{}/{}", key, META_FILENAME)
}

pub fn has_meta<S: Storage>(key: &str, store: &S) -> Result<bool> {
    Ok(store.exists(&meta_key(key))?)
}

pub fn get_meta<S: Storage>(key: &str, store: &S) -> Result<Option<Meta>> {
    match store.get(&meta_key(key))? {
        Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
        None => Ok(None),
    }
}

pub fn set_meta<S: Storage>(key: &str, store: &mut S, meta: &Meta) -> Result<()> {
    let encoded = serde_json::to_vec(meta)?;
    store.set(&meta_key(key), &encoded)?;
    Ok(())
}

fn check_field<T>(field: &'static str, existing: &T, candidate: &T) -> Result<()>
where
    T: PartialEq + std::fmt::Display,
{
    if existing != candidate {
        return Err(Error::MetaIncompatible {
            field,
            existing: existing.to_string(),
            candidate: candidate.to_string(),
        });
    }
    Ok(())
}

/// Merges `candidate` into the meta stored for `key` and returns the result.
/// Nothing is persisted; the caller commits the returned meta once the write
/// has gone through.
pub fn validate_and_update<S: Storage>(
    key: &str,
    store: &S,
    candidate: MetaCandidate,
) -> Result<Meta> {
    let meta = match get_meta(key, store)? {
        Some(existing) => {
            check_field("dtype", &existing.dtype, &candidate.dtype)?;
            check_field("compression", &existing.compression, &candidate.compression)?;
            check_field("chunk_size", &existing.chunk_size, &candidate.chunk_size)?;
            existing
        }
        None => Meta::new(candidate.dtype, candidate.compression, candidate.chunk_size),
    };

    Ok(Meta {
        length: meta.length + candidate.sample_count,
        ..meta
    })
}
