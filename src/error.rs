use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A write disagrees with the tensor's existing metadata.
    #[error("incompatible meta for {field}: existing {existing}, got {candidate}")]
    MetaIncompatible {
        field: &'static str,
        existing: String,
        candidate: String,
    },

    /// The index map violates the single-incomplete-chunk invariant, or
    /// references chunks that don't look like ours. Not recoverable.
    #[error("corrupt index map: {0}")]
    CorruptIndexMap(String),

    #[error("invalid shape: {0}")]
    ShapeValidation(String),

    #[error("invalid write options: {0}")]
    InvalidOptions(String),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("sample {index} out of range for tensor of length {length}")]
    SampleOutOfRange { index: usize, length: usize },

    // anyhow::Error isn't a std Error, so it can't be a #[source].
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Storage(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(err.into())
    }
}
