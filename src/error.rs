use std::path::PathBuf;

use burn::{config::ConfigError, record::RecorderError};

/// Failure while reading MNIST IDX files from disk.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no `{name}` (or `{name}.gz`) in {dir}")]
    MissingFile { dir: PathBuf, name: &'static str },

    #[error("{path}: bad magic number {found:#010x}, expected {expected:#010x}")]
    BadMagic {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("{path}: expected {expected} bytes of payload, found {found}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("{path}: header describes {expected} bytes of payload, file has {found}")]
    TrailingBytes {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("{path}: images are {rows}x{cols}, expected 28x28")]
    BadDimensions {
        path: PathBuf,
        rows: usize,
        cols: usize,
    },

    #[error("{images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    #[error("label {label} at index {index} is not a digit")]
    InvalidLabel { index: usize, label: u8 },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("invalid training config: {0}")]
    InvalidConfig(String),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("checkpoint record error: {0}")]
    Recorder(RecorderError),

    #[error("config file error: {0}")]
    Config(ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
