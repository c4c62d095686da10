/// Error types for the operations that can fail as a whole.
///
/// Scanning never returns an error: read failures are recorded on the
/// affected `Node` instead. Only trash moves and exports surface `Err`.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrashError {
    #[error("{path} is still being scanned; delete refused")]
    ScanInProgress { path: PathBuf },

    #[error("cannot create holding area {path}: {source}")]
    CreateHoldingArea { path: PathBuf, source: io::Error },

    #[error("{path} does not exist: {source}")]
    MissingSource { path: PathBuf, source: io::Error },

    #[error("holding-area entry {path} is gone: {source}")]
    MissingEntry { path: PathBuf, source: io::Error },

    #[error("cannot copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("cannot remove {path} after copying it: {source}")]
    RemoveSource { path: PathBuf, source: io::Error },

    #[error("cannot write metadata {path}: {source}")]
    WriteMeta { path: PathBuf, source: io::Error },

    #[error("cannot encode metadata for {path}: {source}")]
    EncodeMeta {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot read metadata {path}: {source}")]
    ReadMeta { path: PathBuf, source: io::Error },

    #[error("malformed metadata {path}: {source}")]
    DecodeMeta {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot create {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv flush failed: {0}")]
    Flush(#[from] io::Error),
}
