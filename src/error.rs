use std::path::PathBuf;
use thiserror::Error;

/// Every failure the extraction and reporting pipeline can surface.
#[derive(Error, Debug)]
pub enum MftError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed boot sector: {0}")]
    MalformedBootSector(String),

    #[error("byte offset of cluster {cluster} overflows u64")]
    OffsetOverflow { cluster: u64 },

    #[error("run {run} resolves to negative cluster {cluster}")]
    InvalidCluster { run: usize, cluster: i64 },

    #[error("corrupt run list: {0}")]
    CorruptRunList(String),

    #[error("corrupt MFT header at offset {offset:#x}: {details}")]
    CorruptMftHeader { offset: u64, details: String },

    #[error("record 0 of the MFT has no non-resident unnamed $DATA attribute")]
    MissingMftData,

    #[error("short read at offset {offset:#x}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("corrupt file record {entry}: {details}")]
    CorruptRecord { entry: u64, details: String },

    #[error("cyclic parent chain reached from entry {entry}-{sequence}")]
    ParentCycle { entry: u32, sequence: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MftError>;
