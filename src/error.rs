//! Configuration errors.
//!
//! Every error is detected while computing a configuration, before any
//! register is written, and aborts the configuration of the stream in which it
//! was found.

use thiserror::Error;

/// Error produced while computing a DMA stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Two different words need the same lane of an input buffer chunk.
    #[error("input crossbar clash: two selected words share a lane within a chunk")]
    InputClash,
    /// Two words at the same interface position come from the same chunk.
    #[error("output crossbar clash: two selected words at the same position share a chunk")]
    OutputClash,
    /// A chunk is the source of more words than the datapath width.
    #[error("output crossbar would overwrite data: a chunk feeds more than {width} words")]
    OutputOverwrite {
        /// Maximum number of words a chunk can feed.
        width: usize,
    },
    /// The merge sort buffer cannot hold a single fetch of records.
    #[error("records of {record_size} words do not fit a sort buffer of {sort_buffer_size}")]
    RecordTooLargeForBuffer {
        /// Record size in words.
        record_size: usize,
        /// Sort buffer size in records.
        sort_buffer_size: i64,
    },
    /// The records do not fit in the crossbar configuration space.
    #[error("invalid chunk count: {0}")]
    InvalidChunkCount(String),
    /// A record size of zero was given.
    #[error("invalid record size {0}")]
    InvalidRecordSize(usize),
    /// The stream description is malformed.
    #[error("invalid stream parameters: {0}")]
    InvalidStreamParameters(String),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ConfigurationError>;
