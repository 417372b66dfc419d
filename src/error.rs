use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the transport.
///
/// Expiration is not an error: readers report it as
/// [`ReadResult::Expired`](crate::RMP::ReadResult::Expired).
#[derive(Error, Debug)]
pub enum BusError {
    #[error("segment '{segment}' is not initialized")]
    NotInitialized { segment: String },

    #[error("message of {size} bytes exceeds the maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("empty messages cannot be framed")]
    EmptyMessage,

    #[error("read position {pos} is ahead of the free position {free_pos}")]
    InvalidPosition { pos: u64, free_pos: u64 },

    #[error("all {max_slots} reader slots are allocated")]
    AllocationExhausted { max_slots: u16 },

    #[error("reader is not active")]
    ReaderInactive,

    #[error("topic must not contain a zero byte")]
    InvalidTopic,

    #[error("ring buffer capacity {capacity} must be a power of two larger than a message header")]
    InvalidCapacity { capacity: u64 },

    #[error("segment '{segment}' layout mismatch: expected {expected}, found {found}")]
    LayoutMismatch {
        segment: String,
        expected: u64,
        found: u64,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;
