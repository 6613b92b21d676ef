//! Error types for the federation overlay

use thiserror::Error;

use crate::BrokerId;

/// Core fedtree errors
#[derive(Error, Debug)]
pub enum FedtreeError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Topic {0:?} is outside every subscribed namespace")]
    UnknownNamespace(String),

    #[error("Empty federated topic in {0:?}")]
    EmptyFederatedTopic(String),

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    // Addressing errors
    #[error("Broker {0} is not a known neighbor")]
    UnknownNeighbor(BrokerId),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Channel closed")]
    ChannelClosed,

    // Runtime errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),
}

/// Result type for fedtree operations
pub type FedtreeResult<T> = Result<T, FedtreeError>;
