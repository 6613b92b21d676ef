//! fedtree Wire Protocol - Topics, messages and datagrams
//!
//! This crate implements everything that crosses a broker boundary:
//! - Topic namespaces and prefix-priority classification
//! - The closed set of protocol messages and their payload codecs
//! - Envelope framing for datagram transports

pub mod namespace;
pub mod message;
pub mod envelope;

pub use namespace::*;
pub use message::*;
pub use envelope::*;
