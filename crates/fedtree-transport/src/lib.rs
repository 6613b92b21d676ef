//! fedtree Transport Layer
//!
//! This crate provides:
//! - The `Transport` boundary every outbound publish goes through
//! - The inbound channel that bridges receive tasks to the dispatcher
//! - UDP datagram transport
//! - In-memory transports for tests and simulation

pub mod transport;
pub mod udp;
pub mod memory;

pub use transport::*;
pub use udp::*;
pub use memory::*;
