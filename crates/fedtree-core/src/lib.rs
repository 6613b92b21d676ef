//! fedtree Core - Fundamental types shared by every fedtree crate
//!
//! This crate defines:
//! - Identifiers (BrokerId, PubId)
//! - Delivery quality levels for the transport boundary
//! - The common error type

pub mod id;
pub mod qos;
pub mod error;

pub use id::*;
pub use qos::*;
pub use error::*;
