//! fedtree Runtime - Per-topic core-based trees over a broker overlay
//!
//! This crate provides:
//! - The recency cache used for publication deduplication
//! - Topic workers: core election, membership and routing for one topic
//! - The dispatcher that demultiplexes inbound traffic onto workers
//! - Configuration, logging setup and federator orchestration

pub mod recency;
pub mod context;
pub mod announcer;
pub mod worker;
pub mod dispatcher;
pub mod config;
pub mod observability;
pub mod federator;

pub use recency::*;
pub use context::*;
pub use announcer::*;
pub use worker::*;
pub use dispatcher::*;
pub use config::*;
pub use observability::*;
pub use federator::*;
