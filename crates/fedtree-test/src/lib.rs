//! fedtree Test Harness - Overlay simulation and protocol validation
//!
//! This crate provides:
//! - Overlay topologies (line, ring, grid, custom)
//! - A deterministic multi-broker simulator driving real topic workers
//! - Scenario runs checking tree convergence and exactly-once delivery

pub mod topology;
pub mod simulator;
pub mod scenario;

pub use topology::*;
pub use simulator::*;
pub use scenario::*;
