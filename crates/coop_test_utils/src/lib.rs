//! # Co-op Test Utilities
//!
//! Shared testing utilities for all crates:
//! - In-process loopback transport connecting one host and N clients
//! - Fixture configs and world setups
//! - Convergence fingerprints for replicated state
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod convergence;
pub mod fixtures;
pub mod harness;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
