//! quorum-relay - barrier-synchronized scatter/gather relay
//!
//! Several independent callers must issue the same operation before it runs.
//! The relay collects their calls at a barrier, runs the operation exactly
//! once (locally on a leaf, or fanned out to every leaf by an orchestrator),
//! merges the per-leaf replies into one agreed result and returns that result
//! to every caller.
//!
//! # Architecture
//!
//! - **Operations**: tagged operation enum, typed parameters and a static
//!   registry of handlers and reduction policies
//! - **Barrier**: single reusable round, exactly-once invocation, bounded waits
//! - **Dispatcher**: leaf execution or scatter/gather with reduction
//! - **Node service**: framed MessagePack over TCP, worker-pool bounded
//! - **Backends**: compute, attestation and key collaborators behind traits

pub mod backend;
pub mod barrier;
pub mod config;
pub mod distributed;
pub mod error;
pub mod operation;

// Re-export commonly used types
pub use config::Config;
pub use error::DispatchError;

/// Result type used throughout quorum-relay
pub type Result<T> = anyhow::Result<T>;
