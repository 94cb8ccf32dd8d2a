//! ChainForge Core - group goal period engine.
//!
//! This crate contains the domain models, the pure period, penalty and
//! ranking logic, and the ledger and orchestrator services. It is
//! database-agnostic and defines traits that are implemented by the
//! `storage-sqlite` crate.

pub mod errors;
pub mod group_goals;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
