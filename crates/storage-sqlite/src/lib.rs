//! SQLite storage implementation for ChainForge.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the repository traits defined in `chainforge-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - Repository implementations for groups and group goals
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the application where Diesel dependencies exist.
//! The `core` crate is database-agnostic and works with traits.
//!
//! ```text
//!      core (domain)        server (http, scheduler)
//!            │                      │
//!            └──────────┬───────────┘
//!                       ▼
//!             storage-sqlite (this crate)
//!                       │
//!                       ▼
//!                   SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod group_goals;
pub mod groups;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

pub use group_goals::GroupGoalRepository;
pub use groups::GroupMembershipRepository;

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export from chainforge-core for convenience
pub use chainforge_core::errors::{DatabaseError, Error, Result};
