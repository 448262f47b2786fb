//! adsync DB - PostgreSQL implementation of the mirror store.
//!
//! - [`PgStore`] - pool-backed reads and session factory
//! - [`PgSession`] - one transaction, with savepoints per record
//! - [`MIGRATOR`] - embedded schema migrations

pub mod repository;

pub use repository::{PgSession, PgStore, MIGRATOR};
