//! adsync CLI - HTTP service and commands for the Megaphone mirror
//!
//! This crate ties the store, the Megaphone client and the reconciliation
//! engine together behind the `adsync` binary.

pub mod api;
pub mod config;
pub mod scheduler;

pub use api::{app_router, ApiError, AppState};
pub use config::{Command, Config, SyncTarget};
pub use scheduler::run_scheduler;
