//! # nebbler-conn-mgr
//!
//! Connection policy for the Nebbler local store, built on SQLx for SQLite.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: Database handle with separate read and write connection pools
//! - **[`SqliteDatabaseConfig`]**: Pool sizing and timeout settings
//! - **[`WriteGuard`]**: RAII guard holding the single write connection
//! - **[`Error`]**: Error type for connection operations
//!
//! ## Architecture
//!
//! - **Dual pools**: Query-only read pool (default 6 connections) and a write pool capped at 1
//! - **WAL journal**: Readers never block the writer and see only committed data
//! - **Exclusive writes**: The single write connection serializes every mutation
//! - **Explicit ownership**: Every `connect` returns a fresh handle; there is no
//!   process-wide registry, so tests can run isolated instances side by side

mod config;
mod database;
mod error;
mod write_guard;

pub use config::SqliteDatabaseConfig;
pub use database::SqliteDatabase;
pub use error::{Error, Result};
pub use write_guard::WriteGuard;
