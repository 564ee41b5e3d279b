//! # Vocal GEM Common Library
//!
//! Shared foundation for the Vocal GEM sync engine:
//! - Persistent store (named SQLite-backed collections, snapshot export/import)
//! - Error taxonomy
//! - Sync status event bus
//! - Configuration loading and data directory resolution

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
