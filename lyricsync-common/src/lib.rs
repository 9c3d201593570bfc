//! # lyricsync common library
//!
//! Shared code for the lyricsync workspace:
//! - Error type and result alias
//! - Bootstrap configuration loading and root folder resolution
//! - SQLite pool initialization and cache schema
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
