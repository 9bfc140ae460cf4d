//! Shared library for LocSync services
//!
//! Contains the error type, configuration loading, the SQLite schema and
//! models for the localization catalog, runtime-token cryptography, and
//! dot-path key utilities used by the language-pack engine.

pub mod config;
pub mod db;
pub mod error;
pub mod keypath;
pub mod token;

pub use error::{Error, Result};
