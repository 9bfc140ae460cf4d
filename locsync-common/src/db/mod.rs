//! Database schema, models, and secret bootstrap

pub mod init;
pub mod models;
pub mod secrets;

pub use init::{create_schema, init_database};
