//! HTTP API handlers for locsync-server

pub mod apply;
pub mod auth;
pub mod capture;
pub mod health;
pub mod langpack;
pub mod projects;
pub mod pull;
pub mod session;
