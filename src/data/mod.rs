//! Data layer module
//!
//! Handles all data persistence:
//! - Mastodon host registrations
//! - Bridge rows and their embedded settings
//! - Read access to relay worker metadata

mod database;
mod models;

pub use database::Database;
pub use models::*;

#[cfg(test)]
mod database_test;
