pub mod api;
pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod db;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod models;
pub mod retention;
pub mod schedule;
pub mod service;
pub mod store;
pub mod sweep;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use error::{BackupError, Result};
