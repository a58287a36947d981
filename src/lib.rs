//! shellcache - Manifest-reconciling content cache for web application shells
//!
//! Precaches a manifest of fingerprinted static resources, reconciles the
//! cache when a new manifest is activated, and serves requests cache-first
//! with a network-first root document.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod manifest;
pub mod reconcile;
pub mod router;
pub mod staging;
pub mod store;
pub mod ui;
pub mod worker;

pub use error::{ShellcacheError, ShellcacheResult};
