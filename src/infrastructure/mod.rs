//! Infrastructure layer.
//!
//! # Submodules
//!
//! - [`config`] - Configuration loading and validation
//! - [`pool`] - The persistent-connection pool and its supervisors

pub mod config;
pub mod pool;
