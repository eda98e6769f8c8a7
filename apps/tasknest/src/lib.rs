//! # TaskNest Library
//!
//! This library exposes the TaskNest modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;

// Re-export tasknest_core for convenience
pub use tasknest_core;
