//! ARBSCAN: multi-region sports betting arbitrage scanner.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod cache;
pub mod config;
pub mod detector;
pub mod engine;
pub mod progress;
pub mod stakes;
pub mod storage;
pub mod types;
