/// Core Module for sqlbridge
///
/// This module contains the infrastructure every public type is built on:
/// the engine handle wrappers under `db` and the structured error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{EngineError, Error, Result, ResultCode};
