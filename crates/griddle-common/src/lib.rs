//! Common utilities for griddle
//!
//! This crate provides the error type shared by every griddle crate.

pub mod error;

pub use error::{GriddleError, Result};
