//! # rhythora-core
//!
//! Core types, catalogs, and error handling for the Rhythora rhythm game's
//! audio subsystem.

pub mod error;
pub mod types;

pub use error::{Error, HttpError, Result};
pub use types::*;
