//! Common utilities and types shared across credvault crates.
//!
//! This module provides the error taxonomy used by every layer of the
//! vault and the small identifier and secret-holding types that cross
//! crate boundaries.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{RecordId, SensitiveString};
