//! Domain types and contracts for Confidant.
//!
//! This crate has no I/O of its own. Storage, the completion provider and
//! the HTTP surface live in sibling crates and plug in through the traits
//! defined here.

pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod persona;
pub mod prompt;

// Re-export common error type
pub use error::{ConfidantError, Result};
