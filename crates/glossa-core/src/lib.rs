//! # glossa-core
//!
//! Core types, traits, and abstractions for the glossa language
//! identification pipeline.
//!
//! This crate provides the work-item state machine, the failure taxonomy,
//! and the trait definitions that the store and collaborators implement.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
