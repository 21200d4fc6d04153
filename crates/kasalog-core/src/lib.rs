//! # kasalog-core
//!
//! Core types, traits, and abstractions for the kasalog umbrella tracker.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other kasalog crates depend on: the location record model, the
//! coordinate invariants, and the seams for positioning, storage, and reverse
//! geocoding.

pub mod defaults;
pub mod error;
pub mod memory;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use memory::InMemoryLocationRepository;
pub use models::*;
pub use traits::*;
