//! # Rebar Utils
//!
//! Small shared types used across the Rebar crates: world positions, namespaced
//! identifiers and lock aliases.

pub mod locks;
pub mod types;

pub use types::{BlockPos, ChunkPos, Identifier};
