//! Resource management
//!
//! Passive resource registries used by scenes.

pub mod materials;
