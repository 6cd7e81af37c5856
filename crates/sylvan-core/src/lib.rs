//! Core types for the Sylvan terrain streamer.
//!
//! This crate provides the foundational types shared by the world crate and
//! any renderer consuming it:
//! - Chunk keys and world/chunk coordinate conversion
//! - The subsystem-wide error type

pub mod coords;
pub mod error;

pub use coords::{ChunkKey, DistanceMetric};
pub use error::{Error, Result};

/// World seed for procedural generation.
pub type WorldSeed = u64;

/// Engine-wide defaults.
pub mod constants {
    /// Default edge length of a chunk in world units.
    pub const DEFAULT_TILE_SIZE: f32 = 64.0;
    /// Default view distance in chunks.
    pub const DEFAULT_VIEW_DISTANCE: i32 = 4;
    /// Largest accepted view distance in chunks.
    pub const MAX_VIEW_DISTANCE: i32 = 1024;
    /// Default heightfield cells per chunk edge.
    pub const DEFAULT_HEIGHTFIELD_RESOLUTION: u32 = 32;
    /// Candidates tried around each active Poisson sample before it retires.
    pub const DEFAULT_POISSON_ATTEMPTS: u32 = 30;
}
