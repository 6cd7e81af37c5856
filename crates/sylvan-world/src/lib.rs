//! Procedural terrain generation and viewer-driven chunk streaming for Sylvan.
//!
//! The [`WorldManager`] keeps the chunks around a moving viewer resident:
//! new chunks are generated on a [`WorkerDispatcher`] pool and committed into
//! a shared [`ChunkStore`] that renderers read from.

pub mod chunk;
pub mod config;
pub mod dispatcher;
pub mod generation;
pub mod manager;
pub mod noise_field;
pub mod poisson;
pub mod store;

pub use chunk::{ChunkData, ChunkState, Heightfield, InstanceTransform};
pub use config::{GeneratorConfig, NoiseConfig, ScatterConfig, WorldConfig};
pub use dispatcher::{JobHandle, JobOutcome, WorkerDispatcher};
pub use generation::{ChunkGenerator, ChunkSource};
pub use manager::{ReconcileReport, UpdateReport, WorldManager, WorldStats};
pub use noise_field::{Biome, NoiseField};
pub use poisson::PoissonConfig;
pub use store::{CancelToken, ChunkStore, ChunkView, PendingTicket, StoreStats};
