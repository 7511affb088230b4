//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the service core and an
//! external system. Implementations live in `src/adapters/`.

pub mod engine;

pub use engine::{EngineRequest, GenerateFuture, GeneratedImage, GenerationEngine};
