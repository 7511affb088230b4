//! imagen-server - a single-slot image generation service.
//!
//! Prompts arrive over HTTP, are validated, and are queued for one worker
//! that owns the [`ports::GenerationEngine`]. Each successful generation is
//! written to its own file by [`output::OutputStore`].

pub mod adapters;
pub mod cassette;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod model;
pub mod output;
pub mod params;
pub mod ports;
pub mod service;
