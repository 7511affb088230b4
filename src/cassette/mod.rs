//! Record/replay infrastructure for deterministic engine runs.

pub mod format;
pub mod recorder;
pub mod replayer;
