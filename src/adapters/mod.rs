//! Adapter implementations for port traits.
//!
//! - `live/`: Real inference API implementations
//! - `recording/`: Record engine interactions to cassettes
//! - `replaying/`: Replay engine interactions from cassettes

pub mod live;
pub mod recording;
pub mod replaying;
