//! gifreel - animated GIF playback with a bounded, prefetching frame cache
//!
//! Re-exports all modules for use by the binary and integration tests.

// Core engine (cache, worker, player, clock)
pub mod core;

pub mod cli;
pub mod config;
pub mod entities;
pub mod error;

#[cfg(test)]
mod test_utils;

pub use crate::core::cache::{CacheLookup, CacheStatsSnapshot, MissReason};
pub use crate::core::clock::{IntervalClock, RunContext, TickTarget};
pub use crate::core::player::{MissPolicy, PlaybackDriver, PlaybackState};
pub use crate::core::pressure::PressureMonitor;
pub use crate::core::sizing::{SizingPolicy, MIN_FRAME_CACHE_SIZE};
pub use crate::core::weak_handle::WeakHandle;
pub use entities::{size_for_image, AnimatedImage, Frame, FrameSource, ImageOptions, MIN_FRAME_DELAY};
pub use error::{ConstructionError, DecodeError};
