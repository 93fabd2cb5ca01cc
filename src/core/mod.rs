//! Core engine modules - cache, worker, player, clock
//!
//! These modules form the playback engine, independent of any display surface.

pub mod cache;
pub mod clock;
pub mod player;
pub mod pressure;
pub mod sizing;
pub mod weak_handle;
pub mod worker;

// Re-exports for convenience
pub use cache::{CacheLookup, CacheSizes, CacheStatsSnapshot, FrameCache, MissReason};
pub use clock::{IntervalClock, RunContext, TickTarget};
pub use player::{MissPolicy, PlaybackDriver, PlaybackState};
pub use pressure::PressureMonitor;
pub use sizing::{AvailableMemoryPolicy, ByteBudgetPolicy, SizingInput, SizingPolicy, MIN_FRAME_CACHE_SIZE};
pub use weak_handle::WeakHandle;
pub use worker::DecodeWorker;
