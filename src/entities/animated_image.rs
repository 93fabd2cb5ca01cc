//! Animated image facade
//!
//! **Why**: Callers want one immutable object per animation: metadata (frame
//! count, delays, loop count, size) that never changes, a poster frame that is
//! always there, and a cache that hands out decoded frames without blocking.
//!
//! **Used by**: PlaybackDriver (frame lookup, delays), PressureMonitor
//! (memory warnings), the `gifreel` binary
//!
//! # Construction
//!
//! 1. Sniff the payload and open a `FrameSource` (or take a caller's source)
//! 2. Normalize delays: anything below `min_frame_delay` reads as the floor
//! 3. Decode the poster: the first frame that decodes; earlier frames are
//!    recorded as undecodable
//! 4. Size the cache (explicit hint, else `SizingPolicy`) and start its worker

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::frame::Frame;
use super::source::open_source;
use super::traits::{FrameSource, PixelSize};
use crate::core::cache::{CacheLookup, CacheOptions, CacheSizes, CacheStatsSnapshot, FrameCache};
use crate::core::sizing::{resolve_cache_size, ByteBudgetPolicy, SizingInput, SizingPolicy};
use crate::error::ConstructionError;

/// Delays below this are treated as unreliable and rounded up
pub const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);

/// Degraded-cap doubling interval used when none is configured
pub const DEFAULT_RECOVERY_INTERVAL: usize = 8;

/// Construction options
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Explicit cache size; `None` asks `sizing`
    pub optimal_frame_cache_size: Option<usize>,
    /// Premultiply alpha when frames are decoded
    pub predraw: bool,
    /// Delay floor
    pub min_frame_delay: Duration,
    /// Window advances per doubling of the cache after memory pressure
    pub recovery_interval: usize,
    pub sizing: Arc<dyn SizingPolicy>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            optimal_frame_cache_size: None,
            predraw: true,
            min_frame_delay: MIN_FRAME_DELAY,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
            sizing: Arc::new(ByteBudgetPolicy::default()),
        }
    }
}

/// Immutable animated image with a bounded frame cache.
pub struct AnimatedImage {
    source: Arc<dyn FrameSource>,
    delays: Vec<Duration>,
    total_duration: Duration,
    loop_count: u32,
    size: (u32, u32),
    cache: FrameCache,
}

impl AnimatedImage {
    /// Build with default options
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Result<Self, ConstructionError> {
        Self::with_options(data, ImageOptions::default())
    }

    pub fn with_options(data: impl Into<Arc<[u8]>>, options: ImageOptions) -> Result<Self, ConstructionError> {
        let source = open_source(data.into())?;
        Self::from_source(source, options)
    }

    /// Build on top of any decoder
    pub fn from_source(source: Arc<dyn FrameSource>, options: ImageOptions) -> Result<Self, ConstructionError> {
        let frame_count = source.frame_count();
        if frame_count == 0 {
            return Err(ConstructionError::NoFrames);
        }

        let delays: Vec<Duration> = (0..frame_count)
            .map(|index| source.declared_delay(index).max(options.min_frame_delay))
            .collect();
        let total_duration: Duration = delays.iter().sum();

        // Poster: first frame that decodes
        let mut undecodable = Vec::new();
        let mut poster = None;
        for index in 0..frame_count {
            match source.decode_frame(index) {
                Ok(frame) => {
                    poster = Some(frame);
                    break;
                }
                Err(e) => {
                    warn!("Poster candidate {} failed to decode: {}", index, e);
                    undecodable.push(index);
                }
            }
        }
        let Some(poster) = poster else {
            return Err(ConstructionError::NoDecodableFrame { frame_count });
        };
        let poster = if options.predraw { poster.predrawn() } else { poster };
        let size = poster.size();

        let max_size = resolve_cache_size(
            options.optimal_frame_cache_size,
            options.sizing.as_ref(),
            &SizingInput {
                frame_count,
                width: size.0,
                height: size.1,
            },
        );

        let loop_count = source.loop_count();
        let cache = FrameCache::new(
            Arc::clone(&source),
            poster,
            &undecodable,
            CacheOptions {
                max_size,
                predraw: options.predraw,
                recovery_interval: options.recovery_interval,
            },
        )?;

        info!(
            "AnimatedImage: {}x{}, {} frames, loop_count={}, duration={:?}, poster={}",
            size.0,
            size.1,
            frame_count,
            loop_count,
            total_duration,
            cache.poster_index()
        );

        Ok(Self {
            source,
            delays,
            total_duration,
            loop_count,
            size,
            cache,
        })
    }

    /// Raw container payload
    pub fn data(&self) -> &[u8] {
        self.source.data()
    }

    pub fn frame_count(&self) -> usize {
        self.delays.len()
    }

    /// Normalized delay of `index` (None when out of range)
    pub fn delay(&self, index: usize) -> Option<Duration> {
        self.delays.get(index).copied()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// One full pass through every frame
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// 0 = infinite
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn poster_image(&self) -> &Frame {
        self.cache.poster()
    }

    pub fn poster_index(&self) -> usize {
        self.cache.poster_index()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Cached frame, or the poster on a miss. Never blocks.
    pub fn request_frame(&self, index: usize) -> Frame {
        self.cache.request_frame(index)
    }

    /// Like [`request_frame`](Self::request_frame) but reports why it missed
    pub fn lookup(&self, index: usize) -> CacheLookup {
        self.cache.lookup(index)
    }

    pub fn frame_cache_size_current(&self) -> usize {
        self.cache.frame_cache_size_current()
    }

    pub fn frame_cache_size_max(&self) -> usize {
        self.cache.frame_cache_size_max()
    }

    /// Clamped to `[MIN_FRAME_CACHE_SIZE, frame_count]`
    pub fn set_frame_cache_size_max(&self, size: usize) {
        self.cache.set_max_cache_size(size);
    }

    pub fn cache_sizes(&self) -> CacheSizes {
        self.cache.sizes()
    }

    pub fn resident_indices(&self) -> Vec<usize> {
        self.cache.resident_indices()
    }

    pub fn on_memory_pressure(&self) {
        self.cache.on_memory_pressure();
    }

    pub fn is_cache_degraded(&self) -> bool {
        self.cache.is_degraded()
    }

    /// Drop every cached frame except the poster
    pub fn purge(&self) {
        self.cache.purge();
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}

impl PixelSize for AnimatedImage {
    fn pixel_size(&self) -> (u32, u32) {
        self.size
    }
}

impl std::fmt::Debug for AnimatedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedImage")
            .field("size", &self.size)
            .field("frame_count", &self.delays.len())
            .field("loop_count", &self.loop_count)
            .field("poster_index", &self.cache.poster_index())
            .finish()
    }
}
