//! Frame cache sizing policies
//!
//! **Why**: Caching every frame is ideal for small animations and ruinous for
//! long, large ones. The default window size is a policy decision, so it is a
//! trait: callers can swap in their own heuristic.
//!
//! **Used by**: `AnimatedImage` construction (when no explicit hint is given)
//!
//! # Built-in policies
//!
//! - `ByteBudgetPolicy` (default): estimated decoded size of the whole
//!   animation decides between "all frames", a small window, or the minimum
//! - `AvailableMemoryPolicy`: a fraction of currently available system memory

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use sysinfo::System;

/// Smallest window: current frame + poster
pub const MIN_FRAME_CACHE_SIZE: usize = 2;

const MEGABYTE: u64 = 1024 * 1024;

/// What a policy gets to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingInput {
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
}

impl SizingInput {
    /// Decoded RGBA bytes per frame
    pub fn bytes_per_frame(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }

    /// Decoded RGBA bytes if every frame were resident
    pub fn total_bytes(&self) -> u64 {
        self.bytes_per_frame().saturating_mul(self.frame_count as u64)
    }
}

/// Default cache size heuristic. Results are clamped by the caller.
pub trait SizingPolicy: Send + Sync + Debug {
    fn optimal_frame_cache_size(&self, input: &SizingInput) -> usize;
}

/// Clamp a requested size to `[MIN_FRAME_CACHE_SIZE, frame_count]`.
///
/// A single-frame image clamps to 1.
pub fn clamp_cache_size(size: usize, frame_count: usize) -> usize {
    size.max(MIN_FRAME_CACHE_SIZE).min(frame_count.max(1))
}

/// Explicit hint wins; otherwise ask the policy. Always clamped.
pub fn resolve_cache_size(hint: Option<usize>, policy: &dyn SizingPolicy, input: &SizingInput) -> usize {
    let raw = match hint {
        Some(size) => size,
        None => policy.optimal_frame_cache_size(input),
    };
    let size = clamp_cache_size(raw, input.frame_count);
    info!(
        "Frame cache size: {} of {} frames ({}, {} MB decoded total)",
        size,
        input.frame_count,
        if hint.is_some() { "explicit" } else { "policy" },
        input.total_bytes() / MEGABYTE
    );
    size
}

/// Size categories by total decoded bytes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ByteBudgetPolicy {
    /// At or below this many MB decoded, cache every frame
    pub all_frames_mb: u64,
    /// At or below this many MB decoded, use `window_frames`
    pub window_mb: u64,
    pub window_frames: usize,
}

impl Default for ByteBudgetPolicy {
    fn default() -> Self {
        Self {
            all_frames_mb: 10,
            window_mb: 75,
            window_frames: 5,
        }
    }
}

impl SizingPolicy for ByteBudgetPolicy {
    fn optimal_frame_cache_size(&self, input: &SizingInput) -> usize {
        let total_mb = input.total_bytes() / MEGABYTE;
        let size = if total_mb <= self.all_frames_mb {
            input.frame_count
        } else if total_mb <= self.window_mb {
            self.window_frames
        } else {
            MIN_FRAME_CACHE_SIZE
        };
        debug!("ByteBudgetPolicy: {} MB decoded -> {} frames", total_mb, size);
        size
    }
}

/// Budget from live system memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AvailableMemoryPolicy {
    /// Fraction of available memory (0.0-1.0)
    pub mem_fraction: f64,
    /// Memory left alone for the rest of the system (GB)
    pub reserve_gb: f64,
}

impl Default for AvailableMemoryPolicy {
    fn default() -> Self {
        Self {
            mem_fraction: 0.05,
            reserve_gb: 1.0,
        }
    }
}

impl AvailableMemoryPolicy {
    /// Byte budget for frame data right now
    pub fn budget_bytes(&self) -> u64 {
        let mut sys = System::new();
        sys.refresh_memory();

        let available = sys.available_memory();
        let reserve = (self.reserve_gb * 1024.0 * 1024.0 * 1024.0) as u64;
        let usable = available.saturating_sub(reserve);
        let budget = (usable as f64 * self.mem_fraction.clamp(0.0, 1.0)) as u64;

        debug!(
            "AvailableMemoryPolicy: available={} MB, reserve={} MB, budget={} MB",
            available / MEGABYTE,
            reserve / MEGABYTE,
            budget / MEGABYTE
        );
        budget
    }
}

impl SizingPolicy for AvailableMemoryPolicy {
    fn optimal_frame_cache_size(&self, input: &SizingInput) -> usize {
        let per_frame = input.bytes_per_frame().max(1);
        let frames = self.budget_bytes() / per_frame;
        usize::try_from(frames).unwrap_or(usize::MAX).min(input.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(frame_count: usize, width: u32, height: u32) -> SizingInput {
        SizingInput {
            frame_count,
            width,
            height,
        }
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_cache_size(0, 10), MIN_FRAME_CACHE_SIZE);
        assert_eq!(clamp_cache_size(7, 10), 7);
        assert_eq!(clamp_cache_size(50, 10), 10);
        // Single-frame images cannot hold two frames
        assert_eq!(clamp_cache_size(5, 1), 1);
    }

    #[test]
    fn test_byte_budget_categories() {
        let policy = ByteBudgetPolicy::default();

        // 100 frames of 64x64 = 1.6 MB -> everything
        assert_eq!(policy.optimal_frame_cache_size(&input(100, 64, 64)), 100);

        // 50 frames of 512x512 = 50 MB -> window
        assert_eq!(policy.optimal_frame_cache_size(&input(50, 512, 512)), 5);

        // 200 frames of 1024x1024 = 800 MB -> minimum
        assert_eq!(
            policy.optimal_frame_cache_size(&input(200, 1024, 1024)),
            MIN_FRAME_CACHE_SIZE
        );
    }

    #[test]
    fn test_resolve_prefers_hint() {
        let policy = ByteBudgetPolicy::default();
        let small = input(30, 16, 16);

        assert_eq!(resolve_cache_size(None, &policy, &small), 30);
        assert_eq!(resolve_cache_size(Some(4), &policy, &small), 4);
        assert_eq!(resolve_cache_size(Some(1), &policy, &small), MIN_FRAME_CACHE_SIZE);
        assert_eq!(resolve_cache_size(Some(99), &policy, &small), 30);
    }

    #[test]
    fn test_available_memory_policy_is_bounded() {
        let policy = AvailableMemoryPolicy::default();
        let size = resolve_cache_size(None, &policy, &input(40, 32, 32));
        assert!((MIN_FRAME_CACHE_SIZE..=40).contains(&size));
    }
}
