//! Playback driver with per-frame delay accounting
//!
//! **Architecture**: The driver does NOT decode and does NOT own frames. It
//! holds an `Arc<AnimatedImage>`, asks the image's cache for the current index
//! on every tick, and keeps only the one frame it is presenting.
//!
//! **Why**: Animated images carry per-frame delays, not a fixed FPS. Display
//! clocks tick at their own cadence, so the driver accumulates elapsed time and
//! catches up over as many frames as the elapsed time covers.
//!
//! **Used by**: `IntervalClock` (through `TickTarget`), the `gifreel` binary
//!
//! # Timing Model
//!
//! - `accumulated` grows by `dt` each tick
//! - While it covers the current frame's delay: subtract it, advance one frame
//! - Wrapping past the last frame consumes one loop; the final wrap finishes
//!   playback and leaves the last frame on screen
//! - Whole passes inside `accumulated` are skipped arithmetically, never past
//!   the final pass of a finite loop count
//!
//! # Misses
//!
//! A frame not yet decoded is not an error. `MissPolicy` decides what is shown
//! instead: the poster (default) or the previously presented frame.

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::cache::CacheLookup;
use super::clock::{RunContext, TickTarget};
use crate::entities::{AnimatedImage, Frame};

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    /// Finite loop count exhausted
    Finished,
}

/// What to present when the current frame is not cached yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissPolicy {
    #[default]
    #[serde(rename = "poster")]
    ShowPoster,
    #[serde(rename = "hold")]
    HoldPrevious,
}

/// Loop-completion callback; receives the remaining loop count (always 0)
pub type LoopFinished = Box<dyn FnMut(u32) + Send>;

pub struct PlaybackDriver {
    image: Option<Arc<AnimatedImage>>,
    state: PlaybackState,
    current_index: usize,
    accumulated: Duration,
    loops_remaining: Option<u32>, // None = infinite
    current_frame: Option<Frame>,
    miss_policy: MissPolicy,
    run_context: RunContext,
    on_loop_finished: Option<LoopFinished>,
}

impl Default for PlaybackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDriver {
    pub fn new() -> Self {
        Self {
            image: None,
            state: PlaybackState::Stopped,
            current_index: 0,
            accumulated: Duration::ZERO,
            loops_remaining: None,
            current_frame: None,
            miss_policy: MissPolicy::default(),
            run_context: RunContext::default(),
            on_loop_finished: None,
        }
    }

    /// Attach (or detach) an image; playback rewinds to frame 0.
    ///
    /// A playing driver keeps playing the new image.
    pub fn set_image(&mut self, image: Option<Arc<AnimatedImage>>) {
        self.image = image;
        self.rewind();
        self.current_frame = self.image.as_ref().map(|img| img.poster_image().clone());

        match &self.image {
            Some(img) => {
                debug!(
                    "Driver attached image: {} frames, loop_count={}",
                    img.frame_count(),
                    img.loop_count()
                );
                self.resolve_current_frame();
            }
            None => self.state = PlaybackState::Stopped,
        }
        if self.state != PlaybackState::Playing {
            self.state = PlaybackState::Stopped;
        }
    }

    pub fn image(&self) -> Option<&Arc<AnimatedImage>> {
        self.image.as_ref()
    }

    /// Play from the current position; from `Finished` start over.
    pub fn start(&mut self) {
        if self.image.is_none() {
            warn!("start() with no image attached, ignoring");
            return;
        }
        if self.state == PlaybackState::Finished || self.loops_remaining == Some(0) {
            self.rewind();
            self.resolve_current_frame();
        }
        if self.state != PlaybackState::Playing {
            trace!("Playback started at frame {}", self.current_index);
        }
        self.state = PlaybackState::Playing;
    }

    /// Keep position and accumulated time
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            trace!("Playback paused at frame {}", self.current_index);
        }
    }

    /// Keep position, drop accumulated time
    pub fn stop(&mut self) {
        if self.state != PlaybackState::Stopped {
            trace!("Playback stopped at frame {}", self.current_index);
        }
        self.state = PlaybackState::Stopped;
        self.accumulated = Duration::ZERO;
    }

    /// Advance by `dt`. Returns the new index if the frame changed.
    pub fn tick(&mut self, dt: Duration) -> Option<usize> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        let image = Arc::clone(self.image.as_ref()?);
        let frame_count = image.frame_count();
        if frame_count <= 1 {
            self.resolve_current_frame();
            return None;
        }

        let previous = self.current_index;
        self.accumulated = self.accumulated.saturating_add(dt);
        self.skip_whole_passes(&image);

        // Bounded: after the pass skip, one pass at most
        let mut steps = 0;
        while steps < frame_count {
            let delay = image.delay(self.current_index).unwrap_or_default();
            if self.accumulated < delay {
                break;
            }
            steps += 1;

            let next = (self.current_index + 1) % frame_count;
            if next == 0 && self.consume_loop() {
                self.finish();
                break;
            }
            self.accumulated -= delay;
            self.current_index = next;
        }
        if image.total_duration().is_zero() {
            self.accumulated = Duration::ZERO;
        }

        self.resolve_current_frame();

        if self.current_index != previous {
            trace!("Frame {} -> {}", previous, self.current_index);
            Some(self.current_index)
        } else {
            None
        }
    }

    /// Drop whole passes from `accumulated`, counting loops.
    fn skip_whole_passes(&mut self, image: &AnimatedImage) {
        let pass = image.total_duration().as_nanos();
        if pass == 0 {
            return;
        }
        let passes = self.accumulated.as_nanos() / pass;
        let skip = match self.loops_remaining {
            None => passes,
            // Leave the last loop to the stepping loop so it can finish
            Some(remaining) => passes.min(u128::from(remaining.saturating_sub(1))),
        };
        if skip == 0 {
            return;
        }

        let left = self.accumulated.as_nanos() - pass * skip;
        self.accumulated = Duration::from_nanos(u64::try_from(left).unwrap_or(u64::MAX));
        if let Some(remaining) = self.loops_remaining.as_mut() {
            *remaining -= u32::try_from(skip).unwrap_or(*remaining);
        }
        trace!("Skipped {} whole passes", skip);
    }

    /// Count one completed pass. True when that was the last loop.
    fn consume_loop(&mut self) -> bool {
        match self.loops_remaining.as_mut() {
            None => false,
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
        }
    }

    fn finish(&mut self) {
        self.state = PlaybackState::Finished;
        self.accumulated = Duration::ZERO;
        info!("Playback finished on frame {}", self.current_index);
        if let Some(callback) = self.on_loop_finished.as_mut() {
            callback(0);
        }
    }

    fn rewind(&mut self) {
        self.current_index = 0;
        self.accumulated = Duration::ZERO;
        self.loops_remaining = match self.image.as_ref().map(|img| img.loop_count()) {
            Some(0) | None => None,
            Some(count) => Some(count),
        };
    }

    /// Look up the current index and apply the miss policy
    fn resolve_current_frame(&mut self) {
        let Some(image) = self.image.as_ref() else {
            return;
        };
        match image.lookup(self.current_index) {
            CacheLookup::Hit(frame) => self.current_frame = Some(frame),
            CacheLookup::Miss(reason) => {
                trace!("Frame {} missed ({:?}), policy {:?}", self.current_index, reason, self.miss_policy);
                match self.miss_policy {
                    MissPolicy::ShowPoster => self.current_frame = Some(image.poster_image().clone()),
                    MissPolicy::HoldPrevious => {
                        if self.current_frame.is_none() {
                            self.current_frame = Some(image.poster_image().clone());
                        }
                    }
                }
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Frame being presented (poster or cached frame)
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current_frame.as_ref()
    }

    pub fn current_frame_index(&self) -> usize {
        self.current_index
    }

    /// Time spent inside the current frame's delay
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    /// None for infinite loops
    pub fn loops_remaining(&self) -> Option<u32> {
        self.loops_remaining
    }

    pub fn miss_policy(&self) -> MissPolicy {
        self.miss_policy
    }

    pub fn set_miss_policy(&mut self, policy: MissPolicy) {
        self.miss_policy = policy;
    }

    pub fn run_context(&self) -> &RunContext {
        &self.run_context
    }

    pub fn set_run_context(&mut self, context: RunContext) {
        self.run_context = context;
    }

    /// Fires once when a finite loop count runs out; never for infinite loops
    pub fn set_on_loop_finished(&mut self, callback: impl FnMut(u32) + Send + 'static) {
        self.on_loop_finished = Some(Box::new(callback));
    }
}

impl TickTarget for PlaybackDriver {
    fn on_tick(&mut self, dt: Duration) {
        self.tick(dt);
    }
}

impl std::fmt::Debug for PlaybackDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackDriver")
            .field("state", &self.state)
            .field("current_index", &self.current_index)
            .field("accumulated", &self.accumulated)
            .field("loops_remaining", &self.loops_remaining)
            .field("miss_policy", &self.miss_policy)
            .field("run_context", &self.run_context)
            .finish()
    }
}
