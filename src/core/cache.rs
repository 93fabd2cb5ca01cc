//! Rolling-window frame cache with background prefetch
//!
//! Structure: one slot per frame index (`Empty | Ready | Undecodable`)
//! - O(1) lookup by index, no allocation churn on evict/regrow
//! - The poster slot is filled at construction and never evicted
//! - Residency is a forward window from the last requested index, wrapping
//!   modulo frame count; the poster always counts toward the window
//!
//! Foreground (`lookup` / `request_frame`) only ever `try_lock`s: a contended
//! lock is a miss for that tick, never a wait. The decode worker takes the
//! lock to pick a job and again to insert, never while decoding.

use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::core::sizing::{clamp_cache_size, MIN_FRAME_CACHE_SIZE};
use crate::core::worker::{DecodeWorker, PrefetchJobs};
use crate::entities::{Frame, FrameSource};
use crate::error::ConstructionError;

/// Cache statistics for monitoring performance
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    undecodable: AtomicU64,
    contended: AtomicU64,
    decoded: AtomicU64,
    decode_failures: AtomicU64,
    evicted: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub undecodable: u64,
    pub contended: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    pub evicted: u64,
    pub discarded: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.undecodable + self.contended;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

impl CacheStats {
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Why a lookup did not return the requested frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// Not decoded yet; the worker has been woken
    Pending,
    /// Decode failed earlier; never retried
    Undecodable,
    /// Cache lock busy this tick
    Contended,
    /// Index beyond frame count
    OutOfRange,
}

/// Result of a non-blocking cache lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(Frame),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Bounds observed together under the cache lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSizes {
    /// Resident frames, poster included
    pub current: usize,
    /// Configured bound
    pub max: usize,
    /// Bound in force right now (lower than `max` while degraded)
    pub effective: usize,
}

/// Tuning knobs fixed at construction
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Bound before clamping
    pub max_size: usize,
    /// Premultiply alpha on the worker before insertion
    pub predraw: bool,
    /// Window advances per doubling of the degraded cap
    pub recovery_interval: usize,
}

#[derive(Debug, Clone)]
enum FrameSlot {
    Empty,
    Ready(Frame),
    Undecodable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressureState {
    Normal,
    /// Window capped at `cap` until enough advances have been seen
    Degraded { cap: usize, advances: usize },
}

struct CacheState {
    slots: Vec<FrameSlot>,
    resident: usize,
    requested: usize, // Most recently requested index (window start)
    max_size: usize,
    pressure: PressureState,
    epoch: u64,
}

/// Everything the foreground and the decode worker share
pub(crate) struct CacheShared {
    state: Mutex<CacheState>,
    source: Arc<dyn FrameSource>,
    poster: Frame,
    poster_index: usize,
    frame_count: usize,
    predraw: bool,
    recovery_interval: usize,
    resident_count: AtomicUsize, // Mirror of state.resident for lock-free reads
    stats: CacheStats,
}

impl CacheState {
    /// Window size in force
    fn effective_size(&self) -> usize {
        match self.pressure {
            PressureState::Normal => self.max_size,
            PressureState::Degraded { cap, .. } => cap.min(self.max_size),
        }
    }
}

impl CacheShared {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Non-blocking lock; None when another thread holds it
    fn try_lock(&self) -> Option<MutexGuard<'_, CacheState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn forward_distance(&self, from: usize, to: usize) -> usize {
        (to + self.frame_count - from) % self.frame_count
    }

    /// Forward positions from `state.requested` covered by the window.
    ///
    /// The poster is always resident, so it takes one unit of the window size;
    /// if it falls inside the span it is skipped and the span grows by one.
    fn window_span(&self, state: &CacheState) -> usize {
        let others = state.effective_size().saturating_sub(1);
        let poster_distance = self.forward_distance(state.requested, self.poster_index);
        let span = if poster_distance < others { others + 1 } else { others };
        span.min(self.frame_count)
    }

    fn in_window(&self, state: &CacheState, index: usize) -> bool {
        index == self.poster_index || self.forward_distance(state.requested, index) < self.window_span(state)
    }

    /// Nearest-ahead index that still needs decoding
    fn next_needed(&self, state: &CacheState) -> Option<usize> {
        (0..self.window_span(state))
            .map(|d| (state.requested + d) % self.frame_count)
            .find(|&index| index != self.poster_index && matches!(state.slots[index], FrameSlot::Empty))
    }

    /// Drop resident frames outside the window, farthest behind playback first.
    ///
    /// Returns the evicted frames so the caller can free them after unlocking.
    fn evict_outside_window(&self, state: &mut CacheState) -> Vec<Frame> {
        let span = self.window_span(state);
        let mut evicted = Vec::new();

        for distance in (span..self.frame_count).rev() {
            let index = (state.requested + distance) % self.frame_count;
            if index == self.poster_index {
                continue;
            }
            if let FrameSlot::Ready(_) = state.slots[index] {
                if let FrameSlot::Ready(frame) = std::mem::replace(&mut state.slots[index], FrameSlot::Empty) {
                    evicted.push(frame);
                }
                state.resident -= 1;
            }
        }

        if !evicted.is_empty() {
            CacheStats::bump(&self.stats.evicted, evicted.len() as u64);
            debug!(
                "Evicted {} frames outside window [{}+{}] ({} resident)",
                evicted.len(),
                state.requested,
                span,
                state.resident
            );
        }
        self.resident_count.store(state.resident, Ordering::Release);
        evicted
    }

    /// Count a window advance toward leaving the degraded state
    fn note_advance(&self, state: &mut CacheState) {
        let PressureState::Degraded { cap, advances } = state.pressure else {
            return;
        };
        let advances = advances + 1;
        if advances < self.recovery_interval {
            state.pressure = PressureState::Degraded { cap, advances };
            return;
        }

        let grown = cap.saturating_mul(2);
        if grown >= state.max_size {
            state.pressure = PressureState::Normal;
            info!("Frame cache recovered from memory pressure (window {})", state.max_size);
        } else {
            state.pressure = PressureState::Degraded { cap: grown, advances: 0 };
            debug!("Frame cache regrowing after memory pressure: cap {}", grown);
        }
    }

    fn lookup(&self, index: usize) -> (CacheLookup, bool) {
        if index >= self.frame_count {
            return (CacheLookup::Miss(MissReason::OutOfRange), false);
        }

        let Some(mut state) = self.try_lock() else {
            CacheStats::bump(&self.stats.contended, 1);
            // The poster is immutable; no lock needed to hand it out
            if index == self.poster_index {
                CacheStats::bump(&self.stats.hits, 1);
                return (CacheLookup::Hit(self.poster.clone()), false);
            }
            return (CacheLookup::Miss(MissReason::Contended), true);
        };

        let mut evicted = Vec::new();
        let advanced = state.requested != index;
        if advanced {
            state.requested = index;
            self.note_advance(&mut state);
            evicted = self.evict_outside_window(&mut state);
        }

        let result = match &state.slots[index] {
            FrameSlot::Ready(frame) => {
                CacheStats::bump(&self.stats.hits, 1);
                CacheLookup::Hit(frame.clone())
            }
            FrameSlot::Undecodable => {
                CacheStats::bump(&self.stats.undecodable, 1);
                CacheLookup::Miss(MissReason::Undecodable)
            }
            FrameSlot::Empty => {
                CacheStats::bump(&self.stats.misses, 1);
                CacheLookup::Miss(MissReason::Pending)
            }
        };
        let needs_work = self.next_needed(&state).is_some();
        drop(state);
        drop(evicted);

        (result, needs_work)
    }
}

impl PrefetchJobs for CacheShared {
    fn run_next(&self) -> bool {
        let (index, epoch) = {
            let state = self.lock();
            match self.next_needed(&state) {
                Some(index) => (index, state.epoch),
                None => return false,
            }
        };

        // Decode without holding the lock
        let decoded = self
            .source
            .decode_frame(index)
            .map(|frame| if self.predraw { frame.predrawn() } else { frame });

        let mut state = self.lock();
        match decoded {
            Ok(frame) => {
                let stale = state.epoch != epoch || !self.in_window(&state, index);
                if stale || !matches!(state.slots[index], FrameSlot::Empty) {
                    CacheStats::bump(&self.stats.discarded, 1);
                    trace!("Discarded decode of frame {} (window moved)", index);
                } else {
                    let bytes = frame.mem();
                    state.slots[index] = FrameSlot::Ready(frame);
                    state.resident += 1;
                    CacheStats::bump(&self.stats.decoded, 1);
                    trace!("Cached frame {} ({} bytes, {} resident)", index, bytes, state.resident);
                }
            }
            Err(e) => {
                CacheStats::bump(&self.stats.decode_failures, 1);
                warn!("Frame {} is undecodable, using poster instead: {}", index, e);
                if matches!(state.slots[index], FrameSlot::Empty) {
                    state.slots[index] = FrameSlot::Undecodable;
                }
            }
        }
        let evicted = self.evict_outside_window(&mut state);
        drop(state);
        drop(evicted);
        true
    }
}

/// Bounded frame cache owned by an `AnimatedImage`.
pub struct FrameCache {
    shared: Arc<CacheShared>,
    worker: DecodeWorker,
}

impl FrameCache {
    /// Create the cache with the poster resident and start its decode worker.
    ///
    /// `undecodable` lists indices already known to fail (e.g. frames before
    /// the poster that could not be decoded).
    pub fn new(
        source: Arc<dyn FrameSource>,
        poster: Frame,
        undecodable: &[usize],
        options: CacheOptions,
    ) -> Result<Self, ConstructionError> {
        let frame_count = source.frame_count();
        if frame_count == 0 {
            return Err(ConstructionError::NoFrames);
        }
        let poster_index = poster.index();

        let mut slots = vec![FrameSlot::Empty; frame_count];
        for &index in undecodable {
            if index < frame_count && index != poster_index {
                slots[index] = FrameSlot::Undecodable;
            }
        }
        slots[poster_index] = FrameSlot::Ready(poster.clone());

        let max_size = clamp_cache_size(options.max_size, frame_count);
        let shared = Arc::new(CacheShared {
            state: Mutex::new(CacheState {
                slots,
                resident: 1,
                requested: poster_index,
                max_size,
                pressure: PressureState::Normal,
                epoch: 0,
            }),
            source,
            poster,
            poster_index,
            frame_count,
            predraw: options.predraw,
            recovery_interval: options.recovery_interval.max(1),
            resident_count: AtomicUsize::new(1),
            stats: CacheStats::default(),
        });

        let worker = DecodeWorker::spawn("gifreel-decode", Arc::clone(&shared))?;
        debug!(
            "FrameCache created: {} frames, max={}, poster={}, predraw={}",
            frame_count, max_size, poster_index, options.predraw
        );

        Ok(Self { shared, worker })
    }

    /// Non-blocking lookup that reports why it missed.
    ///
    /// Moves the window start to `index` and wakes the worker if anything in
    /// the new window still needs decoding.
    pub fn lookup(&self, index: usize) -> CacheLookup {
        let (result, needs_work) = self.shared.lookup(index);
        if needs_work {
            self.worker.wake();
        }
        result
    }

    /// Cached frame for `index`, or the poster if it is not resident yet.
    pub fn request_frame(&self, index: usize) -> Frame {
        match self.lookup(index) {
            CacheLookup::Hit(frame) => frame,
            CacheLookup::Miss(_) => self.shared.poster.clone(),
        }
    }

    /// Change the bound; shrinking evicts the excess immediately.
    pub fn set_max_cache_size(&self, size: usize) {
        let clamped = clamp_cache_size(size, self.shared.frame_count);
        let evicted = {
            let mut state = self.shared.lock();
            if state.max_size == clamped {
                return;
            }
            debug!("Frame cache max: {} -> {}", state.max_size, clamped);
            state.max_size = clamped;
            self.shared.evict_outside_window(&mut state)
        };
        drop(evicted);
        self.worker.wake();
    }

    /// Shrink to current + poster and stay degraded until playback settles.
    pub fn on_memory_pressure(&self) {
        let evicted = {
            let mut state = self.shared.lock();
            state.pressure = PressureState::Degraded {
                cap: MIN_FRAME_CACHE_SIZE,
                advances: 0,
            };
            self.shared.evict_outside_window(&mut state)
        };
        warn!(
            "Memory pressure: dropped {} cached frames ({} resident)",
            evicted.len(),
            self.frame_cache_size_current()
        );
        drop(evicted);
    }

    /// Drop every frame except the poster and discard in-flight decodes.
    pub fn purge(&self) {
        let freed = {
            let mut state = self.shared.lock();
            state.epoch += 1;
            let mut freed = Vec::new();
            for (index, slot) in state.slots.iter_mut().enumerate() {
                if index == self.shared.poster_index {
                    continue;
                }
                if let FrameSlot::Ready(_) = slot {
                    if let FrameSlot::Ready(frame) = std::mem::replace(slot, FrameSlot::Empty) {
                        freed.push(frame);
                    }
                }
            }
            state.resident = 1;
            self.shared.resident_count.store(1, Ordering::Release);
            CacheStats::bump(&self.shared.stats.evicted, freed.len() as u64);
            freed
        };
        debug!("Purged {} cached frames", freed.len());
        drop(freed);
        self.worker.wake();
    }

    /// Resident frames, poster included (lock-free)
    pub fn frame_cache_size_current(&self) -> usize {
        self.shared.resident_count.load(Ordering::Acquire)
    }

    /// Configured bound
    pub fn frame_cache_size_max(&self) -> usize {
        self.shared.lock().max_size
    }

    /// Current, max and effective bound read together
    pub fn sizes(&self) -> CacheSizes {
        let state = self.shared.lock();
        CacheSizes {
            current: state.resident,
            max: state.max_size,
            effective: state.effective_size(),
        }
    }

    /// Sorted resident indices, poster included
    pub fn resident_indices(&self) -> Vec<usize> {
        let state = self.shared.lock();
        state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, FrameSlot::Ready(_)))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.shared.lock().pressure, PressureState::Degraded { .. })
    }

    pub fn poster(&self) -> &Frame {
        &self.shared.poster
    }

    pub fn poster_index(&self) -> usize {
        self.shared.poster_index
    }

    pub fn frame_count(&self) -> usize {
        self.shared.frame_count
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{wait_until, TestSource};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn make_cache(source: TestSource, max_size: usize) -> (Arc<TestSource>, FrameCache) {
        let source = Arc::new(source);
        let poster = source.decode_frame(0).unwrap();
        let cache = FrameCache::new(
            Arc::clone(&source) as Arc<dyn FrameSource>,
            poster,
            &[],
            CacheOptions {
                max_size,
                predraw: false,
                recovery_interval: 2,
            },
        )
        .unwrap();
        (source, cache)
    }

    #[test]
    fn test_starts_with_poster_only() {
        let (_, cache) = make_cache(TestSource::new(10), 4);
        assert_eq!(cache.frame_cache_size_current(), 1);
        assert_eq!(cache.resident_indices(), vec![0]);
        assert_eq!(cache.frame_cache_size_max(), 4);
    }

    #[test]
    fn test_miss_returns_poster_then_hits() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let (_, cache) = make_cache(TestSource::new(10).gate(1, started_tx, release_rx), 4);

        assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), 1);
        let first = cache.request_frame(1);
        assert!(Frame::ptr_eq(&first, cache.poster()));

        release_tx.send(()).unwrap();
        assert!(wait_until(WAIT, || cache.lookup(1).is_hit()));
        assert_eq!(cache.request_frame(1).index(), 1);
    }

    #[test]
    fn test_window_fills_forward_and_rolls() {
        let (_, cache) = make_cache(TestSource::new(10), 4);

        cache.request_frame(0);
        assert!(wait_until(WAIT, || cache.resident_indices() == vec![0, 1, 2, 3]));

        // Window moves to 5: poster + 5, 6, 7
        cache.request_frame(5);
        assert!(cache.frame_cache_size_current() <= 4);
        assert!(wait_until(WAIT, || cache.resident_indices() == vec![0, 5, 6, 7]));

        // Wraps around the end; the poster stands in for 0
        cache.request_frame(8);
        assert!(wait_until(WAIT, || cache.resident_indices() == vec![0, 1, 8, 9]));
    }

    #[test]
    fn test_shrink_evicts_immediately() {
        let (_, cache) = make_cache(TestSource::new(8), 8);
        cache.request_frame(0);
        assert!(wait_until(WAIT, || cache.frame_cache_size_current() == 8));

        cache.request_frame(3);
        cache.set_max_cache_size(3);
        assert_eq!(cache.frame_cache_size_max(), 3);
        assert_eq!(cache.resident_indices(), vec![0, 3, 4]);

        // Clamped to the minimum, never below
        cache.set_max_cache_size(0);
        assert_eq!(cache.frame_cache_size_max(), MIN_FRAME_CACHE_SIZE);
        assert_eq!(cache.resident_indices(), vec![0, 3]);
    }

    #[test]
    fn test_memory_pressure_then_regrow() {
        let (_, cache) = make_cache(TestSource::new(12), 6);
        cache.request_frame(2);
        assert!(wait_until(WAIT, || cache.frame_cache_size_current() == 6));

        cache.on_memory_pressure();
        assert!(cache.frame_cache_size_current() <= 2);
        assert!(cache.is_degraded());
        assert_eq!(cache.sizes().effective, MIN_FRAME_CACHE_SIZE);

        // Steady playback: advance one frame at a time
        for step in 0..24 {
            cache.request_frame((3 + step) % 12);
            let sizes = cache.sizes();
            assert!(sizes.current <= sizes.max);
            std::thread::sleep(Duration::from_millis(2));
        }

        assert!(!cache.is_degraded());
        assert!(wait_until(WAIT, || cache.frame_cache_size_current() == 6));
        assert!(cache.frame_cache_size_current() <= cache.frame_cache_size_max());
    }

    #[test]
    fn test_undecodable_is_never_retried() {
        let (source, cache) = make_cache(TestSource::new(6).failing(&[2]), 6);

        cache.request_frame(0);
        assert!(wait_until(WAIT, || cache.stats().decode_failures == 1));
        assert!(wait_until(WAIT, || cache.frame_cache_size_current() == 5));

        for _ in 0..20 {
            let frame = cache.request_frame(2);
            assert!(Frame::ptr_eq(&frame, cache.poster()));
        }
        assert!(matches!(cache.lookup(2), CacheLookup::Miss(MissReason::Undecodable)));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(source.decodes_of(2), 1);
        assert_eq!(cache.stats().decode_failures, 1);
    }

    #[test]
    fn test_contended_lookup_falls_back() {
        let (_, cache) = make_cache(TestSource::new(4), 4);

        let guard = cache.shared.lock();
        assert!(matches!(cache.lookup(1), CacheLookup::Miss(MissReason::Contended)));
        // Poster still hits without the lock
        assert!(cache.lookup(0).is_hit());
        drop(guard);

        assert_eq!(cache.stats().contended, 2);
    }

    #[test]
    fn test_out_of_range_returns_poster() {
        let (_, cache) = make_cache(TestSource::new(3), 3);
        assert!(matches!(cache.lookup(3), CacheLookup::Miss(MissReason::OutOfRange)));
        assert!(Frame::ptr_eq(&cache.request_frame(99), cache.poster()));
    }

    #[test]
    fn test_stale_decode_is_discarded() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let (source, cache) = make_cache(TestSource::new(10).gate(1, started_tx, release_rx), 2);

        // Window {0, 1}: the worker starts on frame 1 and blocks
        cache.request_frame(0);
        assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), 1);

        // Playback jumps away; frame 1 falls out of the window
        cache.request_frame(6);
        release_tx.send(()).unwrap();

        assert!(wait_until(WAIT, || cache.stats().discarded == 1));
        assert!(wait_until(WAIT, || cache.resident_indices() == vec![0, 6]));
        assert_eq!(source.decodes_of(1), 1);
    }

    #[test]
    fn test_purge_keeps_poster() {
        let (_, cache) = make_cache(TestSource::new(5), 5);
        cache.request_frame(0);
        assert!(wait_until(WAIT, || cache.frame_cache_size_current() == 5));

        cache.purge();
        assert!(cache.lookup(0).is_hit());

        // Worker refills the window afterwards
        assert!(wait_until(WAIT, || cache.frame_cache_size_current() == 5));
    }

    #[test]
    fn test_single_frame_cache() {
        let (_, cache) = make_cache(TestSource::new(1), 5);
        assert_eq!(cache.frame_cache_size_max(), 1);
        assert!(cache.lookup(0).is_hit());
        cache.on_memory_pressure();
        assert_eq!(cache.frame_cache_size_current(), 1);
    }

    #[test]
    fn test_predraw_on_worker() {
        let source = Arc::new(TestSource::new(3));
        let poster = source.decode_frame(0).unwrap().predrawn();
        let cache = FrameCache::new(
            source as Arc<dyn FrameSource>,
            poster,
            &[],
            CacheOptions {
                max_size: 3,
                predraw: true,
                recovery_interval: 2,
            },
        )
        .unwrap();

        cache.request_frame(0);
        assert!(wait_until(WAIT, || cache.lookup(2).is_hit()));
        assert_eq!(
            cache.request_frame(2).layout(),
            crate::entities::PixelLayout::PremultipliedRgba8
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Request(usize),
        SetMax(usize),
        Pressure,
        Pause(u64),
    }

    fn op_strategy(frame_count: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (0..frame_count).prop_map(Op::Request),
            2 => (0..frame_count + 4).prop_map(Op::SetMax),
            1 => Just(Op::Pressure),
            2 => (0u64..300).prop_map(Op::Pause),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_bounds_hold_under_interleaving(
            initial_max in 2usize..40,
            ops in proptest::collection::vec(op_strategy(300), 1..120),
        ) {
            let source = TestSource::new(300).latency(Duration::from_micros(150));
            let (_, cache) = make_cache(source, initial_max);
            let cache = Arc::new(cache);

            // Sample concurrently with the worker and the op stream
            let stop = Arc::new(AtomicBool::new(false));
            let sampler = {
                let cache = Arc::clone(&cache);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    let mut violations = 0usize;
                    while !stop.load(Ordering::Relaxed) {
                        let sizes = cache.sizes();
                        if sizes.current > sizes.max || sizes.current > 300 || sizes.current > sizes.effective {
                            violations += 1;
                        }
                        std::thread::yield_now();
                    }
                    violations
                })
            };

            for op in ops {
                match op {
                    Op::Request(index) => { cache.request_frame(index); }
                    Op::SetMax(size) => cache.set_max_cache_size(size),
                    Op::Pressure => cache.on_memory_pressure(),
                    Op::Pause(micros) => std::thread::sleep(Duration::from_micros(micros)),
                }
                let sizes = cache.sizes();
                prop_assert!(sizes.current <= sizes.max);
                prop_assert!(cache.frame_cache_size_current() <= 300);
                prop_assert!(cache.resident_indices().contains(&0));
            }

            stop.store(true, Ordering::Relaxed);
            let violations = sampler.join().unwrap();
            prop_assert_eq!(violations, 0);
        }
    }
}
