//! Reference display clock
//!
//! **Why**: The playback driver is clock-agnostic: it only needs a periodic
//! `on_tick(dt)`. Hosts with a real display link drive it themselves; headless
//! hosts (the `gifreel` binary, tests) use `IntervalClock`.
//!
//! **Used by**: `gifreel` binary, integration tests
//!
//! The clock only holds a [`WeakHandle`] to its target. When the target is
//! dropped the next tick finds nothing to forward to and the thread exits.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::weak_handle::WeakHandle;

/// Opaque selector passed through to the clock (thread naming, logs)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunContext(String);

impl RunContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something driven by a periodic clock
pub trait TickTarget: Send {
    /// `dt`: wall time since the previous tick
    fn on_tick(&mut self, dt: Duration);
}

/// Thread that ticks a target at a fixed interval
pub struct IntervalClock {
    handle: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    context: RunContext,
}

impl IntervalClock {
    pub fn spawn<T: TickTarget + 'static>(
        target: WeakHandle<T>,
        interval: Duration,
        context: RunContext,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let name = format!("gifreel-clock-{}", context);
        let thread_context = context.clone();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run_clock(target, interval, &thread_stop, &thread_context))?;

        debug!("IntervalClock started: {:?} interval, context '{}'", interval, context);
        Ok(Self {
            handle: Some(handle),
            stop,
            context,
        })
    }

    /// Ask the thread to exit after the current tick
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }
}

fn run_clock<T: TickTarget>(target: WeakHandle<T>, interval: Duration, stop: &AtomicBool, context: &RunContext) {
    let mut last = Instant::now();
    let mut next = last + interval;

    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        }
        next += interval;

        let now = Instant::now();
        let dt = now - last;
        last = now;

        // Fell far behind (suspended, debugger): resync instead of bursting
        if next < now {
            next = now + interval;
        }

        if target.forward(|t| t.on_tick(dt)).is_none() {
            trace!("Clock '{}': target dropped, exiting", context);
            break;
        }
    }

    trace!("Clock '{}' stopped", context);
}

impl Drop for IntervalClock {
    fn drop(&mut self) {
        self.stop();
        let Some(handle) = self.handle.take() else {
            return;
        };

        let deadline = Instant::now() + Duration::from_millis(500);
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                trace!("Clock '{}' shutdown timeout reached, detaching", self.context);
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wait_until;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counter {
        ticks: usize,
        elapsed: Duration,
    }

    impl TickTarget for Counter {
        fn on_tick(&mut self, dt: Duration) {
            self.ticks += 1;
            self.elapsed += dt;
        }
    }

    #[test]
    fn test_ticks_target() {
        let target = Arc::new(Mutex::new(Counter::default()));
        let clock = IntervalClock::spawn(
            WeakHandle::new(&target),
            Duration::from_millis(2),
            RunContext::new("test"),
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(5), || target.lock().unwrap().ticks >= 5));
        assert!(target.lock().unwrap().elapsed > Duration::ZERO);
        assert_eq!(clock.context().as_str(), "test");
    }

    #[test]
    fn test_exits_when_target_dropped() {
        let target = Arc::new(Mutex::new(Counter::default()));
        let clock = IntervalClock::spawn(
            WeakHandle::new(&target),
            Duration::from_millis(1),
            RunContext::default(),
        )
        .unwrap();

        assert!(clock.is_running());
        drop(target);
        assert!(wait_until(Duration::from_secs(5), || !clock.is_running()));
    }

    #[test]
    fn test_stop() {
        let target = Arc::new(Mutex::new(Counter::default()));
        let clock = IntervalClock::spawn(
            WeakHandle::new(&target),
            Duration::from_millis(1),
            RunContext::default(),
        )
        .unwrap();

        clock.stop();
        assert!(wait_until(Duration::from_secs(5), || !clock.is_running()));

        let ticks = target.lock().unwrap().ticks;
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(target.lock().unwrap().ticks, ticks);
    }

    #[test]
    fn test_run_context_default_and_serde() {
        assert_eq!(RunContext::default().as_str(), "default");
        let json = serde_json::to_string(&RunContext::new("ui")).unwrap();
        assert_eq!(json, "\"ui\"");
    }
}
