//! Background decode worker
//!
//! One thread per animated image runs the cache's prefetch loop:
//! - Ask the job source for one unit of work and run it
//! - When there is nothing to do, park on the wake channel (no spinning)
//! - Foreground wakes it when the playback position or window bounds change
//!
//! The wake channel is bounded(1): any number of wake-ups between two parks
//! collapse into one.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Work the decode thread pulls from.
pub trait PrefetchJobs: Send + Sync + 'static {
    /// Run one unit of work. Returns false when nothing is left to do.
    fn run_next(&self) -> bool;
}

/// Single background thread with park/wake scheduling.
///
/// # Example
/// ```ignore
/// let worker = DecodeWorker::spawn("gifreel-decode", Arc::clone(&jobs))?;
/// worker.wake(); // playback advanced, go fill the window
/// ```
pub struct DecodeWorker {
    wake: Sender<()>,
    handle: Option<thread::JoinHandle<()>>, // Thread handle for shutdown
    shutdown: Arc<AtomicBool>,
}

impl DecodeWorker {
    pub fn spawn<J: PrefetchJobs>(name: &str, jobs: Arc<J>) -> std::io::Result<Self> {
        let (wake, wake_rx) = crossbeam_channel::bounded::<()>(1);
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_loop(&thread_name, jobs.as_ref(), &wake_rx, &thread_shutdown))?;

        Ok(Self {
            wake,
            handle: Some(handle),
            shutdown,
        })
    }

    /// Nudge the worker; never blocks.
    pub fn wake(&self) {
        match self.wake.try_send(()) {
            // Full means a wake-up is already pending
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => trace!("Decode worker already stopped"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

fn run_loop(name: &str, jobs: &dyn PrefetchJobs, wake: &Receiver<()>, shutdown: &AtomicBool) {
    trace!("{} started", name);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        if jobs.run_next() {
            continue;
        }

        // Idle: park until woken (or the sender is dropped)
        if wake.recv().is_err() {
            break;
        }
    }

    trace!("{} stopped", name);
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake();

        let Some(handle) = self.handle.take() else {
            return;
        };

        // A decode in flight finishes first; don't wait forever on a huge frame
        let deadline = Instant::now() + Duration::from_millis(500);
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                trace!("Decode worker shutdown timeout reached, detaching");
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
    use std::sync::atomic::AtomicUsize;

    /// Counts down a fixed amount of work
    struct Countdown {
        remaining: AtomicUsize,
        runs: AtomicUsize,
    }

    impl PrefetchJobs for Countdown {
        fn run_next(&self) -> bool {
            let left = self.remaining.load(Ordering::SeqCst);
            if left == 0 {
                return false;
            }
            self.remaining.store(left - 1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_drains_then_parks_then_wakes() {
        let jobs = Arc::new(Countdown {
            remaining: AtomicUsize::new(5),
            runs: AtomicUsize::new(0),
        });
        let worker = DecodeWorker::spawn("test-decode", Arc::clone(&jobs)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || jobs.runs.load(Ordering::SeqCst) == 5));
        assert!(worker.is_running());

        // New work only runs after a wake-up
        jobs.remaining.store(3, Ordering::SeqCst);
        worker.wake();
        assert!(wait_until(Duration::from_secs(2), || jobs.runs.load(Ordering::SeqCst) == 8));
    }

    #[test]
    fn test_drop_stops_thread() {
        let jobs = Arc::new(Countdown {
            remaining: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        });
        let worker = DecodeWorker::spawn("test-decode", Arc::clone(&jobs)).unwrap();
        drop(worker);

        // Worker released its reference to the jobs
        assert!(wait_until(Duration::from_secs(2), || Arc::strong_count(&jobs) == 1));
    }
}
