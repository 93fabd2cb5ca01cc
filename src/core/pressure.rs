//! Memory-pressure fan-out
//!
//! **Why**: Low-memory notifications are process-wide, frame caches are
//! per-image. The monitor keeps weak references to every registered image and
//! forwards a notification to the ones still alive.
//!
//! **Used by**: `gifreel` binary (polling), hosts with their own OS hook
//! (`notify`)
//!
//! Polling reads available memory through `sysinfo` and is edge-triggered:
//! one notification when available memory drops below the threshold, none
//! again until it has recovered above it.

use log::{debug, warn};
use std::sync::{Arc, Weak};
use sysinfo::System;

use crate::entities::AnimatedImage;

const MEGABYTE: u64 = 1024 * 1024;

pub struct PressureMonitor {
    images: Vec<Weak<AnimatedImage>>,
    low_memory_bytes: u64,
    system: System,
    was_low: bool,
}

impl PressureMonitor {
    /// `low_memory_mb`: available memory below which `poll` raises a warning
    pub fn new(low_memory_mb: u64) -> Self {
        Self {
            images: Vec::new(),
            low_memory_bytes: low_memory_mb.saturating_mul(MEGABYTE),
            system: System::new(),
            was_low: false,
        }
    }

    /// Track an image without keeping it alive
    pub fn register(&mut self, image: &Arc<AnimatedImage>) {
        self.images.retain(|weak| weak.strong_count() > 0);
        self.images.push(Arc::downgrade(image));
    }

    /// Live registered images
    pub fn len(&self) -> usize {
        self.images.iter().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward a memory warning to every live image. Returns how many got it.
    pub fn notify(&mut self) -> usize {
        let mut notified = 0;
        self.images.retain(|weak| match weak.upgrade() {
            Some(image) => {
                image.on_memory_pressure();
                notified += 1;
                true
            }
            None => false,
        });
        debug!("Memory warning forwarded to {} images", notified);
        notified
    }

    /// Available system memory in bytes
    pub fn available_bytes(&mut self) -> u64 {
        self.system.refresh_memory();
        self.system.available_memory()
    }

    /// Sample system memory; notify on the transition into low memory.
    ///
    /// Returns true if a notification was sent.
    pub fn poll(&mut self) -> bool {
        let available = self.available_bytes();
        self.check(available)
    }

    fn check(&mut self, available: u64) -> bool {
        let low = available < self.low_memory_bytes;
        let fire = low && !self.was_low;
        self.was_low = low;

        if fire {
            warn!(
                "Available memory {} MB below {} MB, shrinking frame caches",
                available / MEGABYTE,
                self.low_memory_bytes / MEGABYTE
            );
            self.notify();
        }
        fire
    }
}

impl std::fmt::Debug for PressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PressureMonitor")
            .field("images", &self.images.len())
            .field("low_memory_bytes", &self.low_memory_bytes)
            .field("was_low", &self.was_low)
            .finish()
    }
}
