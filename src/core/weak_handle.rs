//! Non-owning forwarding handle.
//!
//! A timer that holds its target strongly keeps the target alive for as long
//! as the timer runs, and the target usually owns the timer. `WeakHandle`
//! breaks that cycle: it forwards calls while the target lives and turns into
//! a no-op once the last strong owner drops it.

use std::sync::{Arc, Mutex, Weak};

/// Weak reference to a `Mutex`-guarded target
pub struct WeakHandle<T> {
    target: Weak<Mutex<T>>,
}

impl<T> WeakHandle<T> {
    pub fn new(target: &Arc<Mutex<T>>) -> Self {
        Self {
            target: Arc::downgrade(target),
        }
    }

    /// Run `f` on the target. None once the target is gone.
    ///
    /// A poisoned target is recovered and still forwarded to.
    pub fn forward<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let target = self.target.upgrade()?;
        let mut guard = target.lock().unwrap_or_else(|e| e.into_inner());
        Some(f(&mut guard))
    }

    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Temporary strong reference, for callers that need more than one call
    pub fn upgrade(&self) -> Option<Arc<Mutex<T>>> {
        self.target.upgrade()
    }
}

// Manual impl: no `T: Clone` bound
impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            target: Weak::clone(&self.target),
        }
    }
}

impl<T> std::fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakHandle").field("alive", &self.is_alive()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwards_while_alive() {
        let target = Arc::new(Mutex::new(0u32));
        let handle = WeakHandle::new(&target);

        assert_eq!(handle.forward(|n| {
            *n += 5;
            *n
        }), Some(5));
        assert_eq!(*target.lock().unwrap(), 5);
        assert!(handle.is_alive());
    }

    #[test]
    fn test_noop_after_drop() {
        let target = Arc::new(Mutex::new(String::from("alive")));
        let handle = WeakHandle::new(&target);
        let copy = handle.clone();

        drop(target);
        assert!(!handle.is_alive());
        assert!(copy.forward(|s| s.len()).is_none());
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn test_handle_does_not_keep_target_alive() {
        let target = Arc::new(Mutex::new(1u8));
        let _handle = WeakHandle::new(&target);
        assert_eq!(Arc::strong_count(&target), 1);
    }
}
