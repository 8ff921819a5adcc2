//! Debug-only detection of containers being mutated from two threads at once.
//!
//! This is not a lock. Correct callers never contend, so the detector only
//! records which thread currently holds a container and panics if a second
//! thread tries to take it. The same thread may nest acquisitions. In release
//! builds every check compiles to nothing.

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub struct ThreadingDetector {
    name: &'static str,
    #[cfg(debug_assertions)]
    owner: AtomicU64,
    #[cfg(debug_assertions)]
    depth: AtomicU32,
}

#[cfg(debug_assertions)]
fn current_thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }

    TOKEN.with(|t| *t)
}

impl ThreadingDetector {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            #[cfg(debug_assertions)]
            owner: AtomicU64::new(0),
            #[cfg(debug_assertions)]
            depth: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Marks the calling thread as the holder.
    ///
    /// # Panics
    ///
    /// Panics (in debug builds) if another thread currently holds it.
    #[track_caller]
    pub fn check_and_lock(&self) {
        #[cfg(debug_assertions)]
        {
            let me = current_thread_token();
            match self
                .owner
                .compare_exchange(0, me, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => {}
                Err(owner) if owner == me => {}
                Err(_) => panic!("accessing {} from multiple threads", self.name),
            }
            self.depth.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Undoes one [`check_and_lock`](Self::check_and_lock).
    #[track_caller]
    pub fn check_and_unlock(&self) {
        #[cfg(debug_assertions)]
        {
            let me = current_thread_token();
            assert_eq!(
                self.owner.load(Ordering::Relaxed),
                me,
                "{} released by a thread that does not hold it",
                self.name
            );
            if self.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
                self.owner.store(0, Ordering::Release);
            }
        }
    }

    /// Locks for the lifetime of the returned guard.
    #[track_caller]
    pub fn lock(&self) -> DetectorGuard<'_> {
        self.check_and_lock();
        DetectorGuard { detector: self }
    }

    /// Whether any thread currently holds this detector. Always `false` in
    /// release builds.
    pub fn is_held(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.owner.load(Ordering::Relaxed) != 0
        }
        #[cfg(not(debug_assertions))]
        {
            false
        }
    }
}

/// A copy starts out unheld.
impl Clone for ThreadingDetector {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

impl std::fmt::Debug for ThreadingDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadingDetector")
            .field("name", &self.name)
            .field("held", &self.is_held())
            .finish()
    }
}

#[must_use]
pub struct DetectorGuard<'a> {
    detector: &'a ThreadingDetector,
}

impl Drop for DetectorGuard<'_> {
    fn drop(&mut self) {
        self.detector.check_and_unlock();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn same_thread_may_nest() {
        let detector = ThreadingDetector::new("container");

        let outer = detector.lock();
        let inner = detector.lock();
        drop(inner);
        drop(outer);

        assert!(!detector.is_held());

        // Another thread can take it once released.
        thread::scope(|s| {
            s.spawn(|| drop(detector.lock()));
        });
    }

    #[cfg(debug_assertions)]
    #[test]
    fn second_thread_is_rejected() {
        let detector = ThreadingDetector::new("container");
        let _guard = detector.lock();

        let result = thread::scope(|s| s.spawn(|| detector.check_and_lock()).join());

        assert!(result.is_err());
        assert!(detector.is_held());
    }
}
