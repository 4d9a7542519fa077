//! Pool-scoped mutual exclusion.
//!
//! The pool's bookkeeping (free spans and segment index) is touched only for
//! short, non-blocking critical sections, so a test-and-test-and-set spin lock
//! is enough. Anything that may block, most notably importing a new segment
//! from the backing store, runs with the lock released.

use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

pub struct SpinLock<T> {
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Spin until acquired, then return a guard.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while !self.try_acquire() {
            // Wait on a plain load so contending CPUs don't bounce the line.
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn guard_drop_unlocks() {
        let l = SpinLock::new(1u8);
        let mut g = l.lock();
        assert!(l.locked.load(Ordering::Relaxed));
        *g += 1;
        drop(g);
        assert!(!l.locked.load(Ordering::Relaxed));
        assert_eq!(l.with_lock(|v| *v), 2);
    }

    #[test]
    fn shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SpinLock<Vec<u8>>>();
    }

    #[test]
    fn get_mut_bypasses_the_lock() {
        let mut l = SpinLock::new(vec![1, 2]);
        l.get_mut().push(3);
        assert!(!l.locked.load(Ordering::Relaxed));
        assert_eq!(l.with_lock(|v| v.clone()), vec![1, 2, 3]);
    }

    #[test]
    fn contended_increments_are_exclusive() {
        let threads = 4;
        let iters = 2_000;

        let lock = Arc::new(SpinLock::new(0usize));
        let in_cs = Arc::new(AtomicUsize::new(0));
        let start = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let in_cs = Arc::clone(&in_cs);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    for _ in 0..iters {
                        lock.with_lock(|v| {
                            let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(prev, 0, "mutual exclusion violated");
                            *v += 1;
                            in_cs.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.with_lock(|v| *v), threads * iters);
    }
}
