use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Mutual exclusion by busy-waiting on a flag.
///
/// Trap handlers must stick to [`SpinLock::try_lock`], the code they interrupted may be holding the lock.
#[derive(Debug)]
pub struct SpinLock<T> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

/// Access to the locked value, the lock is released when this is dropped
pub struct Guard<'a, T> {
    lock: &'a SpinLock<T>,
}

unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    fn acquire(&self) -> bool {
        self.held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn try_lock(&self) -> Option<Guard<'_, T>> {
        // a weak exchange may fail spuriously, only give up once the flag is observed set
        while !self.acquire() {
            if self.is_locked() {
                return None;
            }
        }
        Some(Guard { lock: self })
    }

    pub fn lock(&self) -> Guard<'_, T> {
        while !self.acquire() {
            while self.is_locked() {
                spin_loop();
            }
        }
        Guard { lock: self }
    }

    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

impl<T> Deref for Guard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: holding the guard means holding the lock
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for Guard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the guard means holding the lock
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for Guard<'_, T> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn second_lock_attempt_fails_until_release() {
        let counter = SpinLock::new(3u32);
        {
            let mut first = counter.lock();
            *first += 1;
            assert!(counter.is_locked());
            assert!(counter.try_lock().is_none());
        }
        assert!(!counter.is_locked());
        assert_eq!(*counter.try_lock().unwrap(), 4);
    }
}
