use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// A cell that is written once during boot and only read afterwards.
///
/// Readers never block. Until the value has been published they simply observe `None`, which is what a trap
/// handler firing early during boot needs.
pub struct WriteOnce<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> WriteOnce<T> {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Publish `value`, handing it back if the cell was already written.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(value);
        }

        // Safety: the WRITING state grants exclusive access until READY is stored
        let stored = unsafe { (*self.value.get()).write(value) as &T };
        self.state.store(READY, Ordering::Release);
        Ok(stored)
    }

    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // Safety: READY is only stored after the value has been initialized and it is never written again
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

impl<T> Default for WriteOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for WriteOnce<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // Safety: the value was initialized and nobody can observe it anymore
            unsafe { self.value.get_mut().assume_init_drop() }
        }
    }
}

unsafe impl<T: Send + Sync> Sync for WriteOnce<T> {}
unsafe impl<T: Send> Send for WriteOnce<T> {}
