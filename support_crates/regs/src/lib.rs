//! Library for modelling memory mapped registers
//!
//! Peripheral register blocks are described as `#[repr(C)]` structs made of [`Reg`] fields and overlaid on the
//! peripheral's base address. Which accesses a register supports is part of its type, so writing to a read-only
//! status register or reading a write-only trigger does not compile.
#![no_std]

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{BitAnd, BitOr, Not};
use core::ptr;

/// Access permissions of a register
pub mod access {
    /// Implemented by access markers that allow reading
    pub trait Readable {}

    /// Implemented by access markers that allow writing
    pub trait Writable {}

    /// The register can be read and written
    pub struct ReadWrite;

    /// The register can only be read, writes are ignored by the hardware
    pub struct ReadOnly;

    /// The register can only be written, reads return garbage or trigger side effects
    pub struct WriteOnly;

    impl Readable for ReadWrite {}
    impl Writable for ReadWrite {}
    impl Readable for ReadOnly {}
    impl Writable for WriteOnly {}
}

use access::{ReadOnly, ReadWrite, Readable, Writable, WriteOnly};

/// A memory mapped register holding a `T` with the access permissions `A`.
///
/// All accesses are volatile so that the compiler neither elides nor reorders them.
#[repr(transparent)]
pub struct Reg<T: Copy, A> {
    value: UnsafeCell<T>,
    access: PhantomData<A>,
}

/// A Register that allows **read and write** interactions
pub type RW<T> = Reg<T, ReadWrite>;

/// A Register that allows **only read** interactions
pub type RO<T> = Reg<T, ReadOnly>;

/// A Register that allows **only write** interactions
pub type WO<T> = Reg<T, WriteOnly>;

impl<T: Copy, A> Reg<T, A> {
    /// Create a register backed by ordinary memory holding `value`.
    ///
    /// This is only useful for tests. Real registers are obtained by casting a peripheral base address.
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            access: PhantomData,
        }
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut T {
        self.value.get()
    }
}

impl<T: Copy, A: Readable> Reg<T, A> {
    /// Read the current value of the register.
    ///
    /// # Safety
    /// Reading a memory mapped register may have side effects on the peripheral (e.g. popping a fifo).
    #[inline(always)]
    pub unsafe fn read(&self) -> T {
        ptr::read_volatile(self.as_ptr())
    }
}

impl<T: Copy, A: Writable> Reg<T, A> {
    /// Write a value to the register.
    ///
    /// # Safety
    /// Writing a memory mapped register may have side effects on the peripheral.
    #[inline(always)]
    pub unsafe fn write(&self, value: T) {
        ptr::write_volatile(self.as_ptr(), value)
    }
}

impl<T: Copy, A: Readable + Writable> Reg<T, A> {
    /// Read the register, map its value through `f` and write the result back.
    ///
    /// # Safety
    /// See [`Reg::read`] and [`Reg::write`]. The read-modify-write sequence is not atomic.
    #[inline(always)]
    pub unsafe fn modify<F>(&self, f: F)
    where
        F: FnOnce(T) -> T,
    {
        self.write(f(self.read()));
    }
}

impl<T, A> Reg<T, A>
where
    T: Copy + BitOr<Output = T> + BitAnd<Output = T> + Not<Output = T>,
    A: Readable + Writable,
{
    /// Set all bits of `mask` while leaving the others untouched.
    ///
    /// # Safety
    /// See [`Reg::modify`].
    #[inline(always)]
    pub unsafe fn set_bits(&self, mask: T) {
        self.modify(|v| v | mask)
    }

    /// Clear all bits of `mask` while leaving the others untouched.
    ///
    /// # Safety
    /// See [`Reg::modify`].
    #[inline(always)]
    pub unsafe fn clear_bits(&self, mask: T) {
        self.modify(|v| v & !mask)
    }
}

unsafe impl<T: Copy + Send, A> Sync for Reg<T, A> {}
