//! Synchronisation primitives for firmware code that shares state with trap handlers
#![no_std]

#[cfg(test)]
extern crate std;

mod once;
mod spin_lock;

pub use once::WriteOnce;
pub use spin_lock::{Guard, SpinLock};
