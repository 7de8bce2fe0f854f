//! A [`log`] backend for firmware that only learns where its console is after it has started running.
//!
//! The logger is installed as early as possible and records are dropped until a console sink is attached through
//! [`KernelLogger::attach_console`].
#![no_std]

#[cfg(test)]
extern crate std;

mod kernel_logger;

pub use kernel_logger::KernelLogger;
