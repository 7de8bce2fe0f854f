//! Boot firmware for the RISC-V development console
//!
//! The firmware discovers the hardware from the device tree handed over by the loader, brings up the console and
//! the interrupt controller, prepares a relocated device tree for the next boot stage and runs known-answer tests
//! on the cryptographic accelerators. Everything that touches real hardware sits behind the [`boot::Platform`]
//! trait so that the boot sequence itself runs in host tests.
#![cfg_attr(not(test), no_std)]

#[cfg(target_arch = "riscv64")]
#[path = "arch/riscv64imac/mod.rs"]
pub mod arch;
pub mod boot;
pub mod config;
pub mod devtree;
pub mod error;
pub mod selftest;
pub mod trap;

use klog::KernelLogger;
use log::Level;
use sifive_uart::SifiveUart;

/// The logger of the firmware, its console is attached once the UART has been discovered
pub static LOGGER: KernelLogger<SifiveUart<'static>> = KernelLogger::new(Level::Info);
