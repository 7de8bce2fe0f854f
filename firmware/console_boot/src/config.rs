//! Fixed configuration of the firmware and the configuration discovered at boot

use core::fmt::{Display, Formatter};
use sifive_uart::min_clk_divisor;

/// Baud rate of the console
pub const UART_BAUD_RATE: u64 = 115_200;

/// The relocated device tree is placed this many bytes below the end of memory
pub const DTB_TARGET_OFFSET: u64 = 0x20_0000;

/// Bytes reserved for the relocated device tree including the free space needed for edits
pub const DTB_CAPACITY: usize = 0x10_0000;

/// Kernel command line written to `/chosen/bootargs`
pub const KERNEL_BOOTARGS: &str = "console=hvc0 earlycon=sbi";

/// Timebase written to `/cpus/timebase-frequency` for the next boot stage
pub const TIMEBASE_FREQUENCY: u32 = 1_000_000;

pub const CLINT_BASE: usize = 0x0200_0000;

/// Machine timer ticks between two timer interrupts
pub const TIMER_INTERVAL: u64 = 1_000_000;

/// Pins driven by the GPIO echo loop
pub const GPIO_OUTPUT_PINS: u32 = 0x0f;
/// Pins sampled by the GPIO echo loop
pub const GPIO_INPUT_PINS: u32 = 0xf0;
/// Distance between an input pin and the output pin it is echoed to
pub const GPIO_ECHO_SHIFT: u32 = 4;

/// External interrupt sources that may have a handler, higher ids are treated as a hardware fault
pub const MAX_EXTERNAL_INTERRUPTS: u32 = 32;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
}

impl MemoryRegion {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

/// Parameters of the platform level interrupt controller
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct PlicConfig {
    /// Base address of the register block, 0 if the platform has no usable controller
    pub base: u64,
    pub ndev: u32,
    pub max_priority: u32,
}

/// Everything that is discovered about the platform before the device tree is relocated.
///
/// This is built exactly once during boot and only passed around by reference afterwards.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct BootConfig {
    pub console_base: u64,
    /// Frequency of the peripheral bus clock that drives the UART
    pub peripheral_clock: u32,
    pub memory: MemoryRegion,
    pub hart_count: u32,
    pub plic: PlicConfig,
}

impl BootConfig {
    /// Address at which the relocated device tree is placed, `None` if memory is too small to hold it
    pub fn dtb_target(&self) -> Option<u64> {
        if self.memory.size < DTB_TARGET_OFFSET {
            return None;
        }
        Some(self.memory.end() - DTB_TARGET_OFFSET)
    }
}

/// Divisor that runs the console at [`UART_BAUD_RATE`] from a peripheral clock of `peripheral_clock` Hz
pub const fn console_divisor(peripheral_clock: u32) -> u32 {
    min_clk_divisor(peripheral_clock as u64, UART_BAUD_RATE)
}

/// Register bases of the peripherals that are discovered from the relocated device tree
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct PeripheralMap {
    pub klein: u64,
    pub blake2s: u64,
    pub chacha: u64,
    pub gpio: u64,
}

/// Identification of the running firmware image
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct BuildInfo {
    pub date: &'static str,
    pub time: &'static str,
    pub git_id: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            date: env!("CONSOLE_BOOT_BUILD_DATE"),
            time: env!("CONSOLE_BOOT_BUILD_TIME"),
            git_id: env!("CONSOLE_BOOT_GIT_ID"),
        }
    }
}

impl Display for BuildInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}-{}", self.date, self.time, self.git_id)
    }
}
