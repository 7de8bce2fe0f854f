//! Known-answer tests of the cryptographic accelerators
//!
//! All accelerators share the same bus interface. A register inside the accelerator is selected by writing its
//! address into `data_a`, values go through `data_b` (towards the accelerator) and `data_c` (back from it), and a
//! pulse on `trigger` executes the access. The accelerator register maps differ and are described in the
//! per-accelerator modules.
//!
//! Test results are only reported. A failing test never stops the boot.

use core::fmt::{Display, Formatter};
use regs::{RO, RW};
use static_assertions::const_assert_eq;

mod blake2s;
mod chacha;
mod klein;

#[cfg(test)]
pub(crate) mod fake;

/// Trigger bits that execute a write access
const TRIGGER_WRITE: u32 = 0x101;
/// Trigger bits that execute a read access
const TRIGGER_READ: u32 = 0x1;
/// Trigger bit that holds the accelerator in reset while set
const TRIGGER_RESET: u32 = 0x1_0000;

/// Word access to the internal registers of an accelerator
pub trait AcceleratorPort {
    fn write_word(&mut self, address: u32, data: u32);

    fn read_word(&mut self, address: u32) -> u32;

    /// Pulse the reset line of the accelerator
    fn reset(&mut self);
}

/// Memory mapped bus interface shared by all accelerators
#[repr(C)]
pub struct AcceleratorRegs {
    trigger: RW<u32>,
    data_a: RW<u32>,
    data_b: RW<u32>,
    data_c: RO<u32>,
}

const_assert_eq!(core::mem::size_of::<AcceleratorRegs>(), 0x10);

/// [`AcceleratorPort`] for an accelerator mapped into the physical address space
pub struct MmioPort<'a> {
    regs: &'a AcceleratorRegs,
    /// Trigger bits that stay set between accesses
    hold: u32,
}

impl<'a> MmioPort<'a> {
    /// # Safety
    /// `base` must be the address of the bus interface of an accelerator that nothing else accesses.
    pub unsafe fn from_base(base: usize, hold: u32) -> Self {
        Self {
            regs: &*(base as *const AcceleratorRegs),
            hold,
        }
    }

    pub fn from_regs(regs: &'a AcceleratorRegs, hold: u32) -> Self {
        Self { regs, hold }
    }

    fn pulse(&mut self, bits: u32) {
        unsafe {
            self.regs.trigger.write(bits | self.hold);
        }
    }
}

impl AcceleratorPort for MmioPort<'_> {
    fn write_word(&mut self, address: u32, data: u32) {
        unsafe {
            self.regs.data_a.write(address);
            self.regs.data_b.write(data);
        }
        self.pulse(TRIGGER_WRITE);
        self.pulse(0);
    }

    fn read_word(&mut self, address: u32) -> u32 {
        unsafe {
            self.regs.data_a.write(address);
            self.regs.data_b.write(0);
        }
        self.pulse(TRIGGER_READ);
        let value = unsafe { self.regs.data_c.read() };
        self.pulse(0);
        value
    }

    fn reset(&mut self) {
        unsafe {
            self.regs.trigger.write(TRIGGER_RESET);
            self.regs.trigger.write(0);
        }
    }
}

/// Spin until the register at `address` holds a value accepted by `done` and return that value
fn wait_for(port: &mut impl AcceleratorPort, address: u32, done: impl Fn(u32) -> bool) -> u32 {
    loop {
        let value = port.read_word(address);
        if done(value) {
            return value;
        }
        core::hint::spin_loop();
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Accelerator {
    Klein,
    Blake2s,
    Chacha,
}

impl Accelerator {
    /// Every accelerator in the order in which they are tested
    pub const ALL: [Accelerator; 3] = [Accelerator::Klein, Accelerator::Blake2s, Accelerator::Chacha];

    /// The compatible string that identifies the accelerator in the device tree
    pub fn compatible(&self) -> &'static str {
        match self {
            Accelerator::Klein => "console,klein0",
            Accelerator::Blake2s => "console,blake2s0",
            Accelerator::Chacha => "console,chacha0",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Accelerator::Klein => "klein",
            Accelerator::Blake2s => "blake2s",
            Accelerator::Chacha => "chacha",
        }
    }

    /// Trigger bits the accelerator expects to stay set between accesses
    pub fn trigger_hold(&self) -> u32 {
        match self {
            Accelerator::Chacha => TRIGGER_RESET,
            Accelerator::Klein | Accelerator::Blake2s => 0,
        }
    }

    /// Run every known-answer test of this accelerator and record the outcomes in `report`
    pub fn run_selftests(&self, port: &mut impl AcceleratorPort, report: &mut SelfTestReport) {
        match self {
            Accelerator::Klein => klein::run(port, report),
            Accelerator::Blake2s => blake2s::run(port, report),
            Accelerator::Chacha => chacha::run(port, report),
        }
    }
}

/// Formats words as one contiguous hex string
pub struct HexWords<'a>(pub &'a [u32]);

impl Display for HexWords<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        for word in self.0 {
            write!(f, "{:08x}", word)?;
        }
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct SelfTestOutcome {
    pub name: &'static str,
    pub passed: bool,
}

impl SelfTestOutcome {
    /// Compare `obtained` against `expected`, log both and the verdict
    fn check(name: &'static str, expected: &[u32], obtained: &[u32]) -> Self {
        let passed = expected == obtained;
        log::info!("Expected: {}", HexWords(expected));
        log::info!("Obtained: {}", HexWords(obtained));
        log::info!("{}: {}", name, if passed { "passed" } else { "FAILED" });
        Self { name, passed }
    }
}

const MAX_OUTCOMES: usize = 6;

/// Outcomes of all self-tests that were run
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct SelfTestReport {
    outcomes: [SelfTestOutcome; MAX_OUTCOMES],
    len: usize,
}

impl Default for SelfTestReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SelfTestReport {
    pub const fn new() -> Self {
        Self {
            outcomes: [SelfTestOutcome {
                name: "",
                passed: false,
            }; MAX_OUTCOMES],
            len: 0,
        }
    }

    pub fn push(&mut self, outcome: SelfTestOutcome) {
        match self.outcomes.get_mut(self.len) {
            Some(slot) => {
                *slot = outcome;
                self.len += 1;
            }
            None => log::warn!("dropping outcome of {}, the report is full", outcome.name),
        }
    }

    pub fn outcomes(&self) -> &[SelfTestOutcome] {
        &self.outcomes[..self.len]
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes().iter().all(|outcome| outcome.passed)
    }
}
