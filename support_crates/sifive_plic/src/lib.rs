//! Driver for the RISC-V platform level interrupt controller as implemented by SiFive
//!
//! Interrupt sources are numbered from 1, source 0 means "no interrupt". Every hart mode that can take
//! external interrupts has its own *context* with an enable bitmap, a priority threshold and a claim/complete
//! register.
#![no_std]

use regs::RW;
use static_assertions::const_assert_eq;

/// Maximum number of interrupt sources a PLIC can have
pub const MAX_SOURCES: usize = 1024;
/// Maximum number of contexts a PLIC can have
pub const MAX_CONTEXTS: usize = 15872;

#[repr(C)]
struct ContextEnable {
    enable_bits: [RW<u32>; 32],
}

#[repr(C)]
struct Context {
    priority_threshold: RW<u32>,
    claim_complete: RW<u32>,
    _reserved: [u32; 0x3fe],
}

/// Memory mapped registers of a PLIC
#[repr(C)]
pub struct PlicRegs {
    priorities: [RW<u32>; MAX_SOURCES],
    pending: [RW<u32>; 32],
    _reserved0: [u32; 992],
    enable: [ContextEnable; MAX_CONTEXTS],
    _reserved1: [u32; 0x3800],
    context: [Context; MAX_CONTEXTS],
}

const_assert_eq!(core::mem::size_of::<ContextEnable>(), 0x80);
const_assert_eq!(core::mem::size_of::<Context>(), 0x1000);
const_assert_eq!(core::mem::size_of::<PlicRegs>(), 0x400_0000);

/// Context of the machine mode of `hart` on SiFive cores without supervisor mode, e.g. the E51 monitor core
pub const fn machine_context(hart: usize) -> usize {
    hart
}

pub struct Plic<'a> {
    regs: &'a PlicRegs,
    max_priority: u32,
}

impl<'a> Plic<'a> {
    /// Create a driver for the PLIC whose registers start at `base`.
    ///
    /// # Safety
    /// `base` must be the address of the register block of a PLIC and no other driver instance may use it
    /// concurrently.
    pub unsafe fn from_base(base: usize, max_priority: u32) -> Self {
        Self {
            regs: &*(base as *const PlicRegs),
            max_priority,
        }
    }

    /// Bring `context` into a quiet state.
    ///
    /// All `ndev` sources are disabled for the context and have their priority set to 0 which means "never
    /// interrupt". The threshold of the context is lowered to 0 so that sources become deliverable as soon as
    /// they are enabled with a priority.
    pub fn init(&mut self, ndev: u32, context: usize) {
        log::debug!("initializing plic context {} for {} sources", context, ndev);
        // ndev + 1 bits are needed because source 0 does not exist but still occupies bit 0
        let enable_words = (ndev as usize + 1).div_ceil(32).min(32);
        for reg in &self.regs.enable[context].enable_bits[..enable_words] {
            unsafe { reg.write(0) }
        }
        for id in 0..=ndev.min(MAX_SOURCES as u32 - 1) {
            self.set_priority(id, 0);
        }
        self.set_threshold(0, context);
    }

    pub fn enable_interrupt(&mut self, id: u32, context: usize) {
        let reg = &self.regs.enable[context].enable_bits[(id / 32) as usize];
        unsafe { reg.set_bits(1 << (id % 32)) }
    }

    pub fn disable_interrupt(&mut self, id: u32, context: usize) {
        let reg = &self.regs.enable[context].enable_bits[(id / 32) as usize];
        unsafe { reg.clear_bits(1 << (id % 32)) }
    }

    /// Set the priority of source `id`, clamped to the controller's maximum priority
    pub fn set_priority(&mut self, id: u32, prio: u32) {
        unsafe { self.regs.priorities[id as usize].write(prio.min(self.max_priority)) }
    }

    pub fn priority(&self, id: u32) -> u32 {
        unsafe { self.regs.priorities[id as usize].read() }
    }

    pub fn set_threshold(&mut self, threshold: u32, context: usize) {
        unsafe {
            self.regs.context[context]
                .priority_threshold
                .write(threshold.min(self.max_priority))
        }
    }

    pub fn is_pending(&self, id: u32) -> bool {
        let bits = unsafe { self.regs.pending[(id / 32) as usize].read() };
        bits & (1 << (id % 32)) != 0
    }

    /// Claim the highest priority pending source of `context`
    pub fn claim_next(&self, context: usize) -> Option<u32> {
        let claim = unsafe { self.regs.context[context].claim_complete.read() };
        if claim == 0 {
            None
        } else {
            Some(claim)
        }
    }

    /// Signal that the handler of the previously claimed source `id` has finished
    pub fn complete(&self, context: usize, id: u32) {
        unsafe { self.regs.context[context].claim_complete.write(id) }
    }
}
