//! Machine mode trap handling
//!
//! The firmware only expects two kinds of traps, the machine timer interrupt and external interrupts routed through
//! the PLIC. Everything else, exceptions included, is a fatal error.

use crate::config::MAX_EXTERNAL_INTERRUPTS;
use bitflags::bitflags;
use regs::{RO, RW};
use thiserror_no_std::Error;

bitflags! {
    /// Interrupt bits as they appear in the `mie` and `mip` registers
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct InterruptBits: usize {
        /// Machine software interrupt, raised by writing the hart's `msip` word in the CLINT
        const MachineSoftwareInterrupt = 1 << 3;

        /// Machine timer interrupt, pending while `mtime >= mtimecmp` of the hart
        const MachineTimerInterrupt = 1 << 7;

        /// Machine external interrupt, pending while the PLIC has a claimable interrupt for the hart's context
        const MachineExternalInterrupt = 1 << 11;
    }
}

const MCAUSE_INTERRUPT: usize = 1 << (usize::BITS - 1);
const MCAUSE_MACHINE_TIMER: usize = 7;
const MCAUSE_MACHINE_EXTERNAL: usize = 11;

/// What caused a trap, decoded from `mcause`
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapCause {
    MachineTimer,
    MachineExternal,
    /// Any other interrupt or exception, carrying the raw `mcause` value
    Unexpected(usize),
}

impl TrapCause {
    pub fn from_mcause(mcause: usize) -> Self {
        if mcause & MCAUSE_INTERRUPT == 0 {
            return TrapCause::Unexpected(mcause);
        }
        match mcause & !MCAUSE_INTERRUPT {
            MCAUSE_MACHINE_TIMER => TrapCause::MachineTimer,
            MCAUSE_MACHINE_EXTERNAL => TrapCause::MachineExternal,
            _ => TrapCause::Unexpected(mcause),
        }
    }
}

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum TrapError {
    #[error("Unexpected trap with mcause {0:#x}")]
    UnexpectedTrap(usize),
    #[error("External interrupt {0} has no handler")]
    UnexpectedInterrupt(u32),
    #[error("External interrupt without an initialized interrupt controller")]
    NoController,
}

/// The claim/complete protocol of an interrupt controller
pub trait InterruptClaim {
    /// Claim the highest priority pending interrupt, `None` if nothing is pending
    fn claim(&self) -> Option<u32>;

    /// Signal that handling of `id` is finished so that it can be raised again
    fn complete(&self, id: u32);
}

/// Claim, dispatch and complete one external interrupt.
///
/// No device of this firmware raises interrupts, so a claimed id is only logged. Ids outside of the handler table
/// are completed before the error is returned.
pub fn handle_external(controller: &impl InterruptClaim) -> Result<u32, TrapError> {
    let id = match controller.claim() {
        Some(id) => id,
        None => return Err(TrapError::UnexpectedInterrupt(0)),
    };
    if !(1..MAX_EXTERNAL_INTERRUPTS).contains(&id) {
        controller.complete(id);
        return Err(TrapError::UnexpectedInterrupt(id));
    }
    log::debug!("external interrupt {}", id);
    controller.complete(id);
    Ok(id)
}

const CLINT_HARTS: usize = 4095;

/// Memory mapped registers of the core local interruptor
#[repr(C)]
pub struct ClintRegs {
    #[allow(dead_code)]
    msip: [RW<u32>; CLINT_HARTS + 1],
    mtimecmp: [RW<u64>; CLINT_HARTS],
    mtime: RO<u64>,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ClintRegs>(), 0xc000);

pub struct Clint<'a> {
    regs: &'a ClintRegs,
}

impl<'a> Clint<'a> {
    /// # Safety
    /// `base` must be the address of a CLINT register block.
    pub unsafe fn from_base(base: usize) -> Self {
        Self {
            regs: &*(base as *const ClintRegs),
        }
    }

    pub fn from_regs(regs: &'a ClintRegs) -> Self {
        Self { regs }
    }

    pub fn mtime(&self) -> u64 {
        unsafe { self.regs.mtime.read() }
    }

    /// Schedule the next timer interrupt of `hart` to fire `interval` ticks from now
    pub fn rearm(&self, hart: usize, interval: u64) {
        let next = self.mtime().wrapping_add(interval);
        if let Some(mtimecmp) = self.regs.mtimecmp.get(hart) {
            unsafe { mtimecmp.write(next) }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use core::cell::RefCell;
    use core::mem::offset_of;

    #[test]
    fn mcause_is_decoded() {
        assert_eq!(TrapCause::from_mcause(MCAUSE_INTERRUPT | 7), TrapCause::MachineTimer);
        assert_eq!(TrapCause::from_mcause(MCAUSE_INTERRUPT | 11), TrapCause::MachineExternal);
        assert_eq!(
            TrapCause::from_mcause(MCAUSE_INTERRUPT | 3),
            TrapCause::Unexpected(MCAUSE_INTERRUPT | 3)
        );
        // an exception with the same code as the timer interrupt
        assert_eq!(TrapCause::from_mcause(7), TrapCause::Unexpected(7));
    }

    #[test]
    fn interrupt_bits_match_mie_layout() {
        assert_eq!(InterruptBits::MachineTimerInterrupt.bits(), 0x80);
        assert_eq!(InterruptBits::MachineExternalInterrupt.bits(), 0x800);
    }

    struct FakeController {
        pending: Option<u32>,
        completed: RefCell<Vec<u32>>,
    }

    impl InterruptClaim for FakeController {
        fn claim(&self) -> Option<u32> {
            self.pending
        }

        fn complete(&self, id: u32) {
            self.completed.borrow_mut().push(id);
        }
    }

    fn controller(pending: Option<u32>) -> FakeController {
        FakeController {
            pending,
            completed: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn claimed_interrupt_is_completed() {
        let plic = controller(Some(5));
        assert_eq!(handle_external(&plic), Ok(5));
        assert_eq!(*plic.completed.borrow(), vec![5]);
    }

    #[test]
    fn ids_without_handler_are_fatal() {
        for id in [0, 32, 53] {
            let plic = controller(Some(id));
            assert_eq!(handle_external(&plic), Err(TrapError::UnexpectedInterrupt(id)));
        }
        let plic = controller(None);
        assert_eq!(handle_external(&plic), Err(TrapError::UnexpectedInterrupt(0)));
        assert!(plic.completed.borrow().is_empty());
    }

    #[test]
    fn clint_offsets_match_hardware() {
        assert_eq!(offset_of!(ClintRegs, mtimecmp), 0x4000);
        assert_eq!(offset_of!(ClintRegs, mtime), 0xbff8);
    }

    #[test]
    fn rearming_adds_the_interval_to_mtime() {
        let regs: Box<ClintRegs> = unsafe {
            let layout = std::alloc::Layout::new::<ClintRegs>();
            Box::from_raw(std::alloc::alloc_zeroed(layout) as *mut ClintRegs)
        };
        unsafe { *regs.mtime.as_ptr() = 5_000 };
        let clint = Clint::from_regs(&regs);
        clint.rearm(1, 1_000_000);
        unsafe {
            assert_eq!(regs.mtimecmp[1].read(), 1_005_000);
            assert_eq!(regs.mtimecmp[0].read(), 0);
        }
    }
}
