//! Access to the machine mode control and status registers

use crate::trap::InterruptBits;
use bitflags::bitflags;
use core::arch::asm;

macro_rules! read_csr {
    ($csr:literal) => {{
        let res: usize;
        asm!(concat!("csrr {}, ", $csr), out(reg) res);
        res
    }};
}

macro_rules! write_csr {
    ($csr:literal, $value:expr) => {
        asm!(concat!("csrw ", $csr, ", {}"), in(reg) $value)
    };
}

/// Set specific register bits but leave others untouched
macro_rules! set_csr {
    ($csr:literal, $value:expr) => {
        asm!(concat!("csrs ", $csr, ", {}"), in(reg) $value)
    };
}

/// Clear specific register bits but leave others untouched
macro_rules! clear_csr {
    ($csr:literal, $value:expr) => {
        asm!(concat!("csrc ", $csr, ", {}"), in(reg) $value)
    };
}

bitflags! {
    #[derive(Debug, Copy, Clone)]
    pub struct MStatusFlags: usize {
        /// Global interrupt enable of machine mode
        const MIE = 1 << 3;
        /// Value of `MIE` before the current trap was taken, restored by `mret`
        const MPIE = 1 << 7;
    }
}

/// Machine status register
pub struct MStatus;

impl MStatus {
    pub fn read() -> MStatusFlags {
        MStatusFlags::from_bits_retain(unsafe { read_csr!("mstatus") })
    }

    /// # Safety
    /// Setting `MIE` lets pending interrupts preempt the caller immediately.
    pub unsafe fn set(flags: MStatusFlags) {
        set_csr!("mstatus", flags.bits())
    }

    pub fn clear(flags: MStatusFlags) {
        unsafe { clear_csr!("mstatus", flags.bits()) }
    }
}

/// Machine interrupt enable register
pub struct Mie;

impl Mie {
    pub fn read() -> InterruptBits {
        InterruptBits::from_bits_retain(unsafe { read_csr!("mie") })
    }

    /// # Safety
    /// Enabled interrupts are taken as soon as they are pending and `mstatus.MIE` is set.
    pub unsafe fn write(bits: InterruptBits) {
        write_csr!("mie", bits.bits())
    }
}

pub struct MHartId;

impl MHartId {
    pub fn read() -> usize {
        unsafe { read_csr!("mhartid") }
    }
}
