//! Driver for the SiFive UART
//!
//! Only what a polling console needs is implemented: enabling the transmitter and receiver, programming the baud
//! rate divisor and moving single bytes.
#![no_std]

use core::fmt;
use regs::{RO, RW};
use static_assertions::const_assert_eq;

/// Set in `txdata` while the transmit fifo is full, set in `rxdata` while the receive fifo is empty
const FIFO_FLAG: u32 = 1 << 31;
const TX_ENABLE: u32 = 1;
const RX_ENABLE: u32 = 1;

/// Memory mapped registers of a SiFive UART
#[repr(C)]
pub struct SifiveUartRegs {
    txdata: RW<u32>,
    rxdata: RO<u32>,
    txctrl: RW<u32>,
    rxctrl: RW<u32>,
    ie: RW<u32>,
    ip: RO<u32>,
    div: RW<u32>,
}

const_assert_eq!(core::mem::size_of::<SifiveUartRegs>(), 0x1c);

/// Divisor for the slowest clock that still reaches `max_target_hz` from a peripheral clock of `in_freq`.
///
/// The UART runs at `in_freq / (div + 1)`.
pub const fn min_clk_divisor(in_freq: u64, max_target_hz: u64) -> u32 {
    let quotient = (in_freq + max_target_hz - 1) / max_target_hz;
    if quotient == 0 {
        0
    } else {
        (quotient - 1) as u32
    }
}

/// A polling driver for a memory mapped SiFive UART
pub struct SifiveUart<'a> {
    regs: &'a SifiveUartRegs,
}

// the registers are only ever accessed through volatile operations
unsafe impl Send for SifiveUart<'_> {}

impl<'a> SifiveUart<'a> {
    /// Create a driver for the UART whose registers start at `base`.
    ///
    /// # Safety
    /// `base` must be the address of the register block of a SiFive UART and no other driver instance may use it
    /// concurrently.
    pub unsafe fn from_base(base: usize) -> Self {
        Self {
            regs: &*(base as *const SifiveUartRegs),
        }
    }

    /// Create a driver on top of an already mapped register block
    pub fn from_regs(regs: &'a SifiveUartRegs) -> Self {
        Self { regs }
    }

    /// Enable the transmitter and the receiver
    pub fn enable(&mut self) {
        unsafe {
            self.regs.txctrl.write(TX_ENABLE);
            self.regs.rxctrl.write(RX_ENABLE);
        }
    }

    pub fn set_divisor(&mut self, divisor: u32) {
        unsafe { self.regs.div.write(divisor) }
    }

    pub fn divisor(&self) -> u32 {
        unsafe { self.regs.div.read() }
    }

    /// Wait for space in the transmit fifo and queue `byte`
    pub fn write_byte(&mut self, byte: u8) {
        while unsafe { self.regs.txdata.read() } & FIFO_FLAG != 0 {
            core::hint::spin_loop();
        }
        unsafe { self.regs.txdata.write(u32::from(byte)) }
    }

    /// Take the next received byte, if there is one
    pub fn read_byte(&mut self) -> Option<u8> {
        let data = unsafe { self.regs.rxdata.read() };
        if data & FIFO_FLAG != 0 {
            None
        } else {
            Some(data as u8)
        }
    }

    pub fn pending_interrupts(&self) -> u32 {
        unsafe { self.regs.ip.read() }
    }

    pub fn disable_interrupts(&mut self) {
        unsafe { self.regs.ie.write(0) }
    }
}

impl fmt::Write for SifiveUart<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(|byte| self.write_byte(byte));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use core::fmt::Write;
    use core::mem::offset_of;
    use regs::Reg;

    fn idle_regs() -> SifiveUartRegs {
        SifiveUartRegs {
            txdata: Reg::new(0),
            rxdata: Reg::new(FIFO_FLAG),
            txctrl: Reg::new(0),
            rxctrl: Reg::new(0),
            ie: Reg::new(0x3),
            ip: Reg::new(0),
            div: Reg::new(0),
        }
    }

    #[test]
    fn register_offsets_match_hardware() {
        assert_eq!(offset_of!(SifiveUartRegs, rxdata), 0x04);
        assert_eq!(offset_of!(SifiveUartRegs, txctrl), 0x08);
        assert_eq!(offset_of!(SifiveUartRegs, rxctrl), 0x0c);
        assert_eq!(offset_of!(SifiveUartRegs, div), 0x18);
    }

    #[test]
    fn divisor_rounds_towards_slower_baud_rates() {
        assert_eq!(min_clk_divisor(33_330_000, 115_200), 289);
        assert_eq!(min_clk_divisor(115_200, 115_200), 0);
        assert_eq!(min_clk_divisor(0, 115_200), 0);
        assert_eq!(min_clk_divisor(20_000_000, 115_200), 173);
    }

    #[test]
    fn enabling_and_writing_touches_expected_registers() {
        let regs = idle_regs();
        let mut uart = SifiveUart::from_regs(&regs);
        uart.enable();
        uart.set_divisor(289);
        uart.disable_interrupts();
        write!(uart, "ok").unwrap();

        unsafe {
            assert_eq!(regs.txctrl.read(), TX_ENABLE);
            assert_eq!(regs.rxctrl.read(), RX_ENABLE);
            assert_eq!(regs.ie.read(), 0);
            // the fifo register keeps the last byte written
            assert_eq!(regs.txdata.read(), u32::from(b'k'));
        }
        assert_eq!(uart.divisor(), 289);
        assert_eq!(uart.read_byte(), None);
    }
}
