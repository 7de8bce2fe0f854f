//! Driver for the SiFive GPIO controller
#![no_std]

use regs::{RO, RW};
use static_assertions::const_assert_eq;

/// Memory mapped registers of a SiFive GPIO controller, one bit per pin
#[repr(C)]
pub struct SifiveGpioRegs {
    input_val: RO<u32>,
    input_en: RW<u32>,
    output_en: RW<u32>,
    output_val: RW<u32>,
    pue: RW<u32>,
    ds: RW<u32>,
    rise_ie: RW<u32>,
    rise_ip: RW<u32>,
    fall_ie: RW<u32>,
    fall_ip: RW<u32>,
    high_ie: RW<u32>,
    high_ip: RW<u32>,
    low_ie: RW<u32>,
    low_ip: RW<u32>,
    iof_en: RW<u32>,
    iof_sel: RW<u32>,
    out_xor: RW<u32>,
}

const_assert_eq!(core::mem::size_of::<SifiveGpioRegs>(), 0x44);

pub struct SifiveGpio<'a> {
    regs: &'a SifiveGpioRegs,
}

impl<'a> SifiveGpio<'a> {
    /// Create a driver for the GPIO controller whose registers start at `base`.
    ///
    /// # Safety
    /// `base` must be the address of the register block of a SiFive GPIO controller that nothing else drives.
    pub unsafe fn from_base(base: usize) -> Self {
        Self {
            regs: &*(base as *const SifiveGpioRegs),
        }
    }

    pub fn from_regs(regs: &'a SifiveGpioRegs) -> Self {
        Self { regs }
    }

    /// Configure the pins in `outputs` as outputs and the pins in `inputs` as inputs.
    ///
    /// Pins are taken away from hardware functions so that software controls all of them.
    pub fn configure(&mut self, outputs: u32, inputs: u32) {
        unsafe {
            self.regs.iof_en.clear_bits(outputs | inputs);
            self.regs.out_xor.clear_bits(outputs);
            self.regs.output_en.write(outputs);
            self.regs.input_en.write(inputs);
        }
    }

    pub fn inputs(&self) -> u32 {
        unsafe { self.regs.input_val.read() }
    }

    pub fn set_outputs(&mut self, value: u32) {
        unsafe { self.regs.output_val.write(value) }
    }

    /// Drive the outputs with the current inputs shifted down by `shift` bits
    pub fn mirror_inputs(&mut self, shift: u32) {
        let value = self.inputs() >> shift;
        self.set_outputs(value);
    }
}
