//! Machine mode support for the RISC-V cores of the console

pub mod csr;
pub mod trap;

extern crate r0;

use crate::boot::Platform;
use crate::config::{PlicConfig, CLINT_BASE, TIMER_INTERVAL};
use crate::selftest::{Accelerator, MmioPort};
use crate::trap::{Clint, InterruptBits, InterruptClaim};
use crate::LOGGER;
use core::ptr::addr_of_mut;
use csr::{MHartId, MStatus, MStatusFlags, Mie};
use ksync::WriteOnce;
use sifive_plic::{machine_context, Plic};
use sifive_uart::SifiveUart;

extern "C" {
    static mut _sbss: u64;
    static mut _ebss: u64;

    fn wfi_spin() -> !;
}

/// The PLIC context that delivers external interrupts to the boot hart
pub struct MachinePlic {
    plic: Plic<'static>,
    context: usize,
}

impl InterruptClaim for MachinePlic {
    fn claim(&self) -> Option<u32> {
        self.plic.claim_next(self.context)
    }

    fn complete(&self, id: u32) {
        self.plic.complete(self.context, id)
    }
}

/// Set once the interrupt controller has been discovered, read by the external interrupt handler
pub(crate) static INTERRUPT_CONTROLLER: WriteOnce<MachinePlic> = WriteOnce::new();

/// The devices of the console as seen from machine mode on the boot hart
pub struct Hardware {
    hart: usize,
}

impl Hardware {
    /// # Safety
    /// Only one instance may exist. It assumes exclusive ownership of every device the firmware drives.
    pub unsafe fn new() -> Self {
        Self {
            hart: MHartId::read(),
        }
    }
}

impl Platform for Hardware {
    type Port = MmioPort<'static>;

    fn disable_interrupts(&mut self) {
        MStatus::clear(MStatusFlags::MIE);
    }

    fn enable_interrupts(&mut self) {
        let clint = unsafe { Clint::from_base(CLINT_BASE) };
        clint.rearm(self.hart, TIMER_INTERVAL);

        let mut enabled = InterruptBits::MachineTimerInterrupt;
        if INTERRUPT_CONTROLLER.get().is_some() {
            enabled |= InterruptBits::MachineExternalInterrupt;
        }
        unsafe {
            Mie::write(enabled);
            MStatus::set(MStatusFlags::MIE);
        }
        log::debug!("enabled interrupts {:?}", Mie::read());
    }

    fn init_console(&mut self, base: u64) {
        let mut uart = unsafe { SifiveUart::from_base(base as usize) };
        uart.enable();
        LOGGER.attach_console(uart);
    }

    fn set_console_divisor(&mut self, divisor: u32) {
        LOGGER.with_console(|uart| uart.set_divisor(divisor));
    }

    fn init_interrupt_controller(&mut self, config: &PlicConfig) {
        let context = machine_context(self.hart);
        let mut plic = unsafe { Plic::from_base(config.base as usize, config.max_priority) };
        plic.init(config.ndev, context);
        if INTERRUPT_CONTROLLER.set(MachinePlic { plic, context }).is_err() {
            log::warn!("interrupt controller is already initialized");
        }
    }

    unsafe fn dtb_workspace(&mut self, target: u64, capacity: usize) -> &'static mut [u8] {
        core::slice::from_raw_parts_mut(target as *mut u8, capacity)
    }

    fn accelerator_port(&mut self, accelerator: Accelerator, base: u64) -> Self::Port {
        unsafe { MmioPort::from_base(base as usize, accelerator.trigger_hold()) }
    }
}

/// # Safety
/// Must only be called once by the entry code, with a stack set up and `a1` still holding the device tree address
/// passed by the loader.
#[no_mangle]
pub unsafe extern "C" fn _start_rust(hartid: usize, dtb: *const u8) -> ! {
    extern "Rust" {
        fn firmware_main(hartid: usize, dtb: *const u8) -> !;
    }

    r0::zero_bss(addr_of_mut!(_sbss), addr_of_mut!(_ebss));
    firmware_main(hartid, dtb)
}

/// Stop the hart forever
pub fn halt() -> ! {
    unsafe { wfi_spin() }
}

/// Report an unrecoverable error over the console and halt.
///
/// `trap` is 1 for errors raised by the trap handler and 0 for errors of the boot sequence.
pub fn boot_fail(code: usize, trap: usize) -> ! {
    MStatus::clear(MStatusFlags::MIE);
    log::error!("BOOT FAILED");
    log::error!("CODE: {:#x}", code);
    log::error!("TRAP: {:#x}", trap);
    halt()
}
