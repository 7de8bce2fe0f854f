use super::csr::MHartId;
use super::{boot_fail, INTERRUPT_CONTROLLER};
use crate::config::{CLINT_BASE, TIMER_INTERVAL};
use crate::trap::{handle_external, Clint, TrapCause, TrapError};

/// Called by `trap_vector` in `asm/trap.S` for every trap, returns the address to resume at
#[no_mangle]
extern "C" fn handle_trap(mcause: usize, epc: usize) -> usize {
    let result = match TrapCause::from_mcause(mcause) {
        TrapCause::MachineTimer => {
            let clint = unsafe { Clint::from_base(CLINT_BASE) };
            clint.rearm(MHartId::read(), TIMER_INTERVAL);
            Ok(())
        }
        TrapCause::MachineExternal => match INTERRUPT_CONTROLLER.get() {
            Some(plic) => handle_external(plic).map(|_| ()),
            None => Err(TrapError::NoController),
        },
        TrapCause::Unexpected(cause) => Err(TrapError::UnexpectedTrap(cause)),
    };

    if let Err(e) = result {
        log::error!("{} at {:#x}", e, epc);
        boot_fail(mcause, 1);
    }
    // only interrupts are handled, so the interrupted instruction has not been executed yet
    epc
}
