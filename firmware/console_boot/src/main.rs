#![cfg_attr(target_arch = "riscv64", no_std, no_main)]

#[cfg(target_arch = "riscv64")]
mod firmware {
    use console_boot::arch::{boot_fail, halt, Hardware};
    use console_boot::boot;
    use console_boot::config::{BuildInfo, GPIO_ECHO_SHIFT, GPIO_INPUT_PINS, GPIO_OUTPUT_PINS};
    use console_boot::LOGGER;
    use core::panic::PanicInfo;
    use device_tree::fdt::FlattenedDeviceTree;
    use sifive_gpio::SifiveGpio;

    #[panic_handler]
    fn panic_handler(info: &PanicInfo) -> ! {
        log::error!("!!! Firmware Panic !!!\n  {}", info);
        halt()
    }

    /// Echo input pins 4..7 onto output pins 0..3 forever
    fn echo_gpio(base: u64) -> ! {
        let mut gpio = unsafe { SifiveGpio::from_base(base as usize) };
        gpio.configure(GPIO_OUTPUT_PINS, GPIO_INPUT_PINS);
        log::info!("echoing gpio inputs");
        loop {
            gpio.mirror_inputs(GPIO_ECHO_SHIFT);
        }
    }

    #[no_mangle]
    fn firmware_main(_hartid: usize, dtb: *const u8) -> ! {
        if LOGGER.install().is_err() {
            halt()
        }

        let source = match unsafe { FlattenedDeviceTree::from_ptr(dtb) } {
            Ok(source) => source,
            // nothing can be reported before the console is known
            Err(_) => halt(),
        };

        let mut hardware = unsafe { Hardware::new() };
        match boot::run(&mut hardware, &source, &BuildInfo::current()) {
            Ok(outcome) => echo_gpio(outcome.peripherals.gpio),
            Err(failure) => {
                log::error!("{}", failure);
                boot_fail(failure.stage.code(), 0)
            }
        }
    }
}

#[cfg(not(target_arch = "riscv64"))]
fn main() {
    println!("console_boot only runs on the riscv64 console, use `cargo test` to exercise it on the host");
}
