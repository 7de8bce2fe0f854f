//! The boot sequence
//!
//! [`run`] performs every step from the first register access to the point where the firmware settles into its
//! idle loop. It only touches hardware through [`Platform`], so the whole sequence also runs against fakes.

use crate::config::{console_divisor, BootConfig, BuildInfo, PeripheralMap, PlicConfig, DTB_CAPACITY};
use crate::devtree::discover;
use crate::devtree::relocate::{check_placement, prepare_for_handoff, relocate};
use crate::error::{AtStage, BootFailure, BootStage, RelocationError};
use crate::selftest::{Accelerator, AcceleratorPort, SelfTestReport};
use device_tree::fdt::FlattenedDeviceTree;

/// Hardware access needed by the boot sequence
pub trait Platform {
    type Port: AcceleratorPort;

    fn disable_interrupts(&mut self);

    /// Unmask the interrupts the firmware handles, called as the last step of a successful boot
    fn enable_interrupts(&mut self);

    /// Enable the UART at `base` and attach it to the logger
    fn init_console(&mut self, base: u64);

    fn set_console_divisor(&mut self, divisor: u32);

    /// Quiesce the interrupt controller and keep it for the external interrupt handler
    fn init_interrupt_controller(&mut self, plic: &PlicConfig);

    /// The memory at `target` that receives the relocated device tree.
    ///
    /// # Safety
    /// `target` must be the start of `capacity` bytes of RAM that nothing else uses for the rest of the boot.
    unsafe fn dtb_workspace(&mut self, target: u64, capacity: usize) -> &'static mut [u8];

    fn accelerator_port(&mut self, accelerator: Accelerator, base: u64) -> Self::Port;
}

/// Everything a successful boot has produced
#[derive(Debug)]
pub struct BootOutcome {
    pub config: BootConfig,
    pub peripherals: PeripheralMap,
    /// The relocated and packed tree for the next boot stage
    pub dtb: FlattenedDeviceTree<'static>,
    /// Timebase frequency the loader reported for the boot hart
    pub cpu0_timebase: u32,
    pub selftests: SelfTestReport,
}

fn discover_platform<P: Platform>(
    platform: &mut P,
    source: &FlattenedDeviceTree<'_>,
) -> Result<BootConfig, BootFailure> {
    let console_base = discover::uart_base(source).at(BootStage::Console)?;
    platform.init_console(console_base);

    let peripheral_clock = discover::peripheral_clock(source).at(BootStage::PeripheralClock)?;
    platform.set_console_divisor(console_divisor(peripheral_clock));

    let memory = discover::memory_region(source).at(BootStage::Memory)?;
    let hart_count = discover::hart_count(source).at(BootStage::HartCount)?;

    let plic = discover::interrupt_controller(source).at(BootStage::InterruptController)?;
    if plic.base != 0 {
        platform.init_interrupt_controller(&plic);
    } else {
        log::warn!("no usable interrupt controller, external interrupts stay unhandled");
    }

    Ok(BootConfig {
        console_base,
        peripheral_clock,
        memory,
        hart_count,
        plic,
    })
}

/// Run the boot sequence on the device tree `source` that was handed over by the loader.
///
/// Interrupts are disabled for the whole sequence and only enabled once it has succeeded. The first failing step
/// ends the boot, the caller is expected to report the returned [`BootFailure`] and halt.
pub fn run<P: Platform>(
    platform: &mut P,
    source: &FlattenedDeviceTree<'_>,
    build: &BuildInfo,
) -> Result<BootOutcome, BootFailure> {
    platform.disable_interrupts();

    let config = discover_platform(platform, source)?;
    log::info!("Console Demo: {}", build);
    log::info!("Got TL_CLK: {}", config.peripheral_clock);
    log::info!("Got NUM_CORES: {}", config.hart_count);

    let target = config
        .dtb_target()
        .ok_or(RelocationError::MemoryTooSmall(config.memory.size))
        .at(BootStage::Relocation)?;
    check_placement(source.buf, target, DTB_CAPACITY).at(BootStage::Relocation)?;
    log::debug!("relocating device tree to {:#x}", target);
    let workspace = unsafe { platform.dtb_workspace(target, DTB_CAPACITY) };
    let editor = relocate(source, workspace).at(BootStage::Relocation)?;
    let relocated = prepare_for_handoff(editor).at(BootStage::Handoff)?;
    log::info!("Got TIMEBASE: {}", relocated.cpu0_timebase);
    log::info!("Welcome! Hello world!");

    let mut peripherals = PeripheralMap::default();
    let mut selftests = SelfTestReport::new();
    for accelerator in Accelerator::ALL {
        let base = discover::accelerator_base(&relocated.tree, accelerator)
            .at(BootStage::Accelerator(accelerator))?;
        match accelerator {
            Accelerator::Klein => peripherals.klein = base,
            Accelerator::Blake2s => peripherals.blake2s = base,
            Accelerator::Chacha => peripherals.chacha = base,
        }
        let mut port = platform.accelerator_port(accelerator, base);
        accelerator.run_selftests(&mut port, &mut selftests);
    }
    let passed = selftests.outcomes().iter().filter(|o| o.passed).count();
    log::info!(
        "{} of {} self-tests passed",
        passed,
        selftests.outcomes().len()
    );

    peripherals.gpio = discover::gpio_base(&relocated.tree).at(BootStage::Gpio)?;

    platform.enable_interrupts();
    Ok(BootOutcome {
        config,
        peripherals,
        dtb: relocated.tree,
        cpu0_timebase: relocated.cpu0_timebase,
        selftests,
    })
}
