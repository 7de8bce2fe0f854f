//! Lookup of the devices and configuration values the firmware needs
//!
//! Every lookup either yields a value or a [`DiscoveryError`] naming what is missing. Nothing is guessed, an
//! address that can not be discovered is never replaced by a default.

use crate::config::{MemoryRegion, PlicConfig};
use crate::devtree::translate::node_address_size;
use crate::error::DiscoveryError;
use crate::selftest::Accelerator;
use device_tree::fdt::{FdtError, FlattenedDeviceTree, NodeOffset};

pub const SERIAL_PATH: &str = "/soc/serial";
pub const PERIPHERAL_CLOCK_PATH: &str = "/soc/subsystem_pbus_clock";
pub const MEMORY_PATH: &str = "/memory";
pub const CPUS_PATH: &str = "/cpus";
pub const CPU0_PATH: &str = "/cpus/cpu@0";
pub const INTERRUPT_CONTROLLER_PATH: &str = "/soc/interrupt-controller";
pub const GPIO_PATH: &str = "/soc/gpio";

const CELL_SIZE: usize = 4;

pub fn node_by_path(
    tree: &FlattenedDeviceTree<'_>,
    path: &'static str,
) -> Result<NodeOffset, DiscoveryError> {
    tree.path_offset(path).map_err(|e| match e {
        FdtError::NotFound => DiscoveryError::NotFound(path),
        e => e.into(),
    })
}

/// The first node in document order that lists `compatible` in its `compatible` property
pub fn node_by_compatible(
    tree: &FlattenedDeviceTree<'_>,
    compatible: &'static str,
) -> Result<NodeOffset, DiscoveryError> {
    tree.node_offset_by_compatible(compatible)
        .map_err(|e| match e {
            FdtError::NotFound => DiscoveryError::NotFound(compatible),
            e => e.into(),
        })
}

/// Decode a scalar property value.
///
/// Compatibility quirk: values longer than one cell are not rejected but reduced to their last complete cell,
/// which silently drops the upper half of 64 bit values. Existing blobs rely on this, so it must not be extended
/// to other properties.
fn last_cell(value: &[u8]) -> Option<u32> {
    let cells = value.len() / CELL_SIZE;
    let last = cells.checked_sub(1)? * CELL_SIZE;
    let cell = value.get(last..last + CELL_SIZE)?;
    Some(u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
}

/// Read a scalar `u32` property of `node`, see [`last_cell`] for how longer values are handled
pub fn read_u32(
    tree: &FlattenedDeviceTree<'_>,
    node: NodeOffset,
    name: &'static str,
) -> Result<u32, DiscoveryError> {
    let value = tree
        .getprop(node, name)?
        .ok_or(DiscoveryError::PropertyMissing(name))?;
    last_cell(value).ok_or(DiscoveryError::PropertyTooShort(name))
}

pub fn uart_base(tree: &FlattenedDeviceTree<'_>) -> Result<u64, DiscoveryError> {
    let serial = node_by_path(tree, SERIAL_PATH)?;
    Ok(node_address_size(tree, serial)?.address)
}

/// Frequency of the peripheral bus clock in Hz
pub fn peripheral_clock(tree: &FlattenedDeviceTree<'_>) -> Result<u32, DiscoveryError> {
    let clock = node_by_path(tree, PERIPHERAL_CLOCK_PATH)?;
    read_u32(tree, clock, "clock-frequency")
}

pub fn memory_region(tree: &FlattenedDeviceTree<'_>) -> Result<MemoryRegion, DiscoveryError> {
    let memory = node_by_path(tree, MEMORY_PATH)?;
    let reg = node_address_size(tree, memory)?;
    Ok(MemoryRegion {
        base: reg.address,
        size: reg.size,
    })
}

/// The hart id of a `/cpus` child, `None` if it is no cpu node or its `reg` can not be read
fn hart_id(tree: &FlattenedDeviceTree<'_>, cpu: NodeOffset) -> Option<u32> {
    let device_type = tree.getprop(cpu, "device_type").ok()??;
    if !device_type.starts_with(b"cpu") {
        return None;
    }
    read_u32(tree, cpu, "reg").ok()
}

/// The highest hart id of all cpu nodes below `/cpus`, 0 if there are none
pub fn max_hart_id(tree: &FlattenedDeviceTree<'_>) -> Result<u32, DiscoveryError> {
    let cpus = match tree.path_offset(CPUS_PATH) {
        Ok(cpus) => cpus,
        Err(FdtError::NotFound) => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut max = 0;
    let mut cpu = tree.first_subnode(cpus)?;
    while let Some(node) = cpu {
        match hart_id(tree, node) {
            Some(id) => max = max.max(id),
            None => log::debug!("skipping {} while counting harts", tree.node_name(node)?),
        }
        cpu = tree.next_subnode(node)?;
    }
    Ok(max)
}

pub fn hart_count(tree: &FlattenedDeviceTree<'_>) -> Result<u32, DiscoveryError> {
    Ok(max_hart_id(tree)?.saturating_add(1))
}

pub fn interrupt_controller(tree: &FlattenedDeviceTree<'_>) -> Result<PlicConfig, DiscoveryError> {
    let plic = node_by_path(tree, INTERRUPT_CONTROLLER_PATH)?;
    Ok(PlicConfig {
        base: node_address_size(tree, plic)?.address,
        ndev: read_u32(tree, plic, "riscv,ndev")?,
        max_priority: read_u32(tree, plic, "riscv,max-priority")?,
    })
}

pub fn accelerator_base(
    tree: &FlattenedDeviceTree<'_>,
    accelerator: Accelerator,
) -> Result<u64, DiscoveryError> {
    let node = node_by_compatible(tree, accelerator.compatible())?;
    Ok(node_address_size(tree, node)?.address)
}

pub fn gpio_base(tree: &FlattenedDeviceTree<'_>) -> Result<u64, DiscoveryError> {
    let gpio = node_by_path(tree, GPIO_PATH)?;
    Ok(node_address_size(tree, gpio)?.address)
}

/// The `timebase-frequency` the loader reported for the boot hart
pub fn cpu0_timebase(tree: &FlattenedDeviceTree<'_>) -> Result<u32, DiscoveryError> {
    let cpu0 = node_by_path(tree, CPU0_PATH)?;
    read_u32(tree, cpu0, "timebase-frequency")
}
