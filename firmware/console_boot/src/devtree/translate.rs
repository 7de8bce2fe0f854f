//! Translation of bus addresses into CPU physical addresses
//!
//! A `reg` address is only meaningful on the bus it is declared on. Every bus maps its address space into its
//! parent's through the `ranges` property, a list of `(child base, parent base, size)` triples. A bus without
//! `ranges`, or with an empty one, maps addresses one to one.

use crate::error::DiscoveryError;
use device_tree::fdt::{read_cells, FdtError, FlattenedDeviceTree, NodeOffset};

/// First entry of a node's `reg` property translated into a CPU physical address
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct RegEntry {
    pub address: u64,
    pub size: u64,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct RangeEntry {
    pub child_base: u64,
    pub parent_base: u64,
    pub size: u64,
}

impl RangeEntry {
    /// The parent bus address of `address`, `None` if this range does not cover it
    pub fn translate(&self, address: u64) -> Option<u64> {
        let offset = address.checked_sub(self.child_base)?;
        if offset < self.size {
            Some(self.parent_base.wrapping_add(offset))
        } else {
            None
        }
    }
}

/// Iterator over the triples of a `ranges` value. Trailing bytes that do not form a complete triple are ignored.
pub struct Ranges<'buf> {
    value: &'buf [u8],
    address_cells: u32,
    size_cells: u32,
}

impl<'buf> Ranges<'buf> {
    pub fn new(value: &'buf [u8], address_cells: u32, size_cells: u32) -> Self {
        Self {
            value,
            address_cells,
            size_cells,
        }
    }
}

impl Iterator for Ranges<'_> {
    type Item = RangeEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let (child_base, rest) = read_cells(self.value, self.address_cells)?;
        let (parent_base, rest) = read_cells(rest, self.address_cells)?;
        let (size, rest) = read_cells(rest, self.size_cells)?;
        self.value = rest;
        Some(RangeEntry {
            child_base,
            parent_base,
            size,
        })
    }
}

/// `#address-cells` and `#size-cells` of `bus`, both of which have to be present
pub fn bus_cells(
    tree: &FlattenedDeviceTree<'_>,
    bus: NodeOffset,
) -> Result<(u32, u32), DiscoveryError> {
    let address_cells = tree
        .address_cells(bus)
        .map_err(|e| cell_error(e, "#address-cells"))?;
    let size_cells = tree
        .size_cells(bus)
        .map_err(|e| cell_error(e, "#size-cells"))?;
    Ok((address_cells, size_cells))
}

fn cell_error(error: FdtError, name: &'static str) -> DiscoveryError {
    match error {
        FdtError::NotFound => DiscoveryError::PropertyMissing(name),
        FdtError::BadNCells => DiscoveryError::InvalidCellCount(name),
        e => e.into(),
    }
}

/// Translate `address` from the address space of the children of `bus` into the address space of its parent
pub fn translate_address(
    tree: &FlattenedDeviceTree<'_>,
    address: u64,
    bus: NodeOffset,
) -> Result<u64, DiscoveryError> {
    let (address_cells, size_cells) = bus_cells(tree, bus)?;
    let ranges = match tree.getprop(bus, "ranges")? {
        Some(ranges) if !ranges.is_empty() => ranges,
        _ => return Ok(address),
    };

    Ranges::new(ranges, address_cells, size_cells)
        .find_map(|range| range.translate(address))
        .ok_or(DiscoveryError::AddressNotFound(address))
}

/// Read the first `reg` entry of `node` and translate its address through every ancestor up to the root
pub fn node_address_size(
    tree: &FlattenedDeviceTree<'_>,
    node: NodeOffset,
) -> Result<RegEntry, DiscoveryError> {
    let parent = tree.parent_offset(node)?;
    let (address_cells, size_cells) = bus_cells(tree, parent)?;
    let reg = tree
        .getprop(node, "reg")?
        .ok_or(DiscoveryError::PropertyMissing("reg"))?;
    let (address, rest) =
        read_cells(reg, address_cells).ok_or(DiscoveryError::PropertyTooShort("reg"))?;
    let (size, _) = read_cells(rest, size_cells).ok_or(DiscoveryError::PropertyTooShort("reg"))?;

    let mut address = address;
    let mut bus = Some(parent);
    while let Some(current) = bus {
        address = translate_address(tree, address, current)?;
        bus = match tree.parent_offset(current) {
            Ok(next) => Some(next),
            Err(FdtError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
    }

    log::trace!(
        "{} is at {:#x} with size {:#x}",
        tree.node_name(node)?,
        address,
        size
    );
    Ok(RegEntry { address, size })
}
