//! Sequential construction of device tree blobs
//!
//! This is the in-memory counterpart of compiling a `.dts` file. Dependent crates use it to describe the hardware
//! their tests run against without shipping binary fixtures.

use crate::fdt::header::{FDT_LAST_COMP_VERSION, FDT_VERSION, HEADER_MAGIC};
use crate::fdt::structure::{align_to_token, FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_PROP};
use crate::fdt::{FdtError, FdtHeader, FlattenedDeviceTree, MemoryReservationEntry, HEADER_SIZE};
use alloc::vec;
use alloc::vec::Vec;

/// Builder for device tree blobs.
///
/// Nodes are opened with [`begin_node`](Self::begin_node), filled with properties and closed with
/// [`end_node`](Self::end_node). The first node must be the root node, which has an empty name.
#[derive(Debug, Default, Clone)]
pub struct FdtBuilder {
    reservations: Vec<MemoryReservationEntry>,
    structure: Vec<u8>,
    strings: Vec<u8>,
    open_nodes: usize,
    boot_cpuid_phys: u32,
}

impl FdtBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boot_cpuid_phys(&mut self, cpu: u32) -> &mut Self {
        self.boot_cpuid_phys = cpu;
        self
    }

    pub fn reserve_memory(&mut self, address: u64, size: u64) -> &mut Self {
        self.reservations
            .push(MemoryReservationEntry::new(address, size));
        self
    }

    fn push_token(&mut self, token: u32) {
        self.structure.extend_from_slice(&token.to_be_bytes());
    }

    fn pad_structure(&mut self) {
        let len = align_to_token(self.structure.len());
        self.structure.resize(len, 0);
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        self.push_token(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad_structure();
        self.open_nodes += 1;
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        self.push_token(FDT_END_NODE);
        self.open_nodes = self.open_nodes.saturating_sub(1);
        self
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let existing = self
            .strings
            .split_inclusive(|b| *b == 0)
            .scan(0, |offset, entry| {
                let start = *offset;
                *offset += entry.len();
                Some((start, entry))
            })
            .find(|(_, entry)| &entry[..entry.len() - 1] == name.as_bytes());
        if let Some((offset, _)) = existing {
            return offset as u32;
        }

        let offset = self.strings.len();
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        offset as u32
    }

    pub fn property(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let name_offset = self.string_offset(name);
        self.push_token(FDT_PROP);
        self.push_token(value.len() as u32);
        self.push_token(name_offset);
        self.structure.extend_from_slice(value);
        self.pad_structure();
        self
    }

    pub fn property_empty(&mut self, name: &str) -> &mut Self {
        self.property(name, &[])
    }

    pub fn property_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.property(name, &value.to_be_bytes())
    }

    pub fn property_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let value: Vec<u8> = cells.iter().flat_map(|cell| cell.to_be_bytes()).collect();
        self.property(name, &value)
    }

    pub fn property_str(&mut self, name: &str, value: &str) -> &mut Self {
        self.property_strings(name, &[value])
    }

    pub fn property_strings(&mut self, name: &str, values: &[&str]) -> &mut Self {
        let mut value = Vec::new();
        for entry in values {
            value.extend_from_slice(entry.as_bytes());
            value.push(0);
        }
        self.property(name, &value)
    }

    /// Encode the tree, failing with [`FdtError::Truncated`] if a node has not been closed
    pub fn finish(&self) -> Result<FdtBlob, FdtError> {
        if self.open_nodes != 0 || self.structure.is_empty() {
            return Err(FdtError::Truncated);
        }

        let mut structure = self.structure.clone();
        structure.extend_from_slice(&FDT_END.to_be_bytes());

        let reservations_len = (self.reservations.len() + 1) * 16;
        let off_dt_struct = HEADER_SIZE + reservations_len;
        let off_dt_strings = off_dt_struct + structure.len();
        let total_size = off_dt_strings + self.strings.len();

        let mut blob = FdtBlob::zeroed(total_size);
        let bytes = blob.as_bytes_mut();
        FdtHeader {
            magic: HEADER_MAGIC,
            total_size: total_size as u32,
            off_dt_struct: off_dt_struct as u32,
            off_dt_strings: off_dt_strings as u32,
            off_mem_rsvmap: HEADER_SIZE as u32,
            version: FDT_VERSION,
            last_comp_version: FDT_LAST_COMP_VERSION,
            boot_cpuid_phys: self.boot_cpuid_phys,
            size_dt_strings: self.strings.len() as u32,
            size_dt_struct: structure.len() as u32,
        }
        .write_to_buffer(bytes)?;

        for (entry, slot) in self
            .reservations
            .iter()
            .zip(bytes[HEADER_SIZE..off_dt_struct].chunks_exact_mut(16))
        {
            slot[..8].copy_from_slice(&entry.address.to_be_bytes());
            slot[8..].copy_from_slice(&entry.size.to_be_bytes());
        }
        bytes[off_dt_struct..off_dt_strings].copy_from_slice(&structure);
        bytes[off_dt_strings..].copy_from_slice(&self.strings);

        Ok(blob)
    }
}

/// A heap allocated byte buffer that is aligned to 8 bytes as required for device tree blobs
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FdtBlob {
    words: Vec<u64>,
    len: usize,
}

impl FdtBlob {
    /// A zero filled buffer of `len` bytes, e.g. as destination for [`FdtEditor::open_into`](crate::fdt::FdtEditor::open_into)
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(8)],
            len,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        // Safety: the words own at least `len` initialized bytes and u8 has no alignment requirement
        unsafe { core::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // Safety: see as_bytes, the exclusive borrow of self guarantees unique access
        unsafe { core::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tree(&self) -> Result<FlattenedDeviceTree<'_>, FdtError> {
        FlattenedDeviceTree::from_buffer(self.as_bytes())
    }
}

/// A small board description shared by the unit tests of this crate
#[cfg(test)]
pub(crate) fn test_tree() -> FdtBlob {
    let mut builder = FdtBuilder::new();
    builder
        .reserve_memory(0x8000_0000, 0x4_0000)
        .begin_node("")
        .property_u32("#address-cells", 2)
        .property_u32("#size-cells", 2)
        .begin_node("cpus")
        .property_u32("#address-cells", 1)
        .property_u32("#size-cells", 0)
        .begin_node("cpu@0")
        .property_str("device_type", "cpu")
        .property_strings("compatible", &["sifive,e51", "riscv"])
        .property_u32("reg", 0)
        .end_node()
        .begin_node("cpu@1")
        .property_str("device_type", "cpu")
        .property_strings("compatible", &["sifive,u54", "riscv"])
        .property_u32("reg", 1)
        .end_node()
        .end_node()
        .begin_node("memory@80000000")
        .property_str("device_type", "memory")
        .property_cells("reg", &[0, 0x8000_0000, 0, 0x1000_0000])
        .end_node()
        .begin_node("soc")
        .property_u32("#address-cells", 2)
        .property_u32("#size-cells", 2)
        .property_empty("ranges")
        .begin_node("serial@10013000")
        .property_str("compatible", "sifive,uart0")
        .property_cells("reg", &[0, 0x1001_3000, 0, 0x1000])
        .end_node()
        .end_node()
        .end_node();
    builder.finish().unwrap()
}
