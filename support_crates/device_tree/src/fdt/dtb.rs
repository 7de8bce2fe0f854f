//! Handling of the DTB/FDT as a whole

use crate::fdt::structure::StructureBlock;
use crate::fdt::{
    FdtHeader, HeaderReadError, MemoryReservationBlock, MemoryReservationFormatError, Strings,
    StringsError,
};
use core::ops::Range;
use thiserror_no_std::Error;

/// The errors that can occur when reading or editing a FDT
#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum FdtError {
    /// The FDT header could not be parsed for a specific reason
    #[error("Could not parse the fdt header: {0}")]
    HeaderParseError(#[from] HeaderReadError),
    /// The memory reservation block could not be parsed for a specific reason
    #[error("Could not parse memory reservation block: {0}")]
    MemoryReservationError(#[from] MemoryReservationFormatError),
    /// A property name could not be read from the strings block
    #[error("Could not read from the strings block: {0}")]
    StringsError(#[from] StringsError),
    /// The requested node or property does not exist
    #[error("The requested node or property does not exist")]
    NotFound,
    /// A node with the requested name already exists
    #[error("A node with the requested name already exists")]
    Exists,
    /// The buffer holding the tree has not enough free space for an edit
    #[error("The edit requires {required} bytes but the buffer only holds {available} bytes")]
    NoSpace { required: usize, available: usize },
    /// The offset does not point to the beginning of a node
    #[error("Offset {0} does not point to the beginning of a node")]
    BadOffset(usize),
    /// The node handle was obtained before the tree was last modified
    #[error("The node handle was obtained before the tree was last modified")]
    StaleOffset,
    /// The path is not absolute
    #[error("Node paths must be absolute")]
    BadPath,
    /// The name is not valid for a node or property
    #[error("The name is not valid for a node or property")]
    BadName,
    /// A `#address-cells` or `#size-cells` property does not hold a supported cell count
    #[error("A #address-cells or #size-cells property does not hold a supported cell count")]
    BadNCells,
    /// The blocks of the blob do not fit into the buffer or the structure block ends prematurely
    #[error("The device tree blob is truncated")]
    Truncated,
    /// The structure block contains an unknown token
    #[error("Unexpected token {token:#x} at structure offset {offset}")]
    BadStructure { token: u32, offset: usize },
    /// Nodes are nested deeper than this library can track
    #[error("Nodes are nested too deeply")]
    TooDeep,
}

/// A handle to a flattened device tree that has been parsed from an underlying buffer
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct FlattenedDeviceTree<'buf> {
    /// Metadata information about the device tree
    pub header: FdtHeader,
    /// Areas of the system memory which are reserved and should not be used without special care
    pub memory_reservations: MemoryReservationBlock<'buf>,
    pub(crate) structure: StructureBlock<'buf>,
    pub(crate) strings: Strings<'buf>,
    /// The exact buffer that holds this device trees data
    pub buf: &'buf [u8],
    pub(crate) generation: u32,
}

fn block_range(offset: u32, size: u32, total_size: usize) -> Result<Range<usize>, FdtError> {
    let start = offset as usize;
    let end = start.checked_add(size as usize).ok_or(FdtError::Truncated)?;
    if end > total_size {
        return Err(FdtError::Truncated);
    }
    Ok(start..end)
}

impl<'buf> FlattenedDeviceTree<'buf> {
    /// Try to parse a FDT from a buffer
    pub fn from_buffer(buf: &'buf [u8]) -> Result<Self, FdtError> {
        Self::from_buffer_with_generation(buf, 0)
    }

    pub(crate) fn from_buffer_with_generation(
        buf: &'buf [u8],
        generation: u32,
    ) -> Result<Self, FdtError> {
        let header = FdtHeader::read_from_buffer(buf)?;
        let total_size = header.total_size as usize;
        let buf = buf.get(..total_size).ok_or(FdtError::Truncated)?;

        let reservations = buf
            .get(header.off_mem_rsvmap as usize..)
            .ok_or(FdtError::Truncated)?;
        let memory_reservations = MemoryReservationBlock::from_buffer(reservations)?;
        let structure = block_range(header.off_dt_struct, header.size_dt_struct, total_size)?;
        let strings = block_range(header.off_dt_strings, header.size_dt_strings, total_size)?;

        Ok(Self {
            header,
            memory_reservations,
            structure: StructureBlock::from_buffer(&buf[structure]),
            strings: Strings::from_buffer(&buf[strings]),
            buf,
            generation,
        })
    }

    /// Try to read a FDT from a raw pointer
    ///
    /// # Safety
    /// The given pointer must be valid and the backing memory must be readable for at least 40 bytes after it.
    ///
    /// The underlying memory must also be valid for as long as the resulting instance is used.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, FdtError> {
        let header = FdtHeader::from_ptr(ptr)?;
        let buf = core::slice::from_raw_parts::<u8>(ptr, header.total_size as usize);
        Self::from_buffer(buf)
    }

    /// Size of the blob as recorded in its header, including free space
    pub fn total_size(&self) -> usize {
        self.header.total_size as usize
    }

    /// How often the underlying blob has been modified, node handles are only valid for one generation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The raw structure block
    pub fn structure_bytes(&self) -> &'buf [u8] {
        self.structure.as_bytes()
    }

    /// The raw strings block
    pub fn strings(&self) -> Strings<'buf> {
        self.strings
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fdt::FdtBuilder;

    #[test]
    fn blob_from_builder_parses() {
        let mut builder = FdtBuilder::new();
        builder
            .reserve_memory(0x8000_0000, 0x20_0000)
            .begin_node("")
            .property_u32("#address-cells", 2)
            .begin_node("chosen")
            .end_node()
            .end_node();
        let blob = builder.finish().unwrap();

        let dtb = FlattenedDeviceTree::from_buffer(blob.as_bytes()).unwrap();
        assert_eq!(dtb.total_size(), blob.as_bytes().len());
        assert_eq!(dtb.memory_reservations.len(), 1);
        assert_eq!(dtb.generation(), 0);
        assert!(dtb.strings().find("#address-cells").is_some());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut builder = FdtBuilder::new();
        builder.begin_node("").end_node();
        let blob = builder.finish().unwrap();
        let bytes = blob.as_bytes();

        assert_eq!(
            FlattenedDeviceTree::from_buffer(&bytes[..bytes.len() - 4]),
            Err(FdtError::Truncated)
        );
    }
}
