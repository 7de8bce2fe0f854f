//! In-place editing of a device tree blob
//!
//! Edits always happen on a copy made by [`FdtEditor::open_into`]. The copy uses the canonical block order with all
//! free space at the end, so growing or shrinking a block only requires moving the bytes behind it.

use crate::fdt::header::{FDT_LAST_COMP_VERSION, FDT_VERSION, HEADER_MAGIC};
use crate::fdt::structure::{
    align_to_token, FDT_BEGIN_NODE, FDT_END_NODE, FDT_PROP, PROP_HEADER_SIZE, TOKEN_SIZE,
};
use crate::fdt::{
    FdtError, FdtHeader, FlattenedDeviceTree, HeaderReadError, MemoryReservationBlock, NodeOffset,
    HEADER_SIZE,
};

/// A device tree blob that is being edited inside a buffer with free space.
///
/// Every successful edit starts a new generation of the tree, which invalidates all previously obtained
/// [`NodeOffset`] handles. Read access goes through [`tree`](Self::tree).
#[derive(Debug)]
pub struct FdtEditor<'buf> {
    buf: &'buf mut [u8],
    generation: u32,
}

fn check_property_name(name: &str) -> Result<(), FdtError> {
    if name.is_empty() || name.contains('\0') {
        return Err(FdtError::BadName);
    }
    Ok(())
}

fn check_node_name(name: &str) -> Result<(), FdtError> {
    if name.is_empty() || name.contains(['\0', '/']) {
        return Err(FdtError::BadName);
    }
    Ok(())
}

impl<'buf> FdtEditor<'buf> {
    /// Copy `source` into `dest` and use the remainder of `dest` as free space for edits.
    ///
    /// `dest` must be aligned to 8 bytes and large enough to hold the header and all blocks of `source`.
    pub fn open_into(
        source: &FlattenedDeviceTree<'_>,
        dest: &'buf mut [u8],
    ) -> Result<Self, FdtError> {
        if dest.as_ptr() as usize % 8 != 0 {
            return Err(HeaderReadError::InvalidAlignment.into());
        }

        let reservations = source.memory_reservations.as_bytes();
        let structure = source.structure.as_bytes();
        let strings = source.strings.as_bytes();

        let off_mem_rsvmap = HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + reservations.len();
        let off_dt_strings = off_dt_struct + structure.len();
        let required = off_dt_strings + strings.len();
        let total_size = dest.len().min(u32::MAX as usize);
        if total_size < required {
            return Err(FdtError::NoSpace {
                required,
                available: dest.len(),
            });
        }

        dest[off_mem_rsvmap..off_dt_struct].copy_from_slice(reservations);
        dest[off_dt_struct..off_dt_strings].copy_from_slice(structure);
        dest[off_dt_strings..required].copy_from_slice(strings);
        dest[required..total_size].fill(0);

        let header = FdtHeader {
            magic: HEADER_MAGIC,
            total_size: total_size as u32,
            off_dt_struct: off_dt_struct as u32,
            off_dt_strings: off_dt_strings as u32,
            off_mem_rsvmap: off_mem_rsvmap as u32,
            version: FDT_VERSION,
            last_comp_version: FDT_LAST_COMP_VERSION,
            boot_cpuid_phys: source.header.boot_cpuid_phys,
            size_dt_strings: strings.len() as u32,
            size_dt_struct: structure.len() as u32,
        };
        header.write_to_buffer(dest)?;

        Ok(Self {
            buf: dest,
            generation: source.generation.wrapping_add(1),
        })
    }

    /// A read-only view of the current generation of the tree
    pub fn tree(&self) -> Result<FlattenedDeviceTree<'_>, FdtError> {
        FlattenedDeviceTree::from_buffer_with_generation(self.buf, self.generation)
    }

    fn header(&self) -> Result<FdtHeader, FdtError> {
        Ok(FdtHeader::read_from_buffer(self.buf)?)
    }

    /// Bytes currently occupied by the header and all blocks
    pub fn used_size(&self) -> Result<usize, FdtError> {
        Ok(self.header()?.used_size())
    }

    /// Bytes that are still available for edits
    pub fn free_space(&self) -> Result<usize, FdtError> {
        let header = self.header()?;
        Ok(header.total_size as usize - header.used_size())
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Replace `old_len` bytes at buffer offset `at` with `new_len` bytes, moving everything behind them.
    ///
    /// The content of the replacement bytes is unspecified.
    fn splice(
        &mut self,
        header: &FdtHeader,
        at: usize,
        old_len: usize,
        new_len: usize,
    ) -> Result<(), FdtError> {
        let data_end = header.used_size();
        if at + old_len > data_end {
            return Err(FdtError::BadOffset(at));
        }
        let new_end = data_end - old_len + new_len;
        if new_end > header.total_size as usize {
            return Err(FdtError::NoSpace {
                required: new_end,
                available: header.total_size as usize,
            });
        }
        self.buf.copy_within(at + old_len..data_end, at + new_len);
        Ok(())
    }

    /// Like [`splice`](Self::splice) but with an offset relative to the structure block, updating the header
    fn splice_struct(
        &mut self,
        offset: usize,
        old_len: usize,
        new_len: usize,
    ) -> Result<usize, FdtError> {
        let mut header = self.header()?;
        if offset + old_len > header.size_dt_struct as usize {
            return Err(FdtError::BadOffset(offset));
        }
        let at = header.off_dt_struct as usize + offset;
        self.splice(&header, at, old_len, new_len)?;

        header.size_dt_struct = (header.size_dt_struct as usize - old_len + new_len) as u32;
        header.off_dt_strings = (header.off_dt_strings as usize - old_len + new_len) as u32;
        header.write_to_buffer(self.buf)?;
        Ok(at)
    }

    /// Offset of `name` in the strings block, appending it if it is not present yet
    fn add_string(&mut self, name: &str) -> Result<u32, FdtError> {
        if let Some(offset) = self.tree()?.strings.find(name) {
            return Ok(offset as u32);
        }

        let mut header = self.header()?;
        let at = header.used_size();
        let len = name.len() + 1;
        self.splice(&header, at, 0, len)?;
        self.buf[at..at + name.len()].copy_from_slice(name.as_bytes());
        self.buf[at + name.len()] = 0;

        let offset = header.size_dt_strings;
        header.size_dt_strings += len as u32;
        header.write_to_buffer(self.buf)?;
        Ok(offset)
    }

    /// Create or resize the property `name` of `node` to hold `len` bytes and return its zeroed value for filling in
    pub fn setprop_placeholder(
        &mut self,
        node: NodeOffset,
        name: &str,
        len: usize,
    ) -> Result<&mut [u8], FdtError> {
        check_property_name(name)?;
        let (node_offset, existing) = {
            let tree = self.tree()?;
            let existing = tree
                .property(node, name)?
                .map(|property| (property.offset, property.value.len()));
            (node.offset, existing)
        };
        let padded_len = align_to_token(len);

        let value_at = match existing {
            Some((property_offset, old_len)) => {
                let value_offset = property_offset + PROP_HEADER_SIZE;
                let value_at =
                    self.splice_struct(value_offset, align_to_token(old_len), padded_len)?;
                let len_at = value_at - PROP_HEADER_SIZE + TOKEN_SIZE;
                self.buf[len_at..len_at + TOKEN_SIZE].copy_from_slice(&(len as u32).to_be_bytes());
                value_at
            }
            None => {
                let name_offset = self.add_string(name)?;
                let insert_at = self.tree()?.properties_end(node_offset)?;
                let at = self.splice_struct(insert_at, 0, PROP_HEADER_SIZE + padded_len)?;
                for (i, word) in [FDT_PROP, len as u32, name_offset].into_iter().enumerate() {
                    let word_at = at + i * TOKEN_SIZE;
                    self.buf[word_at..word_at + TOKEN_SIZE].copy_from_slice(&word.to_be_bytes());
                }
                at + PROP_HEADER_SIZE
            }
        };
        self.bump_generation();

        let value = &mut self.buf[value_at..value_at + padded_len];
        value.fill(0);
        Ok(&mut value[..len])
    }

    /// Create or overwrite the property `name` of `node` with `value`
    pub fn setprop(&mut self, node: NodeOffset, name: &str, value: &[u8]) -> Result<(), FdtError> {
        self.setprop_placeholder(node, name, value.len())?
            .copy_from_slice(value);
        Ok(())
    }

    /// Set the property `name` of `node` to a single big-endian cell
    pub fn setprop_u32(&mut self, node: NodeOffset, name: &str, value: u32) -> Result<(), FdtError> {
        self.setprop(node, name, &value.to_be_bytes())
    }

    /// Set the property `name` of `node` to `value` followed by a null terminator
    pub fn setprop_str(&mut self, node: NodeOffset, name: &str, value: &str) -> Result<(), FdtError> {
        let slot = self.setprop_placeholder(node, name, value.len() + 1)?;
        slot[..value.len()].copy_from_slice(value.as_bytes());
        Ok(())
    }

    /// Add an empty child called `name` to `parent`, failing with [`FdtError::Exists`] if `parent` already has one
    pub fn add_subnode(&mut self, parent: NodeOffset, name: &str) -> Result<NodeOffset, FdtError> {
        check_node_name(name)?;
        let insert_at = {
            let tree = self.tree()?;
            match tree.subnode_offset(parent, name) {
                Ok(_) => return Err(FdtError::Exists),
                Err(FdtError::NotFound) => {}
                Err(e) => return Err(e),
            }
            tree.properties_end(parent.offset)?
        };

        let node_len = TOKEN_SIZE + align_to_token(name.len() + 1) + TOKEN_SIZE;
        let at = self.splice_struct(insert_at, 0, node_len)?;
        let node = &mut self.buf[at..at + node_len];
        node.fill(0);
        node[..TOKEN_SIZE].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        node[TOKEN_SIZE..TOKEN_SIZE + name.len()].copy_from_slice(name.as_bytes());
        node[node_len - TOKEN_SIZE..].copy_from_slice(&FDT_END_NODE.to_be_bytes());
        self.bump_generation();

        Ok(NodeOffset {
            offset: insert_at,
            generation: self.generation,
        })
    }

    /// Remove `node` together with all its properties and descendants
    pub fn del_node(&mut self, node: NodeOffset) -> Result<(), FdtError> {
        let (start, end) = {
            let tree = self.tree()?;
            let start = tree.resolve(node)?;
            if start == 0 {
                return Err(FdtError::BadOffset(start));
            }
            (start, tree.node_end(start)?)
        };
        self.splice_struct(start, end - start, 0)?;
        self.bump_generation();
        Ok(())
    }

    /// Move all blocks together and shrink the blob to the space they occupy.
    ///
    /// This ends editing, the packed tree is handed back read-only.
    pub fn pack(self) -> Result<FlattenedDeviceTree<'buf>, FdtError> {
        let mut header = self.header()?;
        let reservations_len =
            MemoryReservationBlock::from_buffer(&self.buf[header.off_mem_rsvmap as usize..])?
                .as_bytes()
                .len();
        let struct_len = header.size_dt_struct as usize;
        let strings_len = header.size_dt_strings as usize;

        let off_mem_rsvmap = HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + reservations_len;
        let off_dt_strings = off_dt_struct + struct_len;
        let total_size = off_dt_strings + strings_len;

        // blocks only ever move towards the start, so moving them front to back never overwrites unmoved data
        for (from, to, len) in [
            (header.off_mem_rsvmap as usize, off_mem_rsvmap, reservations_len),
            (header.off_dt_struct as usize, off_dt_struct, struct_len),
            (header.off_dt_strings as usize, off_dt_strings, strings_len),
        ] {
            self.buf.copy_within(from..from + len, to);
        }

        header.off_mem_rsvmap = off_mem_rsvmap as u32;
        header.off_dt_struct = off_dt_struct as u32;
        header.off_dt_strings = off_dt_strings as u32;
        header.total_size = total_size as u32;
        header.write_to_buffer(self.buf)?;

        let generation = self.generation.wrapping_add(1);
        let buf: &'buf [u8] = self.buf;
        FlattenedDeviceTree::from_buffer_with_generation(&buf[..total_size], generation)
    }
}
