//! Reading node properties

use crate::fdt::structure::Tag;
use crate::fdt::{FdtError, FlattenedDeviceTree, NodeOffset, MAX_CELLS};

/// A single property of a node.
///
/// The value is the raw encoded data. Conversions into the standard value encodings are provided by the
/// `TryFrom` implementations and [`StringListIterator`](crate::fdt::StringListIterator).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct NodeProperty<'buf> {
    pub name: &'buf str,
    pub value: &'buf [u8],
    /// Offset of the FDT_PROP token inside the structure block
    pub(crate) offset: usize,
}

/// An iterator over the properties of a single node, see [`FlattenedDeviceTree::properties`]
#[derive(Debug, Clone)]
pub struct PropertyIter<'buf> {
    fdt: FlattenedDeviceTree<'buf>,
    offset: Option<usize>,
}

impl<'buf> PropertyIter<'buf> {
    /// Try to read the next property.
    ///
    /// Unlike the [`Iterator`] implementation this surfaces errors caused by a malformed blob.
    pub fn next_property(&mut self) -> Result<Option<NodeProperty<'buf>>, FdtError> {
        while let Some(offset) = self.offset {
            let (tag, next) = self.fdt.structure.next_tag(offset)?;
            match tag {
                Tag::Nop => self.offset = Some(next),
                Tag::Prop => {
                    self.offset = Some(next);
                    return self.fdt.property_at(offset).map(Some);
                }
                _ => self.offset = None,
            }
        }
        Ok(None)
    }
}

impl<'buf> Iterator for PropertyIter<'buf> {
    type Item = NodeProperty<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_property().ok().flatten()
    }
}

impl<'buf> FlattenedDeviceTree<'buf> {
    pub(crate) fn property_at(&self, offset: usize) -> Result<NodeProperty<'buf>, FdtError> {
        let raw = self.structure.property(offset)?;
        Ok(NodeProperty {
            name: self.strings.get_str(raw.name_offset as usize)?,
            value: raw.value,
            offset,
        })
    }

    pub fn properties(&self, node: NodeOffset) -> Result<PropertyIter<'buf>, FdtError> {
        let offset = self.resolve(node)?;
        let (_, first) = self.structure.next_tag(offset)?;
        Ok(PropertyIter {
            fdt: *self,
            offset: Some(first),
        })
    }

    pub fn property(
        &self,
        node: NodeOffset,
        name: &str,
    ) -> Result<Option<NodeProperty<'buf>>, FdtError> {
        let mut properties = self.properties(node)?;
        while let Some(property) = properties.next_property()? {
            if property.name == name {
                return Ok(Some(property));
            }
        }
        Ok(None)
    }

    /// The raw value of the property `name` of `node`, `None` if the node has no such property
    pub fn getprop(&self, node: NodeOffset, name: &str) -> Result<Option<&'buf [u8]>, FdtError> {
        Ok(self.property(node, name)?.map(|property| property.value))
    }

    /// The `#address-cells` value of `node`.
    ///
    /// Unlike most readers this does not fall back to the default of 2 when the property is missing but fails with
    /// [`FdtError::NotFound`], leaving the decision to the caller.
    pub fn address_cells(&self, node: NodeOffset) -> Result<u32, FdtError> {
        match self.cell_count(node, "#address-cells")? {
            0 => Err(FdtError::BadNCells),
            cells => Ok(cells),
        }
    }

    /// The `#size-cells` value of `node`, see [`address_cells`](Self::address_cells)
    pub fn size_cells(&self, node: NodeOffset) -> Result<u32, FdtError> {
        self.cell_count(node, "#size-cells")
    }

    fn cell_count(&self, node: NodeOffset, name: &str) -> Result<u32, FdtError> {
        let property = self.property(node, name)?.ok_or(FdtError::NotFound)?;
        let cells = u32::try_from(&property).map_err(|_| FdtError::BadNCells)?;
        if cells > MAX_CELLS {
            return Err(FdtError::BadNCells);
        }
        Ok(cells)
    }
}
