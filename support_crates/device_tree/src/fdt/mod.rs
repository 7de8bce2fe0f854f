//! Reading and in-place editing of flattened device trees
//!
//! A blob starts with a fixed [`FdtHeader`], followed by the memory reservation block, the structure block holding
//! the nodes and their property values, and the strings block holding the property names.
//!
//! A blob opened for editing through [`FdtEditor::open_into`] always uses the layout below, with all unused bytes
//! of the destination buffer collected at the end. Editing operations grow and shrink the structure and strings
//! blocks into that free space. [`FdtEditor::pack`] drops the free space again.
//! ```text
//! ┌──────────────────────────┐
//! │ struct FdtHeader         │
//! ├──────────────────────────┤
//! │ memory reservation block │
//! ├──────────────────────────┤
//! │ structure block          │
//! ├──────────────────────────┤
//! │ strings block            │
//! ├──────────────────────────┤
//! │ (free space)             │
//! └──────────────────────────┘
//! ```
//!
//! # Node handles
//!
//! Nodes are identified by a [`NodeOffset`], the offset of their `FDT_BEGIN_NODE` token inside the structure
//! block. Any edit may move nodes around, so every handle remembers the generation of the tree it was obtained
//! from and is rejected with [`FdtError::StaleOffset`] once the tree has been modified.
//!
//! # Example
//!
//! Building a blob requires the `alloc` feature.
//!
//! ```ignore
//! # use device_tree::fdt::{FdtBuilder, FlattenedDeviceTree};
//! let mut builder = FdtBuilder::new();
//! builder
//!     .begin_node("")
//!     .begin_node("memory@80000000")
//!     .property_str("device_type", "memory")
//!     .end_node()
//!     .end_node();
//! let blob = builder.finish().unwrap();
//!
//! let dtb = FlattenedDeviceTree::from_buffer(blob.as_bytes()).unwrap();
//! let memory = dtb.path_offset("/memory").unwrap();
//! assert_eq!(dtb.node_name(memory).unwrap(), "memory@80000000");
//! ```

#[cfg(any(test, feature = "alloc"))]
mod builder;
mod dtb;
mod editor;
mod header;
mod memory_reservation;
mod strings;
mod structure;

#[cfg(any(test, feature = "alloc"))]
pub use builder::{FdtBlob, FdtBuilder};
pub use dtb::{FdtError, FlattenedDeviceTree};
pub use editor::FdtEditor;
pub use header::{FdtHeader, HeaderReadError, HEADER_SIZE};
pub use memory_reservation::{
    MemoryReservationBlock, MemoryReservationEntry, MemoryReservationFormatError,
};
pub use strings::{Strings, StringsError};
pub use structure::node::{CompatibleIter, NodeIter, NodeOffset, SubnodeIter};
pub use structure::property::{NodeProperty, PropertyIter};
pub use structure::property_value_encoding::{
    read_cells, InvalidValueLength, StringError, StringListIterator, MAX_CELLS,
};
