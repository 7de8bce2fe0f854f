//! Library for handling [Device Tree](https://www.devicetree.org/) data in its flattened encoding (fdt/dtb)
//!
//! The library works directly on the encoded blob. Nodes are addressed by [`NodeOffset`](fdt::NodeOffset) handles
//! into the structure block, which makes it usable before any allocator exists. Blobs can be relocated into a
//! larger buffer and edited in place through [`FdtEditor`](fdt::FdtEditor).
#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod fdt;
