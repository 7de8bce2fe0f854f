//! Everything the firmware learns from or changes in the device tree
//!
//! Lookups are always done by path or compatible string on the tree that is current at the time, node handles are
//! never kept across an edit.

pub mod discover;
pub mod relocate;
pub mod translate;

#[cfg(test)]
pub(crate) mod test_trees;
