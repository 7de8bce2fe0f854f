//! Preparation of the device tree that is handed to the next boot stage
//!
//! The loader's blob is never written. It is copied into a workspace with free space for the edits, edited and
//! finally packed, after which it can only be read.

use crate::config::{KERNEL_BOOTARGS, TIMEBASE_FREQUENCY};
use crate::devtree::discover;
use crate::error::{DiscoveryError, RelocationError};
use device_tree::fdt::{FdtEditor, FdtError, FlattenedDeviceTree, NodeOffset};

/// The packed tree for the next boot stage
#[derive(Debug, Copy, Clone)]
pub struct RelocatedTree<'buf> {
    pub tree: FlattenedDeviceTree<'buf>,
    /// The timebase the loader reported for the boot hart
    pub cpu0_timebase: u32,
}

/// Make sure that a workspace of `capacity` bytes at `target` does not overlap the blob in `source`
pub fn check_placement(source: &[u8], target: u64, capacity: usize) -> Result<(), RelocationError> {
    let source_start = source.as_ptr() as u64;
    let source_end = source_start + source.len() as u64;
    let target_end = target.saturating_add(capacity as u64);
    if target < source_end && source_start < target_end {
        return Err(RelocationError::OverlapsSource { target });
    }
    Ok(())
}

/// Copy `source` into `dest` and keep the rest of `dest` as free space for edits
pub fn relocate<'buf>(
    source: &FlattenedDeviceTree<'_>,
    dest: &'buf mut [u8],
) -> Result<FdtEditor<'buf>, RelocationError> {
    FdtEditor::open_into(source, dest).map_err(|e| match e {
        FdtError::NoSpace {
            required,
            available,
        } => RelocationError::RelocationOverflow {
            required,
            capacity: available,
        },
        e => RelocationError::TreeMutation(e),
    })
}

/// The child of `parent` called `name`, which is created if it does not exist yet
pub fn ensure_subnode(
    editor: &mut FdtEditor<'_>,
    parent: NodeOffset,
    name: &str,
) -> Result<NodeOffset, RelocationError> {
    match editor.tree()?.subnode_offset(parent, name) {
        Ok(node) => return Ok(node),
        Err(FdtError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }
    log::debug!("adding {} node", name);
    Ok(editor.add_subnode(parent, name)?)
}

/// Create or overwrite the property `name` of `node` with `value` and a null terminator
pub fn set_string_property(
    editor: &mut FdtEditor<'_>,
    node: NodeOffset,
    name: &str,
    value: &str,
) -> Result<(), RelocationError> {
    Ok(editor.setprop_str(node, name, value)?)
}

pub fn set_u32_property(
    editor: &mut FdtEditor<'_>,
    node: NodeOffset,
    name: &str,
    value: u32,
) -> Result<(), RelocationError> {
    Ok(editor.setprop_u32(node, name, value)?)
}

/// Delete every node matching `path` and return how many were deleted.
///
/// Optional nodes are removed with this, so a path that matches nothing is not an error.
pub fn remove_nodes(editor: &mut FdtEditor<'_>, path: &str) -> Result<usize, RelocationError> {
    let mut removed = 0;
    loop {
        let node = match editor.tree()?.path_offset(path) {
            Ok(node) => node,
            Err(FdtError::NotFound) => return Ok(removed),
            Err(e) => return Err(e.into()),
        };
        log::info!("Removing {}", path);
        editor.del_node(node)?;
        removed += 1;
    }
}

/// Apply the edits the next boot stage expects and pack the tree.
///
/// `/chosen/bootargs` is set to the kernel command line and `/cpus/timebase-frequency` to the fixed timebase.
pub fn prepare_for_handoff(mut editor: FdtEditor<'_>) -> Result<RelocatedTree<'_>, RelocationError> {
    let root = editor.tree()?.root()?;
    let chosen = ensure_subnode(&mut editor, root, "chosen")?;
    set_string_property(&mut editor, chosen, "bootargs", KERNEL_BOOTARGS)?;

    let cpu0_timebase = discover::cpu0_timebase(&editor.tree()?)?;

    let cpus = {
        let tree = editor.tree()?;
        tree.subnode_offset(tree.root()?, "cpus")
            .map_err(|e| match e {
                FdtError::NotFound => {
                    RelocationError::Discovery(DiscoveryError::NotFound(discover::CPUS_PATH))
                }
                e => RelocationError::TreeMutation(e),
            })?
    };
    set_u32_property(&mut editor, cpus, "timebase-frequency", TIMEBASE_FREQUENCY)?;

    Ok(RelocatedTree {
        tree: editor.pack()?,
        cpu0_timebase,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::devtree::test_trees::ConsoleTree;
    use device_tree::fdt::{FdtBlob, NodeProperty};

    const WORKSPACE: usize = 0x4000;

    fn property_value<'a>(tree: &FlattenedDeviceTree<'a>, path: &str, name: &str) -> Option<&'a [u8]> {
        let node = tree.path_offset(path).ok()?;
        tree.getprop(node, name).unwrap()
    }

    /// All properties of all nodes, listed as `(node name, property)` in document order
    fn contents<'a>(tree: &FlattenedDeviceTree<'a>) -> Vec<(&'a str, NodeProperty<'a>)> {
        tree.nodes()
            .flat_map(|node| {
                let name = tree.node_name(node).unwrap();
                tree.properties(node)
                    .unwrap()
                    .map(move |property| (name, property))
            })
            .collect()
    }

    fn owned(entries: Vec<(&str, NodeProperty<'_>)>) -> Vec<(String, String, Vec<u8>)> {
        entries
            .into_iter()
            .map(|(node, property)| (node.into(), property.name.into(), property.value.to_vec()))
            .collect()
    }

    #[test]
    fn relocation_adds_free_space() {
        let blob = ConsoleTree::default().build();
        let source = blob.tree().unwrap();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let editor = relocate(&source, dest.as_bytes_mut()).unwrap();

        assert_eq!(editor.tree().unwrap().total_size(), WORKSPACE);
        assert_eq!(editor.used_size().unwrap(), source.total_size());
        assert!(editor.free_space().unwrap() > 0);
    }

    #[test]
    fn too_small_workspace_overflows() {
        let blob = ConsoleTree::default().build();
        let source = blob.tree().unwrap();
        let mut dest = FdtBlob::zeroed(64);
        assert_eq!(
            relocate(&source, dest.as_bytes_mut()).err(),
            Some(RelocationError::RelocationOverflow {
                required: source.total_size(),
                capacity: 64
            })
        );
    }

    #[test]
    fn ensure_subnode_is_idempotent() {
        let blob = ConsoleTree::default().build();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let mut editor = relocate(&blob.tree().unwrap(), dest.as_bytes_mut()).unwrap();
        let root = editor.tree().unwrap().root().unwrap();

        let first = ensure_subnode(&mut editor, root, "chosen").unwrap();
        let root = editor.tree().unwrap().root().unwrap();
        let second = ensure_subnode(&mut editor, root, "chosen").unwrap();
        assert_eq!(first, second);

        let tree = editor.tree().unwrap();
        let chosen_nodes = tree
            .subnodes(tree.root().unwrap())
            .filter(|node| tree.node_name(*node).unwrap() == "chosen")
            .count();
        assert_eq!(chosen_nodes, 1);
    }

    #[test]
    fn existing_chosen_node_is_reused() {
        let blob = ConsoleTree {
            chosen: true,
            ..Default::default()
        }
        .build();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let editor = relocate(&blob.tree().unwrap(), dest.as_bytes_mut()).unwrap();
        let relocated = prepare_for_handoff(editor).unwrap();

        let tree = relocated.tree;
        assert_eq!(
            property_value(&tree, "/chosen", "bootargs"),
            Some(&b"console=hvc0 earlycon=sbi\0"[..])
        );
        assert_eq!(
            tree.subnodes(tree.root().unwrap())
                .filter(|node| tree.node_name(*node).unwrap() == "chosen")
                .count(),
            1
        );
    }

    #[test]
    fn bootargs_are_stored_with_terminator() {
        let blob = ConsoleTree::default().build();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let mut editor = relocate(&blob.tree().unwrap(), dest.as_bytes_mut()).unwrap();
        let root = editor.tree().unwrap().root().unwrap();
        let chosen = ensure_subnode(&mut editor, root, "chosen").unwrap();
        set_string_property(&mut editor, chosen, "bootargs", KERNEL_BOOTARGS).unwrap();

        let tree = editor.tree().unwrap();
        assert_eq!(
            property_value(&tree, "/chosen", "bootargs"),
            Some(&b"console=hvc0 earlycon=sbi\0"[..])
        );
    }

    #[test]
    fn stale_handles_are_rejected_after_an_edit() {
        let blob = ConsoleTree::default().build();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let mut editor = relocate(&blob.tree().unwrap(), dest.as_bytes_mut()).unwrap();
        let cpus = editor.tree().unwrap().path_offset("/cpus").unwrap();
        let root = editor.tree().unwrap().root().unwrap();
        ensure_subnode(&mut editor, root, "chosen").unwrap();

        assert_eq!(
            set_u32_property(&mut editor, cpus, "timebase-frequency", 1),
            Err(RelocationError::TreeMutation(FdtError::StaleOffset))
        );
    }

    #[test]
    fn handoff_edits_survive_packing() {
        let blob = ConsoleTree::default().build();
        let source = blob.tree().unwrap();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let editor = relocate(&source, dest.as_bytes_mut()).unwrap();
        let relocated = prepare_for_handoff(editor).unwrap();
        let tree = relocated.tree;

        assert_eq!(relocated.cpu0_timebase, 500_000);
        assert_eq!(
            property_value(&tree, "/chosen", "bootargs"),
            Some(&b"console=hvc0 earlycon=sbi\0"[..])
        );
        assert_eq!(
            property_value(&tree, "/cpus", "timebase-frequency"),
            Some(&1_000_000u32.to_be_bytes()[..])
        );
        assert!(tree.total_size() < WORKSPACE);
        assert_eq!(discover::uart_base(&tree), discover::uart_base(&source));

        // everything but the two edits is carried over unchanged
        let mut expected = contents(&source);
        expected.retain(|(node, _)| *node != "chosen");
        let mut actual = contents(&tree);
        actual.retain(|(node, property)| {
            *node != "chosen" && !(*node == "cpus" && property.name == "timebase-frequency")
        });
        assert_eq!(owned(actual), owned(expected));
    }

    #[test]
    fn packing_never_grows_the_tree() {
        let blob = ConsoleTree::default().build();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let mut editor = relocate(&blob.tree().unwrap(), dest.as_bytes_mut()).unwrap();
        remove_nodes(&mut editor, "/soc/gpio").unwrap();
        let used = editor.used_size().unwrap();
        let before = editor.tree().unwrap().total_size();

        let packed = editor.pack().unwrap();
        assert!(packed.total_size() <= before);
        assert_eq!(packed.total_size(), used);
        assert!(packed.path_offset("/soc/gpio").is_err());
        assert!(packed.path_offset("/soc/serial").is_ok());
    }

    #[test]
    fn removing_missing_nodes_is_a_noop() {
        let blob = ConsoleTree::default().build();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let mut editor = relocate(&blob.tree().unwrap(), dest.as_bytes_mut()).unwrap();
        let used = editor.used_size().unwrap();

        assert_eq!(remove_nodes(&mut editor, "/soc/ethernet"), Ok(0));
        assert_eq!(editor.used_size().unwrap(), used);
        // without a unit address every cpu matches, so all of them go
        assert_eq!(remove_nodes(&mut editor, "/cpus/cpu"), Ok(4));
    }

    #[test]
    fn missing_cpu0_timebase_is_fatal() {
        let blob = ConsoleTree {
            cpu0_timebase: vec![],
            ..Default::default()
        }
        .build();
        let mut dest = FdtBlob::zeroed(WORKSPACE);
        let editor = relocate(&blob.tree().unwrap(), dest.as_bytes_mut()).unwrap();
        assert_eq!(
            prepare_for_handoff(editor).err(),
            Some(RelocationError::Discovery(DiscoveryError::PropertyTooShort(
                "timebase-frequency"
            )))
        );
    }

    #[test]
    fn placement_must_not_overlap_the_source() {
        let source = [0u8; 0x100];
        let start = source.as_ptr() as u64;
        assert!(check_placement(&source, start + 0x100, 0x1000).is_ok());
        assert!(check_placement(&source, start - 0x1000, 0x1000).is_ok());
        assert_eq!(
            check_placement(&source, start + 0x80, 0x1000),
            Err(RelocationError::OverlapsSource { target: start + 0x80 })
        );
        assert!(check_placement(&source, start - 0x800, 0x1000).is_err());
    }
}
