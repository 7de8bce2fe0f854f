//! Navigation between nodes of the structure block

use crate::fdt::structure::{Tag, FDT_END_NODE};
use crate::fdt::{FdtError, FlattenedDeviceTree, StringListIterator};

/// Maximum nesting depth that [`FlattenedDeviceTree::parent_offset`] can track
pub(crate) const MAX_DEPTH: usize = 64;

/// A handle to a node of a specific generation of a device tree.
///
/// The handle is the offset of the node's FDT_BEGIN_NODE token inside the structure block. It becomes stale as
/// soon as the tree is edited because edits may move any node.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NodeOffset {
    pub(crate) offset: usize,
    pub(crate) generation: u32,
}

impl NodeOffset {
    /// Offset of the node inside the structure block
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Whether a node named `node_name` is addressed by the path component `component`.
///
/// A component without unit address also matches nodes that have one, so `memory` finds `memory@80000000`.
fn name_matches(node_name: &str, component: &str) -> bool {
    node_name == component
        || (!component.contains('@')
            && node_name
                .split_once('@')
                .is_some_and(|(base, _)| base == component))
}

impl<'buf> FlattenedDeviceTree<'buf> {
    fn handle(&self, offset: usize) -> NodeOffset {
        NodeOffset {
            offset,
            generation: self.generation,
        }
    }

    /// Validate that `node` belongs to this generation of the tree and points to a node
    pub(crate) fn resolve(&self, node: NodeOffset) -> Result<usize, FdtError> {
        if node.generation != self.generation {
            return Err(FdtError::StaleOffset);
        }
        match self.structure.next_tag(node.offset) {
            Ok((Tag::BeginNode, _)) => Ok(node.offset),
            _ => Err(FdtError::BadOffset(node.offset)),
        }
    }

    pub fn root(&self) -> Result<NodeOffset, FdtError> {
        let root = self.handle(0);
        self.resolve(root)?;
        Ok(root)
    }

    pub fn node_name(&self, node: NodeOffset) -> Result<&'buf str, FdtError> {
        let offset = self.resolve(node)?;
        self.structure.node_name(offset)
    }

    /// Advance from the node at `offset` to the next node in document order.
    ///
    /// `depth` is adjusted by the nesting difference between the two nodes. `None` is returned once the walk leaves
    /// the node at which `depth` was zero.
    fn next_node(&self, offset: usize, depth: &mut isize) -> Result<Option<usize>, FdtError> {
        let (_, mut next) = self.structure.next_tag(offset)?;
        loop {
            let (tag, after) = self.structure.next_tag(next)?;
            match tag {
                Tag::BeginNode => {
                    *depth += 1;
                    return Ok(Some(next));
                }
                Tag::EndNode => {
                    *depth -= 1;
                    if *depth < 0 {
                        return Ok(None);
                    }
                }
                Tag::End => return Ok(None),
                Tag::Prop | Tag::Nop => {}
            }
            next = after;
        }
    }

    pub fn first_subnode(&self, node: NodeOffset) -> Result<Option<NodeOffset>, FdtError> {
        let offset = self.resolve(node)?;
        let mut depth = 0;
        Ok(self
            .next_node(offset, &mut depth)?
            .filter(|_| depth == 1)
            .map(|child| self.handle(child)))
    }

    pub fn next_subnode(&self, node: NodeOffset) -> Result<Option<NodeOffset>, FdtError> {
        let mut offset = self.resolve(node)?;
        let mut depth = 1;
        loop {
            match self.next_node(offset, &mut depth)? {
                Some(next) if depth == 1 => return Ok(Some(self.handle(next))),
                Some(next) if depth > 1 => offset = next,
                _ => return Ok(None),
            }
        }
    }

    /// Iterate over the direct children of `node`.
    ///
    /// Malformed structure ends the iteration early. Use [`first_subnode`](Self::first_subnode) and
    /// [`next_subnode`](Self::next_subnode) to observe the error instead.
    pub fn subnodes(&self, node: NodeOffset) -> SubnodeIter<'buf> {
        SubnodeIter {
            fdt: *self,
            next: self.first_subnode(node).ok().flatten(),
        }
    }

    /// Find the child of `parent` called `name`, see [`path_offset`](Self::path_offset) for the matching rules
    pub fn subnode_offset(&self, parent: NodeOffset, name: &str) -> Result<NodeOffset, FdtError> {
        let mut child = self.first_subnode(parent)?;
        while let Some(node) = child {
            if name_matches(self.node_name(node)?, name) {
                return Ok(node);
            }
            child = self.next_subnode(node)?;
        }
        Err(FdtError::NotFound)
    }

    /// Search for a node that is located at the given absolute `path`.
    ///
    /// Inside the path `/` acts as a separator which denotes a level of child node. A component without a unit
    /// address matches the first child whose name without unit address is equal to it.
    ///
    /// # Example
    ///
    /// Given the following device tree, both `/cpus/cpu@0` and `/cpus/cpu` resolve to the `cpu@0` node.
    ///
    /// ```text
    /// /
    /// ├── cpus
    /// │   ├── cpu@0
    /// │   └── cpu@1
    /// └── memory@80000000
    /// ```
    pub fn path_offset(&self, path: &str) -> Result<NodeOffset, FdtError> {
        let components = path.strip_prefix('/').ok_or(FdtError::BadPath)?;
        components
            .split('/')
            .filter(|component| !component.is_empty())
            .try_fold(self.root()?, |node, component| {
                self.subnode_offset(node, component)
            })
    }

    /// Find the parent of `node`, failing with [`FdtError::NotFound`] for the root node
    pub fn parent_offset(&self, node: NodeOffset) -> Result<NodeOffset, FdtError> {
        let target = self.resolve(node)?;
        let mut open_nodes = [0usize; MAX_DEPTH];
        let mut depth = 0;
        let mut offset = 0;
        loop {
            let (tag, next) = self.structure.next_tag(offset)?;
            match tag {
                Tag::BeginNode if offset == target => {
                    return match depth {
                        0 => Err(FdtError::NotFound),
                        _ => Ok(self.handle(open_nodes[depth - 1])),
                    };
                }
                Tag::BeginNode => {
                    *open_nodes.get_mut(depth).ok_or(FdtError::TooDeep)? = offset;
                    depth += 1;
                }
                Tag::EndNode => {
                    depth = depth.checked_sub(1).ok_or(FdtError::BadStructure {
                        token: FDT_END_NODE,
                        offset,
                    })?
                }
                Tag::End => return Err(FdtError::BadOffset(target)),
                Tag::Prop | Tag::Nop => {}
            }
            offset = next;
        }
    }

    /// Offset just past the FDT_END_NODE token that closes the node at `offset`
    pub(crate) fn node_end(&self, offset: usize) -> Result<usize, FdtError> {
        let mut depth = 0usize;
        let mut current = offset;
        loop {
            let (tag, next) = self.structure.next_tag(current)?;
            match tag {
                Tag::BeginNode => depth += 1,
                Tag::EndNode => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(next);
                    }
                }
                Tag::End => return Err(FdtError::Truncated),
                Tag::Prop | Tag::Nop => {}
            }
            current = next;
        }
    }

    /// Iterate over all nodes in document order, starting with the root
    pub fn nodes(&self) -> NodeIter<'buf> {
        NodeIter {
            fdt: *self,
            next: self.root().ok().map(|root| root.offset),
            depth: 0,
        }
    }

    /// Whether the `compatible` string list of `node` contains `compatible`
    pub fn is_compatible(&self, node: NodeOffset, compatible: &str) -> Result<bool, FdtError> {
        Ok(self
            .getprop(node, "compatible")?
            .is_some_and(|value| StringListIterator { buf: value }.any(|entry| entry == compatible)))
    }

    /// Iterate over all nodes in document order whose `compatible` list contains `compatible`
    pub fn compatible_nodes<'a>(&self, compatible: &'a str) -> CompatibleIter<'buf, 'a> {
        CompatibleIter {
            nodes: self.nodes(),
            compatible,
        }
    }

    /// The first node in document order whose `compatible` list contains `compatible`
    pub fn node_offset_by_compatible(&self, compatible: &str) -> Result<NodeOffset, FdtError> {
        let mut node = Some(self.root()?.offset);
        let mut depth = 0;
        while let Some(offset) = node {
            let handle = self.handle(offset);
            if self.is_compatible(handle, compatible)? {
                return Ok(handle);
            }
            node = self.next_node(offset, &mut depth)?;
        }
        Err(FdtError::NotFound)
    }

    /// Offset of the first token after the properties of the node at `offset`.
    ///
    /// This is where new properties and subnodes get inserted.
    pub(crate) fn properties_end(&self, offset: usize) -> Result<usize, FdtError> {
        let (_, mut current) = self.structure.next_tag(offset)?;
        loop {
            match self.structure.next_tag(current)? {
                (Tag::Prop | Tag::Nop, next) => current = next,
                _ => return Ok(current),
            }
        }
    }
}

/// An iterator over the children of a node, see [`FlattenedDeviceTree::subnodes`]
#[derive(Debug, Clone)]
pub struct SubnodeIter<'buf> {
    fdt: FlattenedDeviceTree<'buf>,
    next: Option<NodeOffset>,
}

impl Iterator for SubnodeIter<'_> {
    type Item = NodeOffset;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.fdt.next_subnode(current).ok().flatten();
        Some(current)
    }
}

/// An iterator over all nodes of a tree in document order, see [`FlattenedDeviceTree::nodes`]
#[derive(Debug, Clone)]
pub struct NodeIter<'buf> {
    fdt: FlattenedDeviceTree<'buf>,
    next: Option<usize>,
    depth: isize,
}

impl Iterator for NodeIter<'_> {
    type Item = NodeOffset;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self
            .fdt
            .next_node(current, &mut self.depth)
            .ok()
            .flatten();
        Some(self.fdt.handle(current))
    }
}

/// An iterator over all nodes with a given compatible string, see [`FlattenedDeviceTree::compatible_nodes`]
#[derive(Debug, Clone)]
pub struct CompatibleIter<'buf, 'a> {
    nodes: NodeIter<'buf>,
    compatible: &'a str,
}

impl Iterator for CompatibleIter<'_, '_> {
    type Item = NodeOffset;

    fn next(&mut self) -> Option<Self::Item> {
        let fdt = self.nodes.fdt;
        let compatible = self.compatible;
        self.nodes
            .find(|node| fdt.is_compatible(*node, compatible).unwrap_or(false))
    }
}
