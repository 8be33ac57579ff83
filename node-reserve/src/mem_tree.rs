//! An in-memory node pool implementing [`NodeTree`].
//!
//! It models just enough of a tree file for reservations to be exercised: a pool of nodes that
//! can grow up to a capacity, and a free-space map made of a header map plus map nodes, where
//! every map node is carved out of the pool it tracks.

use std::io;

use anyhow::bail;

use crate::tree::{NodeTree, TreeControl, TreeId};

/// Nodes tracked by the map record in the header node.
pub const HEADER_MAP_BITS: u64 = 2048;

/// Nodes tracked by each additional map node.
pub const MAP_NODE_BITS: u64 = 4080 * 8;

pub struct MemTree {
    id: TreeId,
    control: TreeControl,
    /// The most nodes the pool may hold.
    capacity: u64,
    map_nodes: u64,
    extend_requests: Vec<u64>,
    injected_failure: Option<io::Error>,
}

impl MemTree {
    /// Create a tree with `total_nodes` nodes, all of them free, and room to grow without limit.
    pub fn new(id: TreeId, depth: u16, total_nodes: u64) -> Self {
        let mut tree = MemTree {
            id,
            control: TreeControl {
                free_nodes: 0,
                reserved_nodes: 0,
                total_nodes: 0,
                depth,
            },
            capacity: u64::MAX,
            map_nodes: 0,
            extend_requests: Vec::new(),
            injected_failure: None,
        };
        tree.resize(total_nodes);
        tree
    }

    /// Limit the number of nodes the pool can grow to.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Make the next call to [`NodeTree::extend`] fail with `err`.
    pub fn fail_next_extend(&mut self, err: io::Error) {
        self.injected_failure = Some(err);
    }

    /// The totals requested from [`NodeTree::extend`], in call order.
    pub fn extend_requests(&self) -> &[u64] {
        &self.extend_requests
    }

    pub fn map_nodes(&self) -> u64 {
        self.map_nodes
    }

    pub fn set_depth(&mut self, depth: u16) {
        self.control.depth = depth;
    }

    /// Hand `n` free nodes to tree content.
    ///
    /// This is what the tree's node allocator does. Accounting the nodes against a reservation is
    /// up to the caller.
    pub fn allocate(&mut self, n: u64) -> anyhow::Result<()> {
        if n > self.control.free_nodes {
            bail!(
                "tree {} has {} free nodes, cannot allocate {}",
                self.id.0,
                self.control.free_nodes,
                n
            );
        }
        self.control.free_nodes -= n;
        Ok(())
    }

    /// Return `n` nodes from tree content to the free pool.
    pub fn deallocate(&mut self, n: u64) {
        let used = self.control.total_nodes - self.map_nodes - self.control.free_nodes;
        assert!(n <= used, "deallocating {} nodes, only {} in use", n, used);
        self.control.free_nodes += n;
    }

    fn map_bits_with(&self, map_nodes: u64) -> u64 {
        HEADER_MAP_BITS + map_nodes * MAP_NODE_BITS
    }

    // grow to `total_nodes`, adding map nodes until the map covers the whole pool.
    fn resize(&mut self, total_nodes: u64) {
        let needed = total_nodes
            .saturating_sub(HEADER_MAP_BITS)
            .div_ceil(MAP_NODE_BITS);
        let map_nodes = self.map_nodes.max(needed);

        let added = total_nodes - self.control.total_nodes;
        let new_map_nodes = map_nodes - self.map_nodes;

        self.control.total_nodes = total_nodes;
        self.control.free_nodes += added.saturating_sub(new_map_nodes);
        self.map_nodes = map_nodes;
    }
}

impl NodeTree for MemTree {
    fn id(&self) -> TreeId {
        self.id
    }

    fn control(&self) -> &TreeControl {
        &self.control
    }

    fn control_mut(&mut self) -> &mut TreeControl {
        &mut self.control
    }

    fn map_bits(&self) -> u64 {
        self.map_bits_with(self.map_nodes)
    }

    fn extend(&mut self, total_nodes: u64) -> anyhow::Result<()> {
        self.extend_requests.push(total_nodes);

        if let Some(err) = self.injected_failure.take() {
            return Err(err.into());
        }

        if total_nodes <= self.control.total_nodes {
            return Ok(());
        }

        if total_nodes > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "node pool of tree {} cannot grow to {} nodes, capacity is {}",
                    self.id.0, total_nodes, self.capacity
                ),
            )
            .into());
        }

        self.resize(total_nodes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tree_is_all_free() {
        let tree = MemTree::new(TreeId(1), 2, 100);
        assert_eq!(tree.control().total_nodes, 100);
        assert_eq!(tree.control().free_nodes, 100);
        assert_eq!(tree.map_bits(), HEADER_MAP_BITS);
    }

    #[test]
    fn growth_past_header_map_spends_a_map_node() {
        let mut tree = MemTree::new(TreeId(1), 2, HEADER_MAP_BITS);
        tree.extend(HEADER_MAP_BITS + 10).unwrap();
        assert_eq!(tree.map_nodes(), 1);
        assert_eq!(tree.control().total_nodes, HEADER_MAP_BITS + 10);
        assert_eq!(tree.control().free_nodes, HEADER_MAP_BITS + 9);
        assert_eq!(tree.map_bits(), HEADER_MAP_BITS + MAP_NODE_BITS);
    }

    #[test]
    fn extend_never_shrinks() {
        let mut tree = MemTree::new(TreeId(1), 2, 100);
        tree.extend(50).unwrap();
        assert_eq!(tree.control().total_nodes, 100);
        assert_eq!(tree.extend_requests(), &[50]);
    }

    #[test]
    fn extend_beyond_capacity_fails_without_change() {
        let mut tree = MemTree::new(TreeId(1), 2, 100).with_capacity(120);
        assert!(tree.extend(121).is_err());
        assert_eq!(tree.control().total_nodes, 100);
        tree.extend(120).unwrap();
        assert_eq!(tree.control().free_nodes, 120);
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut tree = MemTree::new(TreeId(1), 2, 10);
        tree.fail_next_extend(io::Error::new(io::ErrorKind::TimedOut, "slow disk"));
        let err = tree.extend(20).unwrap_err();
        assert_eq!(
            err.downcast_ref::<io::Error>().map(|e| e.kind()),
            Some(io::ErrorKind::TimedOut)
        );
        tree.extend(20).unwrap();
        assert_eq!(tree.control().total_nodes, 20);
    }

    #[test]
    fn allocate_and_deallocate() {
        let mut tree = MemTree::new(TreeId(1), 2, 10);
        tree.allocate(4).unwrap();
        assert_eq!(tree.control().free_nodes, 6);
        assert!(tree.allocate(7).is_err());
        tree.deallocate(4);
        assert_eq!(tree.control().free_nodes, 10);
    }
}
