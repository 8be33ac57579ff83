//! The boundary to the B+Tree engine whose node pool is being reserved.

/// Identifies a tree, e.g. by the file reference of its node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct TreeId(pub u32);

impl From<u32> for TreeId {
    fn from(x: u32) -> Self {
        TreeId(x)
    }
}

/// Node accounting fields of a tree's control block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeControl {
    /// Nodes in the pool not allocated to tree content.
    pub free_nodes: u64,
    /// Sum of the admitted amounts of all active reservations against this tree.
    pub reserved_nodes: u64,
    /// All nodes in the pool, including map nodes.
    pub total_nodes: u64,
    /// The height of the tree. Zero for an empty tree.
    pub depth: u16,
}

/// A B+Tree whose node pool backs reservations.
///
/// Holding `&mut` to an implementor stands for holding the tree's own lock: every operation of
/// [`crate::NodeReserve`] that reads or writes [`TreeControl`] requires it.
pub trait NodeTree {
    fn id(&self) -> TreeId;

    fn control(&self) -> &TreeControl;

    fn control_mut(&mut self) -> &mut TreeControl;

    /// The number of nodes the free-space map can track before another map node is needed.
    fn map_bits(&self) -> u64;

    /// Grow the node pool so that it holds `total_nodes` nodes, updating the free and total counts
    /// in the control block.
    ///
    /// Returns an error if the nodes could not be obtained. The control block must be left as it
    /// was in that case.
    fn extend(&mut self, total_nodes: u64) -> anyhow::Result<()>;
}
