use node_reserve::{ContextId, MemTree, NodeReserve, NodeTree, Options, TreeId};
use std::num::NonZeroU64;

pub fn setup() -> NodeReserve {
    let mut o = Options::new();
    o.metrics(true);
    NodeReserve::setup(o)
}

pub fn cx(raw: u64) -> ContextId {
    ContextId::from_raw(NonZeroU64::new(raw).unwrap())
}

/// A tree of the given depth with `free` free nodes out of `total`, nothing reserved.
pub fn tree(id: u32, depth: u16, free: u64, total: u64) -> MemTree {
    let mut tree = MemTree::new(TreeId(id), depth, total);
    tree.allocate(total - free).unwrap();
    tree
}

/// Reserved nodes on the tree match the sum over its active reservations.
#[allow(dead_code)]
pub fn assert_ledger_consistent(reserve: &NodeReserve, tree: &MemTree) {
    let audit = reserve.audit(tree.id());
    assert_eq!(
        tree.control().reserved_nodes,
        audit.reserved,
        "reserved nodes of tree {:?} diverged from the ledger",
        tree.id()
    );
}
