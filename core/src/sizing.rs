//! Worst-case sizing of node reservations.
//!
//! Every insert may split the leaf it lands in and every index node on the path up to the root.
//! Every delete may push a larger separator key up the index, which in turn can split each index
//! level above the leaf. On top of that one root split is always budgeted, since a root split adds
//! a level to the tree.
//!
//! All quantities here are plain node counts. Signed values appear where a tree can temporarily
//! have more nodes promised than it has free, which happens once reserved nodes start being
//! consumed.

use crate::ops::Operations;

/// The number of nodes that must be held back so that `ops` can be applied to a tree of the given
/// depth without running out of nodes partway through.
///
/// An empty batch reserves exactly one node: the root split allowance.
pub fn reserve_nodes(depth: u16, ops: Operations) -> u64 {
    let height = depth as u64;

    // root split.
    let mut nodes = 1;

    if ops.deletes > 0 {
        // the delete term is floored at zero for trees of depth 0 or 1, which have no index
        // levels for a separator to propagate into.
        nodes += (ops.deletes as u64 * height.saturating_sub(1)).saturating_sub(1);
    }

    if ops.inserts > 0 {
        nodes += ops.inserts as u64 * height + 1;
    }

    nodes
}

/// Free nodes not promised to any reservation. Negative when reserved nodes have been consumed
/// from the free pool ahead of their release.
pub fn unreserved(free_nodes: u64, reserved_nodes: u64) -> i64 {
    free_nodes as i64 - reserved_nodes as i64
}

/// The total pool size a tree must be grown to in order to admit `reserve` more nodes, given
/// `available` unreserved nodes and `total_nodes` in the pool today.
///
/// If the result no longer fits into the free-space map, one more node is requested to hold the
/// additional map node.
///
/// Only meaningful when `reserve > available`.
pub fn growth_target(reserve: u64, available: i64, total_nodes: u64, map_bits: u64) -> u64 {
    debug_assert!(reserve as i64 > available);

    let mut need = (reserve as i64 + total_nodes as i64 - available) as u64;
    if need > map_bits {
        need += 1;
    }
    need
}

/// The nodes a context may still count on: everything unreserved plus whatever is left of its
/// own reservation, which is already carved out of `reserved_nodes`.
pub fn available_nodes(free_nodes: u64, reserved_nodes: u64, remaining: u64) -> i64 {
    unreserved(free_nodes, reserved_nodes) + remaining as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{quickcheck, TestResult};

    #[test]
    fn empty_batch_reserves_root_split_only() {
        for depth in 0..10 {
            assert_eq!(reserve_nodes(depth, Operations::default()), 1);
        }
    }

    #[test]
    fn inserts_budget_every_level_plus_one() {
        // 1 + (2 * 3 + 1)
        assert_eq!(reserve_nodes(3, Operations::inserts(2)), 8);
        // 1 + (1 * 1 + 1)
        assert_eq!(reserve_nodes(1, Operations::inserts(1)), 3);
    }

    #[test]
    fn deletes_budget_index_levels() {
        // 1 + (4 * 2 - 1)
        assert_eq!(reserve_nodes(3, Operations::deletes(4)), 8);
        // 1 + (1 * 1 - 1)
        assert_eq!(reserve_nodes(2, Operations::deletes(1)), 1);
    }

    #[test]
    fn deletes_on_shallow_trees_do_not_underflow() {
        assert_eq!(reserve_nodes(1, Operations::deletes(5)), 1);
        assert_eq!(reserve_nodes(0, Operations::deletes(5)), 1);
    }

    #[test]
    fn mixed_batch() {
        // 1 + (3 * 3 - 1) + (2 * 4 + 1)
        assert_eq!(reserve_nodes(4, Operations::new(2, 3)), 18);
    }

    #[test]
    fn counts_beyond_sixteen_bits_are_not_truncated() {
        let ops = Operations::inserts(70_000);
        assert_eq!(reserve_nodes(2, ops), 1 + 70_000 * 2 + 1);
    }

    #[test]
    fn growth_target_covers_shortfall() {
        // 8 + 100 - 5
        assert_eq!(growth_target(8, 5, 100, 1024), 103);
    }

    #[test]
    fn growth_target_adds_map_node() {
        assert_eq!(growth_target(8, 5, 100, 103), 103);
        assert_eq!(growth_target(8, 5, 100, 102), 104);
    }

    #[test]
    fn growth_target_with_overcommitted_pool() {
        // available is negative once reservations have been consumed.
        assert_eq!(unreserved(2, 6), -4);
        assert_eq!(growth_target(3, -4, 50, 1024), 57);
    }

    #[test]
    fn available_nodes_adds_own_remainder() {
        assert_eq!(available_nodes(10, 8, 5), 7);
        assert_eq!(available_nodes(10, 8, 0), 2);
    }

    quickcheck! {
        fn reserve_is_monotone_in_inserts(depth: u16, inserts: u16, deletes: u16) -> TestResult {
            let depth = depth % 64 + 1;
            let ops = Operations::new(inserts as u32, deletes as u32);
            let more = Operations::new(inserts as u32 + 1, deletes as u32);
            TestResult::from_bool(reserve_nodes(depth, more) > reserve_nodes(depth, ops))
        }

        fn reserve_is_at_least_one(depth: u16, inserts: u32, deletes: u32) -> bool {
            reserve_nodes(depth, Operations::new(inserts, deletes)) >= 1
        }

        fn growth_target_exceeds_pool(reserve: u16, available: i16, total: u16) -> TestResult {
            let (reserve, available, total) = (reserve as u64, available as i64, total as u64);
            if reserve as i64 <= available {
                return TestResult::discard();
            }
            let need = growth_target(reserve, available, total, u64::MAX);
            TestResult::from_bool(need > total)
        }
    }
}
