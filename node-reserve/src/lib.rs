//! Node reservations for B+Tree catalog stores.
//!
//! A caller about to apply a batch of inserts and deletes to a tree first reserves enough free
//! nodes to complete every split the batch could cause, growing the tree's node pool if needed.
//! Once admitted, the batch cannot run out of nodes partway through. The reservation is held per
//! execution context and is released when the batch is done.
//!
//! ```ignore
//! let reserve = NodeReserve::setup(Options::new());
//! let cx = ContextId::current();
//! let mut slot = ReservationSlot::new();
//!
//! // with the tree locked:
//! reserve.reserve_space(&mut tree, cx, Operations::inserts(1), Some(&mut slot))?;
//! // ... insert, allocating nodes and reporting them via `update_reserve` ...
//! reserve.release_reserve(&mut tree, cx, &mut slot);
//! ```

use std::sync::Arc;

use tracing::{debug, trace, warn};

use ledger::{Insertion, Ledger};
use metrics::{Metric, Metrics};

pub use context::ContextId;
pub use ledger::{LedgerAudit, ReservationKey, ReservationSlot};
pub use mem_tree::MemTree;
pub use node_reserve_core::Operations;
pub use options::Options;
pub use tree::{NodeTree, TreeControl, TreeId};

#[cfg(feature = "benchmarks")]
pub mod benches;

mod context;
mod ledger;
pub mod mem_tree;
pub mod metrics;
mod options;
mod tree;

/// The reservation service. One instance is set up per process and shared by every caller that
/// modifies trees.
///
/// This is a lightweight handle and can be cloned cheaply.
///
/// All operations that take a tree require the caller to hold that tree's lock, which the `&mut`
/// or `&` borrow stands for. Operations on different trees or by different contexts are
/// independent.
#[derive(Clone)]
pub struct NodeReserve {
    ledger: Arc<Ledger>,
    metrics: Metrics,
}

impl NodeReserve {
    /// Set up the reservation ledger.
    ///
    /// Panics if the options are invalid.
    pub fn setup(o: Options) -> Self {
        NodeReserve {
            ledger: Arc::new(Ledger::new(o.buckets)),
            metrics: Metrics::new(o.metrics),
        }
    }

    /// The nodes `cx` can count on in `tree`: those free and unreserved plus what is left of its
    /// own reservation, if it holds one.
    pub fn available_nodes<T: NodeTree + ?Sized>(&self, tree: &T, cx: ContextId) -> i64 {
        let remaining = self.ledger.lookup(ReservationKey::new(tree.id(), cx));
        let control = tree.control();
        node_reserve_core::available_nodes(control.free_nodes, control.reserved_nodes, remaining)
    }

    /// Reserve enough nodes in `tree` for `ops` to complete, growing the tree if the unreserved
    /// free nodes fall short.
    ///
    /// With a `slot`, the reservation is recorded for `cx` and counted in the tree's reserved
    /// nodes until [`NodeReserve::release_reserve`]. If `cx` already holds a reservation for this
    /// tree, nothing is recorded: the existing reservation stays as it is and `slot` stays unused.
    ///
    /// Without a slot, the nodes are only guaranteed to be free on return. Nothing is recorded.
    ///
    /// If growing the tree fails the error is returned as is and nothing is reserved.
    ///
    /// Panics if `slot` is active under another key.
    pub fn reserve_space<T: NodeTree + ?Sized>(
        &self,
        tree: &mut T,
        cx: ContextId,
        ops: Operations,
        slot: Option<&mut ReservationSlot>,
    ) -> anyhow::Result<()> {
        let control = *tree.control();
        let rsrv_nodes = node_reserve_core::reserve_nodes(control.depth, ops);
        let available = node_reserve_core::unreserved(control.free_nodes, control.reserved_nodes);

        if rsrv_nodes as i64 > available {
            let need = node_reserve_core::growth_target(
                rsrv_nodes,
                available,
                control.total_nodes,
                tree.map_bits(),
            );
            self.grow(tree, need)?;
        }

        let Some(slot) = slot else {
            return Ok(());
        };

        let key = ReservationKey::new(tree.id(), cx);
        match self.ledger.insert(key, slot, rsrv_nodes) {
            Insertion::Inserted => {
                tree.control_mut().reserved_nodes += rsrv_nodes;
                self.metrics.count(Metric::Reservations);
                trace!(
                    tree = key.tree.0,
                    context = cx.as_u64(),
                    nodes = rsrv_nodes,
                    "reserved"
                );
            }
            Insertion::AlreadyActive => {
                self.metrics.count(Metric::NestedReservations);
                trace!(
                    tree = key.tree.0,
                    context = cx.as_u64(),
                    nodes = rsrv_nodes,
                    "context already holds a reservation, not recorded"
                );
            }
        }

        Ok(())
    }

    /// Release the reservation held in `slot`, returning its nodes to the tree's unreserved pool.
    ///
    /// Does nothing if the slot is not active, so a second release is harmless.
    ///
    /// Panics if `slot` is active under a different tree or context.
    pub fn release_reserve<T: NodeTree + ?Sized>(
        &self,
        tree: &mut T,
        cx: ContextId,
        slot: &mut ReservationSlot,
    ) {
        let key = ReservationKey::new(tree.id(), cx);
        let node_count = self.ledger.delete(key, slot);
        if node_count > 0 {
            let control = tree.control_mut();
            debug_assert!(
                control.reserved_nodes >= node_count,
                "tree {} reserves {} nodes, releasing {}",
                key.tree.0,
                control.reserved_nodes,
                node_count
            );
            control.reserved_nodes = control.reserved_nodes.saturating_sub(node_count);
            self.metrics.count(Metric::Releases);
            trace!(
                tree = key.tree.0,
                context = cx.as_u64(),
                nodes = node_count,
                "released"
            );
        }
    }

    /// Account `nodes_allocated` nodes taken from the free pool of `tree` on behalf of `cx`
    /// against its reservation.
    ///
    /// Called by the node allocator. Does nothing if `cx` holds no reservation for the tree.
    pub fn update_reserve(&self, tree: TreeId, cx: ContextId, nodes_allocated: u64) {
        self.ledger.update(ReservationKey::new(tree, cx), nodes_allocated);
    }

    /// Sum up the active reservations against `tree`.
    pub fn audit(&self, tree: TreeId) -> LedgerAudit {
        self.ledger.audit(tree)
    }

    /// The number of active reservations across all trees.
    pub fn active_reservations(&self) -> usize {
        self.ledger.len()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn grow<T: NodeTree + ?Sized>(&self, tree: &mut T, total_nodes: u64) -> anyhow::Result<()> {
        debug!(
            tree = tree.id().0,
            from = tree.control().total_nodes,
            to = total_nodes,
            "growing node pool to admit reservation"
        );

        self.metrics.count(Metric::Growths);
        let _timer = self.metrics.record(Metric::GrowthTime);

        if let Err(err) = tree.extend(total_nodes) {
            self.metrics.count(Metric::GrowthFailures);
            warn!(
                tree = tree.id().0,
                to = total_nodes,
                "failed to grow node pool: {:#}",
                err
            );
            return Err(err);
        }

        Ok(())
    }
}
