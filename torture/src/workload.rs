use std::sync::Arc;

use anyhow::{ensure, Result};
use node_reserve::{ContextId, MemTree, NodeReserve, NodeTree, Operations, ReservationSlot};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::cli::Cli;

/// How each worker shapes its batches.
#[derive(Clone, Debug)]
pub struct WorkloadConfig {
    /// The number of batches a worker runs.
    pub iterations: usize,
    /// The upper bound of inserts in a batch, inclusive.
    pub max_inserts: u32,
    /// The upper bound of deletes in a batch, inclusive.
    pub max_deletes: u32,
    /// The probability, out of 100, that a finished batch leaves its nodes allocated.
    pub retain: u8,
    /// The probability, out of 100, of reserving again while holding a reservation.
    pub nested: u8,
    /// The probability, out of 100, that a batch only checks for space without recording it.
    pub unrecorded: u8,
}

impl WorkloadConfig {
    pub fn new(cli: &Cli) -> Self {
        WorkloadConfig {
            iterations: cli.iterations,
            max_inserts: cli.max_inserts,
            max_deletes: cli.max_deletes,
            retain: cli.retain,
            nested: cli.nested,
            unrecorded: cli.unrecorded,
        }
    }
}

/// What a worker got done.
#[derive(Default, Debug, Clone)]
pub struct WorkerReport {
    /// Batches admitted with a recorded reservation.
    pub admitted: u64,
    /// Batches admitted without recording anything.
    pub unrecorded: u64,
    /// Reservations attempted while another was held.
    pub nested: u64,
    /// Reservations turned down because the tree could not grow.
    pub refused: u64,
    /// Nodes consumed against reservations.
    pub consumed: u64,
}

impl WorkerReport {
    pub fn merge(&mut self, other: &WorkerReport) {
        self.admitted += other.admitted;
        self.unrecorded += other.unrecorded;
        self.nested += other.nested;
        self.refused += other.refused;
        self.consumed += other.consumed;
    }
}

/// A single worker. Every worker runs on its own thread and therefore under its own context.
pub struct Worker {
    rng: rand_pcg::Pcg64,
    config: WorkloadConfig,
    tree: Arc<Mutex<MemTree>>,
    reserve: NodeReserve,
    cx: ContextId,
    /// Nodes this worker left allocated in the tree after its batches.
    retained: u64,
    report: WorkerReport,
}

impl Worker {
    pub fn new(
        seed: u64,
        config: WorkloadConfig,
        tree: Arc<Mutex<MemTree>>,
        reserve: NodeReserve,
    ) -> Self {
        Worker {
            rng: rand_pcg::Pcg64::seed_from_u64(seed),
            config,
            tree,
            reserve,
            cx: ContextId::current(),
            retained: 0,
            report: WorkerReport::default(),
        }
    }

    /// Run all batches. An `Err` means an invariant of the reservation layer was observed to be
    /// broken.
    pub fn run(mut self) -> Result<WorkerReport> {
        for _ in 0..self.config.iterations {
            self.batch()?;
            std::thread::yield_now();
        }
        self.free_retained(self.retained);
        debug!(context = self.cx.as_u64(), "worker done: {:?}", self.report);
        Ok(self.report)
    }

    fn gen_ops(&mut self) -> Operations {
        Operations::new(
            self.rng.gen_range(0..=self.config.max_inserts),
            self.rng.gen_range(0..=self.config.max_deletes),
        )
    }

    fn chance(&mut self, percent: u8) -> bool {
        self.rng.gen_ratio(percent as u32, 100)
    }

    fn batch(&mut self) -> Result<()> {
        let ops = self.gen_ops();

        if self.chance(self.config.unrecorded) {
            return self.unrecorded_batch(ops);
        }

        let mut slot = ReservationSlot::new();
        let node_count = {
            let mut tree = self.tree.lock();
            let before = tree.control().reserved_nodes;
            if let Err(err) = self
                .reserve
                .reserve_space(&mut *tree, self.cx, ops, Some(&mut slot))
            {
                drop(tree);
                return self.refused(err);
            }
            ensure!(slot.is_active(), "admitted reservation left the slot unused");
            let node_count = tree.control().reserved_nodes - before;
            ensure!(node_count > 0, "admitted reservation for {:?} holds no nodes", ops);
            self.check(&tree)?;
            node_count
        };
        self.report.admitted += 1;
        trace!(context = self.cx.as_u64(), node_count, "admitted {:?}", ops);

        if self.chance(self.config.nested) {
            self.nested_reserve()?;
        }

        let consumed = self.consume(node_count)?;
        let retain = self.chance(self.config.retain);

        let mut tree = self.tree.lock();
        let before = tree.control().reserved_nodes;
        self.reserve.release_reserve(&mut *tree, self.cx, &mut slot);
        ensure!(!slot.is_active(), "released slot still active");
        ensure!(
            before - tree.control().reserved_nodes == node_count,
            "release returned {} nodes, reservation held {}",
            before - tree.control().reserved_nodes,
            node_count,
        );

        // a second release is a no-op.
        let before = tree.control().reserved_nodes;
        self.reserve.release_reserve(&mut *tree, self.cx, &mut slot);
        ensure!(
            tree.control().reserved_nodes == before,
            "repeated release changed reserved nodes"
        );

        if retain {
            self.retained += consumed;
        } else {
            tree.deallocate(consumed);
        }
        self.check(&tree)
    }

    fn unrecorded_batch(&mut self, ops: Operations) -> Result<()> {
        let mut tree = self.tree.lock();
        let before = tree.control().reserved_nodes;
        if let Err(err) = self.reserve.reserve_space(&mut *tree, self.cx, ops, None) {
            drop(tree);
            return self.refused(err);
        }
        ensure!(
            tree.control().reserved_nodes == before,
            "unrecorded reservation changed reserved nodes"
        );
        // nothing is held, so what the context can count on is the unreserved free pool, which
        // covers at least the one node every batch is sized for.
        let available = self.reserve.available_nodes(&*tree, self.cx);
        ensure!(
            available >= 1,
            "admitted {:?} with only {} nodes available",
            ops,
            available
        );
        self.report.unrecorded += 1;
        self.check(&tree)
    }

    fn nested_reserve(&mut self) -> Result<()> {
        let ops = self.gen_ops();
        let mut inner = ReservationSlot::new();
        let mut tree = self.tree.lock();
        let before = tree.control().reserved_nodes;
        if let Err(err) = self
            .reserve
            .reserve_space(&mut *tree, self.cx, ops, Some(&mut inner))
        {
            drop(tree);
            return self.refused(err);
        }
        ensure!(!inner.is_active(), "nested reservation was recorded");
        ensure!(
            tree.control().reserved_nodes == before,
            "nested reservation changed reserved nodes"
        );
        self.report.nested += 1;
        self.check(&tree)
    }

    // take up to `node_count` nodes from the tree in small steps, releasing the lock in between.
    fn consume(&mut self, node_count: u64) -> Result<u64> {
        let target = self.rng.gen_range(0..=node_count);
        let mut consumed = 0;
        while consumed < target {
            let step = self.rng.gen_range(1..=(target - consumed).min(8));
            {
                let mut tree = self.tree.lock();
                tree.allocate(step)?;
                self.reserve.update_reserve(tree.id(), self.cx, step);
                consumed += step;

                let control = *tree.control();
                let available = self.reserve.available_nodes(&*tree, self.cx);
                let expected = control.free_nodes as i64 - control.reserved_nodes as i64
                    + (node_count - consumed) as i64;
                ensure!(
                    available == expected,
                    "available nodes {} after consuming {} of {}, expected {}",
                    available,
                    consumed,
                    node_count,
                    expected,
                );
                self.check(&tree)?;
            }
            std::thread::yield_now();
        }
        self.report.consumed += consumed;
        Ok(consumed)
    }

    fn refused(&mut self, err: anyhow::Error) -> Result<()> {
        debug!(context = self.cx.as_u64(), "reservation refused: {:#}", err);
        self.report.refused += 1;

        // make room the way a workload of deletes would.
        if self.retained > 0 {
            let n = self.rng.gen_range(1..=self.retained);
            self.free_retained(n);
        }

        let tree = self.tree.lock();
        self.check(&tree)
    }

    fn free_retained(&mut self, n: u64) {
        if n == 0 {
            return;
        }
        self.tree.lock().deallocate(n);
        self.retained -= n;
    }

    fn check(&self, tree: &MemTree) -> Result<()> {
        let audit = self.reserve.audit(tree.id());
        let control = tree.control();
        ensure!(
            control.reserved_nodes == audit.reserved,
            "tree reserves {} nodes, ledger holds {}",
            control.reserved_nodes,
            audit.reserved,
        );
        ensure!(
            control.free_nodes >= audit.outstanding,
            "{} free nodes cannot cover {} nodes still owed to reservations",
            control.free_nodes,
            audit.outstanding,
        );
        Ok(())
    }
}
