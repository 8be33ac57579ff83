//! Runs the workers against a shared tree and judges the outcome.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use crossbeam_channel::Sender;
use node_reserve::{MemTree, NodeReserve, NodeTree, Options, TreeId};
use parking_lot::Mutex;
use threadpool::ThreadPool;
use tracing::{error, info};

use crate::cli::Cli;
use crate::panic::panic_to_string;
use crate::workload::{Worker, WorkerReport, WorkloadConfig};

const TREE_ID: TreeId = TreeId(1);

pub struct Outcome {
    pub report: WorkerReport,
    pub failures: usize,
}

impl Outcome {
    pub fn failed(&self) -> bool {
        self.failures > 0
    }
}

pub fn run(cli: Cli) -> Result<Outcome> {
    let seed = cli.seed.unwrap_or_else(rand::random);
    info!(seed, workers = cli.workers, "starting torture run");

    let tree = MemTree::new(TREE_ID, cli.depth, cli.initial_nodes).with_capacity(cli.capacity);
    let tree = Arc::new(Mutex::new(tree));

    anyhow::ensure!(cli.buckets > 0, "the ledger needs at least one bucket");
    let mut o = Options::new();
    o.buckets(cli.buckets);
    o.metrics(cli.metrics);
    let reserve = NodeReserve::setup(o);

    let config = WorkloadConfig::new(&cli);
    let worker_tp = ThreadPool::with_name("torture-worker".to_string(), cli.workers.max(1));
    let (output_tx, output_rx) = crossbeam_channel::unbounded();

    for worker_id in 0..cli.workers {
        spawn_worker(
            &worker_tp,
            worker_id,
            seed.wrapping_add(worker_id as u64),
            config.clone(),
            tree.clone(),
            reserve.clone(),
            output_tx.clone(),
        );
    }
    drop(output_tx);

    let mut outcome = Outcome {
        report: WorkerReport::default(),
        failures: 0,
    };
    for output in output_rx.iter() {
        match output {
            Ok(report) => outcome.report.merge(&report),
            Err(err) => {
                error!("{:#}", err);
                outcome.failures += 1;
            }
        }
    }
    worker_tp.join();

    if let Err(err) = check_quiescent(&tree.lock(), &reserve) {
        error!("{:#}", err);
        outcome.failures += 1;
    }

    let tree = tree.lock();
    info!(
        admitted = outcome.report.admitted,
        unrecorded = outcome.report.unrecorded,
        nested = outcome.report.nested,
        refused = outcome.report.refused,
        consumed = outcome.report.consumed,
        total_nodes = tree.control().total_nodes,
        extends = tree.extend_requests().len(),
        "run finished"
    );
    if cli.metrics {
        reserve.metrics().print();
    }

    if outcome.failed() {
        error!(seed, failures = outcome.failures, "run failed");
    }
    Ok(outcome)
}

fn spawn_worker(
    worker_tp: &ThreadPool,
    worker_id: usize,
    seed: u64,
    config: WorkloadConfig,
    tree: Arc<Mutex<MemTree>>,
    reserve: NodeReserve,
    output_tx: Sender<Result<WorkerReport>>,
) {
    worker_tp.execute(move || {
        let _span = tracing::info_span!("worker", id = worker_id).entered();
        let output_or_panic = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Worker::new(seed, config, tree, reserve).run()
        }));
        let output = output_or_panic
            .unwrap_or_else(|e| Err(anyhow::anyhow!(panic_to_string("panic in worker", e))))
            .with_context(|| format!("worker {} erred out", worker_id));
        let _ = output_tx.send(output);
    });
}

// with every worker gone, no reservation may be left behind.
fn check_quiescent(tree: &MemTree, reserve: &NodeReserve) -> Result<()> {
    let audit = reserve.audit(tree.id());
    anyhow::ensure!(
        audit.active == 0 && reserve.active_reservations() == 0,
        "{} reservations outlived their workers",
        reserve.active_reservations(),
    );
    anyhow::ensure!(
        tree.control().reserved_nodes == 0,
        "{} nodes still reserved after all workers finished",
        tree.control().reserved_nodes,
    );
    Ok(())
}
