#![cfg(feature = "benchmarks")]

use crate::{
    ledger::{Ledger, ReservationKey, ReservationSlot},
    ContextId, MemTree, NodeReserve, NodeTree, Operations, Options, TreeId,
};
use criterion::{BenchmarkId, Criterion};
use std::num::NonZeroU64;

pub fn node_reserve_benchmark(c: &mut Criterion) {
    ledger_benchmark(c);
    reserve_release_benchmark(c);
}

fn cx(raw: u64) -> ContextId {
    // UNWRAP: callers start counting at 1.
    ContextId::from_raw(NonZeroU64::new(raw).unwrap())
}

// insert and delete one key while `active` other reservations sit in the ledger.
fn ledger_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_insert_delete");

    for active in [0u64, 16, 256, 4096] {
        let ledger = Ledger::new(17);
        let mut held: Vec<_> = (0..active).map(|_| ReservationSlot::new()).collect();
        for (i, slot) in held.iter_mut().enumerate() {
            ledger.insert(ReservationKey::new(TreeId(1), cx(i as u64 + 2)), slot, 8);
        }

        let key = ReservationKey::new(TreeId(1), cx(1));
        let mut slot = ReservationSlot::new();
        group.bench_function(BenchmarkId::from_parameter(active), |b| {
            b.iter(|| {
                ledger.insert(key, &mut slot, 8);
                ledger.lookup(key);
                ledger.delete(key, &mut slot)
            })
        });

        for (i, slot) in held.iter_mut().enumerate() {
            ledger.delete(ReservationKey::new(TreeId(1), cx(i as u64 + 2)), slot);
        }
    }

    group.finish();
}

fn reserve_release_benchmark(c: &mut Criterion) {
    let reserve = NodeReserve::setup(Options::new());
    let mut tree = MemTree::new(TreeId(1), 4, 100_000);
    let mut slot = ReservationSlot::new();

    c.bench_function("reserve_release", |b| {
        b.iter(|| {
            // UNWRAP: the tree has plenty of free nodes, no growth happens.
            reserve
                .reserve_space(&mut tree, cx(1), Operations::new(4, 4), Some(&mut slot))
                .unwrap();
            reserve.release_reserve(&mut tree, cx(1), &mut slot);
            tree.control().reserved_nodes
        })
    });
}
