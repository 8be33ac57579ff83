//! The reservation ledger: which execution context holds how many nodes of which tree.
//!
//! The ledger is a fixed array of buckets, each a chain of active reservation records, behind a
//! single lock. Callers never see records directly. They hold a [`ReservationSlot`], which
//! remembers the key it is active under so that release can find and retire the record.

#[cfg(loom)]
mod loom_tests;

#[cfg(loom)]
use loom::sync::Mutex;

#[cfg(not(loom))]
use parking_lot::Mutex;

use std::ops::DerefMut;

use tracing::warn;

use crate::{context::ContextId, tree::TreeId};

/// The key under which a reservation is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationKey {
    pub tree: TreeId,
    pub context: ContextId,
}

impl ReservationKey {
    pub fn new(tree: TreeId, context: ContextId) -> Self {
        ReservationKey { tree, context }
    }
}

/// Caller-owned handle to a reservation.
///
/// A fresh slot is unused. It becomes active when a reservation is admitted into it and unused
/// again once the reservation is released. A slot is active under at most one key at a time.
///
/// Dropping an active slot does not release the reservation: the nodes stay reserved for good.
#[derive(Debug, Default)]
pub struct ReservationSlot {
    active: Option<ReservationKey>,
}

impl ReservationSlot {
    pub fn new() -> Self {
        ReservationSlot::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The key the slot is active under, if any.
    pub fn key(&self) -> Option<ReservationKey> {
        self.active
    }
}

impl Drop for ReservationSlot {
    fn drop(&mut self) {
        if let Some(key) = self.active {
            warn!(
                tree = key.tree.0,
                context = key.context.as_u64(),
                "reservation slot dropped while active, its nodes remain reserved"
            );
        }
    }
}

/// The result of recording a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// A new record was linked and the slot is now active.
    Inserted,
    /// The key already had an active record. Nothing changed.
    AlreadyActive,
}

/// A summary of the active reservations against one tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct LedgerAudit {
    /// The number of active records.
    pub active: usize,
    /// The sum of admitted amounts.
    pub reserved: u64,
    /// The sum of admitted amounts not consumed yet.
    pub outstanding: u64,
}

#[derive(Debug)]
struct Record {
    key: ReservationKey,
    /// Nodes admitted.
    node_count: u64,
    /// Nodes consumed so far.
    new_nodes: u64,
}

impl Record {
    fn remaining(&self) -> u64 {
        self.node_count.saturating_sub(self.new_nodes)
    }
}

struct Buckets {
    chains: Vec<Vec<Record>>,
    active: usize,
}

pub(crate) struct Ledger {
    buckets: Mutex<Buckets>,
    num_buckets: usize,
}

impl Ledger {
    /// Create an empty ledger. `num_buckets` must be non-zero.
    pub fn new(num_buckets: usize) -> Self {
        assert!(num_buckets > 0, "the reservation ledger needs at least one bucket");
        Ledger {
            buckets: Mutex::new(Buckets {
                chains: (0..num_buckets).map(|_| Vec::new()).collect(),
                active: 0,
            }),
            num_buckets,
        }
    }

    /// Record a reservation of `node_count` nodes under `key`, activating `slot`.
    ///
    /// If `key` already holds an active reservation the ledger and `slot` are left untouched.
    ///
    /// Panics if `slot` is active under a different key.
    pub fn insert(
        &self,
        key: ReservationKey,
        slot: &mut ReservationSlot,
        node_count: u64,
    ) -> Insertion {
        let mut buckets = self.lock();
        let bucket = self.bucket_index(&key);

        if buckets.chains[bucket].iter().any(|r| r.key == key) {
            return Insertion::AlreadyActive;
        }

        if let Some(held) = slot.active {
            panic!(
                "reservation slot reused for {:?} while still active under {:?}",
                key, held
            );
        }

        buckets.chains[bucket].push(Record {
            key,
            node_count,
            new_nodes: 0,
        });
        buckets.active += 1;
        slot.active = Some(key);

        Insertion::Inserted
    }

    /// Retire the reservation held in `slot`, returning the number of nodes it had admitted.
    ///
    /// Returns 0 if the slot is not active.
    ///
    /// Panics if the slot is active under a key other than `key`, or is active but has no record.
    /// Either means the slot has been corrupted or used with another ledger.
    pub fn delete(&self, key: ReservationKey, slot: &mut ReservationSlot) -> u64 {
        let mut buckets = self.lock();

        let Some(held) = slot.active else {
            return 0;
        };

        if held != key {
            panic!(
                "reservation slot presented for {:?} is active under {:?}",
                key, held
            );
        }

        let bucket = self.bucket_index(&key);
        let chain = &mut buckets.chains[bucket];
        let Some(pos) = chain.iter().position(|r| r.key == key) else {
            panic!("reservation slot for {:?} has no record in the ledger", key);
        };

        let record = chain.swap_remove(pos);
        buckets.active -= 1;
        slot.active = None;

        record.node_count
    }

    /// The admitted nodes of `key` not consumed yet, or 0 if `key` has no active reservation.
    pub fn lookup(&self, key: ReservationKey) -> u64 {
        let buckets = self.lock();
        buckets.chains[self.bucket_index(&key)]
            .iter()
            .find(|r| r.key == key)
            .map_or(0, Record::remaining)
    }

    /// Account `delta` consumed nodes against the reservation of `key`. Does nothing if `key` has
    /// no active reservation.
    pub fn update(&self, key: ReservationKey, delta: u64) {
        let mut buckets = self.lock();
        let bucket = self.bucket_index(&key);
        if let Some(record) = buckets.chains[bucket].iter_mut().find(|r| r.key == key) {
            record.new_nodes = record.new_nodes.saturating_add(delta);
        }
    }

    /// Sum up the active reservations of one tree. Scans every bucket.
    pub fn audit(&self, tree: TreeId) -> LedgerAudit {
        let buckets = self.lock();
        buckets
            .chains
            .iter()
            .flatten()
            .filter(|r| r.key.tree == tree)
            .fold(LedgerAudit::default(), |mut audit, r| {
                audit.active += 1;
                audit.reserved += r.node_count;
                audit.outstanding += r.remaining();
                audit
            })
    }

    /// The number of active reservations across all trees.
    pub fn len(&self) -> usize {
        self.lock().active
    }

    fn bucket_index(&self, key: &ReservationKey) -> usize {
        (fxhash::hash64(key) % self.num_buckets as u64) as usize
    }

    #[cfg(not(loom))]
    fn lock(&self) -> impl DerefMut<Target = Buckets> + '_ {
        self.buckets.lock()
    }

    #[cfg(loom)]
    fn lock(&self) -> impl DerefMut<Target = Buckets> + '_ {
        // UNWRAP: poisoning only follows a panic inside the critical section, which loom reports.
        self.buckets.lock().unwrap()
    }
}
