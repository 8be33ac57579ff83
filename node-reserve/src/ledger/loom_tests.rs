use super::*;
use loom::sync::Arc;
use std::num::NonZeroU64;

fn key(tree: u32, context: u64) -> ReservationKey {
    ReservationKey::new(
        TreeId(tree),
        ContextId::from_raw(NonZeroU64::new(context).unwrap()),
    )
}

#[test]
fn test_independent_contexts() {
    loom::model(|| {
        let ledger = Arc::new(Ledger::new(2));

        let handles: Vec<_> = (1..=2u64)
            .map(|context| {
                let ledger = Arc::clone(&ledger);
                loom::thread::spawn(move || {
                    let mut slot = ReservationSlot::new();
                    let k = key(1, context);
                    assert_eq!(ledger.insert(k, &mut slot, 4), Insertion::Inserted);
                    ledger.update(k, 1);
                    assert_eq!(ledger.lookup(k), 3);
                    assert_eq!(ledger.delete(k, &mut slot), 4);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 0);
    });
}

#[test]
fn test_racing_inserts_for_one_key() {
    loom::model(|| {
        let ledger = Arc::new(Ledger::new(1));

        let handles: Vec<_> = [5u64, 7]
            .into_iter()
            .map(|node_count| {
                let ledger = Arc::clone(&ledger);
                loom::thread::spawn(move || {
                    let mut slot = ReservationSlot::new();
                    let inserted = ledger.insert(key(1, 1), &mut slot, node_count);
                    (inserted, slot)
                })
            })
            .collect();

        let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results
            .iter()
            .filter(|(inserted, _)| *inserted == Insertion::Inserted)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(ledger.len(), 1);

        let mut released = 0;
        for (_, slot) in results.iter_mut() {
            released += ledger.delete(key(1, 1), slot);
        }
        assert!(released == 5 || released == 7);
        assert_eq!(ledger.len(), 0);
    });
}
