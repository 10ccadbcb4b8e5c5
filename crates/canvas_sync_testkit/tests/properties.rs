//! Property tests over the transaction log and the server ledger.

use canvas_sync_protocol::{diff, CanvasState, TxId};
use canvas_sync_server::CanvasLedger;
use canvas_sync_testkit::prelude::*;
use proptest::prelude::*;

fn tx_ids(state: &CanvasState) -> Vec<TxId> {
    state.transactions.iter().map(|tx| tx.tx_id.clone()).collect()
}

/// Splits a log in two according to a selection mask.
fn split(state: &CanvasState, mask: &[bool]) -> (CanvasState, CanvasState) {
    let mut left = state.clone();
    let mut right = state.clone();
    left.transactions.clear();
    right.transactions.clear();
    for (tx, take_left) in state.transactions.iter().zip(mask.iter().copied()) {
        if take_left {
            left.transactions.push(tx.clone());
        } else {
            right.transactions.push(tx.clone());
        }
    }
    (left, right)
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn replay_is_deterministic(state in captured_state_strategy(8)) {
        let first = state.reconstruct();
        prop_assert_eq!(&first, &state.reconstruct());

        // A snapshot of the result replays to itself
        let collapsed = CanvasState::new("v2", first.clone(), at(100));
        prop_assert_eq!(diff(&collapsed.reconstruct(), &first), None);
    }

    #[test]
    fn merge_restores_split_logs(
        (state, mask) in captured_state_strategy(8)
            .prop_flat_map(|s| {
                let len = s.transactions.len();
                (Just(s), mask_strategy(len))
            })
    ) {
        let (left, right) = split(&state, &mask);
        let (merged, added) = left.merge_remote(&right.transactions);
        prop_assert_eq!(added, right.transactions.len());
        prop_assert_eq!(tx_ids(&merged), tx_ids(&state));

        let (again, added) = merged.merge_remote(&state.transactions);
        prop_assert_eq!(added, 0);
        prop_assert_eq!(again, merged);
    }

    #[test]
    fn undo_then_redo_restores_the_log(
        (state, k) in captured_state_strategy(8)
            .prop_flat_map(|s| {
                let len = s.transactions.len();
                (Just(s), 0..=len)
            })
    ) {
        let mut current = state.clone();
        for _ in 0..k {
            current = current.undo().unwrap();
        }
        for _ in 0..k {
            current = current.redo().unwrap();
        }
        prop_assert_eq!(current, state);
    }

    #[test]
    fn undo_hides_only_the_newest_change(state in captured_state_strategy(8)) {
        prop_assume!(!state.transactions.is_empty());
        let undone = state.undo().unwrap();

        let mut truncated = state.clone();
        truncated.transactions.pop();
        prop_assert_eq!(diff(&undone.reconstruct(), &truncated.reconstruct()), None);
    }

    #[test]
    fn captured_delta_applies_to_its_base(base in graph_strategy(), target in graph_strategy()) {
        match diff(&target, &base) {
            Some(delta) => {
                let applied = base.apply(&delta).unwrap();
                prop_assert_eq!(diff(&applied, &target), None);
            }
            None => prop_assert_eq!(diff(&base, &target), None),
        }
    }

    #[test]
    fn ledger_snapshot_preserves_the_graph(state in captured_state_strategy(8)) {
        let ledger = CanvasLedger::new();
        let consolidated = ledger.snapshot("c", &state, at(100)).unwrap();

        prop_assert_ne!(&consolidated.version, &state.version);
        prop_assert!(consolidated.transactions.is_empty());
        prop_assert_eq!(diff(&consolidated.reconstruct(), &state.reconstruct()), None);
        prop_assert_eq!(ledger.state("c"), Some(consolidated));
    }
}
