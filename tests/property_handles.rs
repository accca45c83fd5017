//! Property-based handle table and cursor tests (proptest).

use duckdb::Connection;
use duckrpc::cursor::Cursor;
use duckrpc::HandleTable;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Op {
    Insert,
    Release(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Insert), (0u64..40).prop_map(Op::Release)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Keys strictly increase and a released key never resolves again.
    #[test]
    fn prop_keys_monotonic_and_never_reused(ops in prop::collection::vec(op_strategy(), 0..80)) {
        let mut table = HandleTable::new();
        let mut live = BTreeSet::new();
        let mut released = BTreeSet::new();
        let mut last: Option<u64> = None;

        for op in ops {
            match op {
                Op::Insert => {
                    let key = table.insert(());
                    if let Some(prev) = last {
                        prop_assert!(key > prev);
                    }
                    prop_assert!(!released.contains(&key));
                    last = Some(key);
                    live.insert(key);
                }
                Op::Release(key) => {
                    let was_live = live.remove(&key);
                    prop_assert_eq!(table.release(key).is_some(), was_live);
                    if was_live {
                        released.insert(key);
                    }
                }
            }
            for key in &released {
                prop_assert!(table.get(*key).is_none());
            }
            prop_assert_eq!(table.len(), live.len());
        }
        let keys: Vec<u64> = table.iter().map(|(k, _)| k).collect();
        prop_assert_eq!(keys, live.into_iter().collect::<Vec<_>>());
    }

    /// Fetching in arbitrary batch sizes yields every row exactly once, in
    /// order, and reports end-of-data only once rows run out.
    #[test]
    fn prop_cursor_batches_cover_all_rows(
        total in 0usize..60,
        sizes in prop::collection::vec(1usize..8, 1..40),
    ) {
        let conn = Connection::open_in_memory().unwrap();
        let sql = format!("SELECT * FROM range({total}) t(i)");
        let mut cursor = Cursor::open(0, conn, &sql, vec![]).unwrap();
        let mut seen = Vec::new();
        for size in sizes {
            let batch = cursor.fetch(size).unwrap();
            prop_assert!(batch.rows.len() <= size);
            prop_assert_eq!(batch.eof, batch.rows.len() < size);
            seen.extend(batch.rows.into_iter().map(|r| r[0].as_i64().unwrap()));
        }
        prop_assert_eq!(cursor.delivered(), seen.len());
        let expected: Vec<i64> = (0..total as i64).take(seen.len()).collect();
        prop_assert_eq!(seen, expected);
    }
}
