#![cfg(test)]

// Property tests for Table kept inside the crate so they can inspect the
// bucket chains directly.

use crate::locking::{Coarse, Fine, Locking};
use crate::table::Table;
use hashbrown::HashMap;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    AddOrUpdate(usize, u32),
    Contains(String),
    Get(usize),
    GetValue(usize),
    Len,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            (idx.clone(), any::<u32>()).prop_map(|(i, v)| OpI::AddOrUpdate(i, v)),
            prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            idx.clone().prop_map(OpI::Get),
            idx.clone().prop_map(OpI::GetValue),
            Just(OpI::Len),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Every stored key sits in the bucket it hashes to, and at most once overall.
fn check_placement<L: Locking>(t: &Table<L>) -> Result<usize, TestCaseError> {
    let mut seen: HashMap<Vec<u8>, usize> = HashMap::new();
    for index in 0..t.capacity() {
        let chain = t.buckets.acquire(index).unwrap();
        for entry in chain.iter() {
            prop_assert_eq!(t.bucket_of(entry.key()), index);
            let prev = seen.insert(entry.key().to_vec(), index);
            prop_assert!(prev.is_none(), "key stored twice");
        }
    }
    Ok(seen.len())
}

// State-machine equivalence against hashbrown::HashMap. Invariants exercised
// across random operation sequences:
// - add_or_update inserts new keys and overwrites existing ones in place.
// - contains/get parity with the model, including keys never inserted.
// - get_value is only called on present keys and returns the model value.
// - len parity, keys never duplicated across or within chains.
// - destroy releases exactly the number of live entries.
fn run_state_machine<L: Locking>(
    capacity: usize,
    pool: Vec<String>,
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let sut: Table<L> = Table::with_capacity(capacity);
    let mut model: HashMap<String, u32> = HashMap::new();

    for op in ops {
        match op {
            OpI::AddOrUpdate(i, v) => {
                let k = &pool[i];
                sut.add_or_update(k, v);
                model.insert(k.clone(), v);
            }
            OpI::Contains(s) => {
                prop_assert_eq!(sut.contains(&s), model.contains_key(&s));
            }
            OpI::Get(i) => {
                let k = &pool[i];
                prop_assert_eq!(sut.get(k), model.get(k).copied());
            }
            OpI::GetValue(i) => {
                let k = &pool[i];
                if let Some(&v) = model.get(k) {
                    prop_assert_eq!(sut.get_value(k), v);
                }
            }
            OpI::Len => {
                prop_assert_eq!(sut.len(), model.len());
            }
        }

        // Post-conditions after each op
        prop_assert_eq!(check_placement(&sut)?, model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }

    let report = sut.destroy();
    prop_assert_eq!(report.entries_released, model.len());
    prop_assert_eq!(report.poisoned_locks, 0);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_coarse((pool, ops) in arb_scenario(), capacity in 1usize..=16) {
        run_state_machine::<Coarse>(capacity, pool, ops)?;
    }

    #[test]
    fn prop_state_machine_fine((pool, ops) in arb_scenario(), capacity in 1usize..=16) {
        run_state_machine::<Fine>(capacity, pool, ops)?;
    }
}

// Collision variant: a single bucket puts every key in one chain, which
// stresses equality resolution during the linear scan.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_single_bucket((pool, ops) in arb_scenario()) {
        run_state_machine::<Fine>(1, pool.clone(), ops.clone())?;
        run_state_machine::<Coarse>(1, pool, ops)?;
    }
}
