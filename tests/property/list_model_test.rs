// tests/property/list_model_test.rs

//! Property-based tests comparing the list engine against an in-memory model.
//! After every operation the stored lists must match the model and their
//! metadata window must match the element records on disk.

use crate::test_helpers::{TestContext, to_bytes};
use bytes::Bytes;
use proptest::prelude::*;
use spinelkv::Side;
use spinelkv::core::SpinelKvError;
use std::collections::{HashMap, VecDeque};

const KEYS: [&str; 2] = ["a", "b"];

#[derive(Debug, Clone)]
enum Op {
    Push { key: usize, side: Side, values: Vec<String> },
    Pop { key: usize, side: Side },
    Set { key: usize, index: i64, value: String },
    Trim { key: usize, start: i64, stop: i64 },
    Move { src: usize, dst: usize },
    Rem { key: usize, count: i64, value: String },
    Insert { key: usize, pivot: String, value: String, before: bool },
    Del { key: usize },
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Left), Just(Side::Right)]
}

// A tiny alphabet so removals, pivots and equal-value sets actually hit.
fn value() -> impl Strategy<Value = String> {
    "[xyz]"
}

fn op() -> impl Strategy<Value = Op> {
    let key = 0..KEYS.len();
    prop_oneof![
        3 => (key.clone(), side(), prop::collection::vec(value(), 0..4))
            .prop_map(|(key, side, values)| Op::Push { key, side, values }),
        2 => (key.clone(), side()).prop_map(|(key, side)| Op::Pop { key, side }),
        1 => (key.clone(), -6i64..6, value())
            .prop_map(|(key, index, value)| Op::Set { key, index, value }),
        1 => (key.clone(), -8i64..8, -8i64..8)
            .prop_map(|(key, start, stop)| Op::Trim { key, start, stop }),
        1 => (key.clone(), key.clone()).prop_map(|(src, dst)| Op::Move { src, dst }),
        1 => (key.clone(), -3i64..3, value())
            .prop_map(|(key, count, value)| Op::Rem { key, count, value }),
        1 => (key.clone(), value(), value(), any::<bool>())
            .prop_map(|(key, pivot, value, before)| Op::Insert { key, pivot, value, before }),
        1 => key.prop_map(|key| Op::Del { key }),
    ]
}

fn model_range(list: &VecDeque<String>, start: i64, stop: i64) -> Vec<String> {
    let size = list.len() as i64;
    let start = if start < 0 { start + size } else { start };
    let stop = if stop < 0 { stop + size } else { stop };
    if start < 0 || stop < 0 || start > stop || start >= size {
        return Vec::new();
    }
    let stop = stop.min(size - 1);
    list.range(start as usize..=stop as usize).cloned().collect()
}

fn model_trim(list: &mut VecDeque<String>, start: i64, stop: i64) {
    let size = list.len() as i64;
    let start = if start < 0 { start + size } else { start };
    let stop = if stop < 0 {
        if size > -stop { size + stop } else { size }
    } else {
        stop
    };
    let stop = stop.min(size - 1);
    if start < 0 || start > stop {
        list.clear();
        return;
    }
    *list = list.range(start as usize..=stop as usize).cloned().collect();
}

fn apply(ctx: &TestContext, model: &mut HashMap<usize, VecDeque<String>>, op: &Op) {
    match op {
        Op::Push { key, side, values } => {
            let list = model.entry(*key).or_default();
            for v in values {
                match side {
                    Side::Left => list.push_front(v.clone()),
                    Side::Right => list.push_back(v.clone()),
                }
            }
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let len = ctx
                .db
                .push(KEYS[*key].as_bytes(), &to_bytes(&refs), *side, true)
                .unwrap();
            assert_eq!(len, list.len() as u64);
        }
        Op::Pop { key, side } => {
            let list = model.entry(*key).or_default();
            let expected = match side {
                Side::Left => list.pop_front(),
                Side::Right => list.pop_back(),
            };
            match (ctx.db.pop(KEYS[*key].as_bytes(), *side), expected) {
                (Ok(got), Some(want)) => assert_eq!(got, Bytes::from(want)),
                (Err(SpinelKvError::KeyNotFound), None) => {}
                (got, want) => panic!("pop mismatch: {got:?} vs {want:?}"),
            }
        }
        Op::Set { key, index, value } => {
            let list = model.entry(*key).or_default();
            let size = list.len() as i64;
            let pos = if *index < 0 { index + size } else { *index };
            let result = ctx
                .db
                .lset(KEYS[*key].as_bytes(), *index, Bytes::from(value.clone()));
            if list.is_empty() {
                assert_eq!(result.unwrap_err(), SpinelKvError::KeyNotFound);
            } else if (0..size).contains(&pos) {
                result.unwrap();
                list[pos as usize] = value.clone();
            } else {
                assert!(matches!(result, Err(SpinelKvError::InvalidArgument(_))));
            }
        }
        Op::Trim { key, start, stop } => {
            let list = model.entry(*key).or_default();
            if !list.is_empty() {
                model_trim(list, *start, *stop);
            }
            ctx.db
                .ltrim(KEYS[*key].as_bytes(), *start, *stop)
                .unwrap();
        }
        Op::Move { src, dst } => {
            let result = ctx
                .db
                .rpoplpush(KEYS[*src].as_bytes(), KEYS[*dst].as_bytes());
            let popped = model.entry(*src).or_default().pop_back();
            match popped {
                Some(v) => {
                    assert_eq!(result.unwrap(), Bytes::from(v.clone()));
                    model.entry(*dst).or_default().push_front(v);
                }
                None => assert_eq!(result.unwrap_err(), SpinelKvError::KeyNotFound),
            }
        }
        Op::Rem { key, count, value } => {
            let list = model.entry(*key).or_default();
            let limit = if *count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
            let mut removed = 0;
            let mut keep: Vec<bool> = vec![true; list.len()];
            let positions: Vec<usize> = if *count >= 0 {
                (0..list.len()).collect()
            } else {
                (0..list.len()).rev().collect()
            };
            for pos in positions {
                if removed < limit && list[pos] == *value {
                    keep[pos] = false;
                    removed += 1;
                }
            }
            *list = list
                .iter()
                .zip(keep)
                .filter_map(|(v, k)| k.then(|| v.clone()))
                .collect();
            let got = ctx
                .db
                .lrem(KEYS[*key].as_bytes(), *count, value.as_bytes())
                .unwrap();
            assert_eq!(got, removed as u64);
        }
        Op::Insert { key, pivot, value, before } => {
            let list = model.entry(*key).or_default();
            let expected = if list.is_empty() {
                0
            } else if let Some(p) = list.iter().position(|v| v == pivot) {
                list.insert(if *before { p } else { p + 1 }, value.clone());
                list.len() as i64
            } else {
                -1
            };
            let got = ctx
                .db
                .linsert(
                    KEYS[*key].as_bytes(),
                    pivot.as_bytes(),
                    Bytes::from(value.clone()),
                    *before,
                )
                .unwrap();
            assert_eq!(got, expected);
        }
        Op::Del { key } => {
            let list = model.entry(*key).or_default();
            let existed = !list.is_empty();
            list.clear();
            assert_eq!(ctx.db.del(KEYS[*key].as_bytes()).unwrap(), existed);
        }
    }
}

fn check_against_model(ctx: &TestContext, model: &HashMap<usize, VecDeque<String>>) {
    for (i, key) in KEYS.iter().enumerate() {
        let expected: Vec<String> = model
            .get(&i)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default();
        assert_eq!(ctx.lrange(key, 0, -1), expected, "contents of '{key}'");
        assert_eq!(ctx.llen(key), expected.len() as u64);
        // An empty list never leaves a metadata record behind.
        assert_eq!(ctx.db.exists(key.as_bytes()).unwrap(), !expected.is_empty());
        ctx.assert_consistent(key);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_operations_match_model(ops in prop::collection::vec(op(), 1..40)) {
        let ctx = TestContext::new();
        let mut model: HashMap<usize, VecDeque<String>> = HashMap::new();
        for op in &ops {
            apply(&ctx, &mut model, op);
            check_against_model(&ctx, &model);
        }
    }

    #[test]
    fn test_index_matches_range(
        values in prop::collection::vec("[a-z]{0,4}", 0..20),
        index in -25i64..25,
    ) {
        let ctx = TestContext::new();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        ctx.rpush("k", &refs).unwrap();

        let single = ctx.lrange("k", index, index);
        let got = ctx.db.lindex(b"k", index).unwrap();
        match got {
            Some(v) => prop_assert_eq!(single, vec![String::from_utf8_lossy(&v).into_owned()]),
            None => prop_assert!(single.is_empty()),
        }
    }

    #[test]
    fn test_range_matches_model(
        values in prop::collection::vec("[a-z]{1,3}", 0..20),
        start in -25i64..25,
        stop in -25i64..25,
    ) {
        let ctx = TestContext::new();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        ctx.rpush("k", &refs).unwrap();
        let model: VecDeque<String> = values.iter().cloned().collect();
        prop_assert_eq!(ctx.lrange("k", start, stop), model_range(&model, start, stop));
    }

    #[test]
    fn test_trim_size_and_records(
        len in 1usize..20,
        start in -25i64..25,
        stop in -25i64..25,
    ) {
        let ctx = TestContext::new();
        let values: Vec<String> = (0..len).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        ctx.rpush("k", &refs).unwrap();

        let mut model: VecDeque<String> = values.iter().cloned().collect();
        model_trim(&mut model, start, stop);
        ctx.db.ltrim(b"k", start, stop).unwrap();

        prop_assert_eq!(ctx.llen("k"), model.len() as u64);
        prop_assert_eq!(ctx.lrange("k", 0, -1), model.iter().cloned().collect::<Vec<_>>());
        if !model.is_empty() {
            // Trimmed-away records are gone, not just hidden behind the window.
            prop_assert_eq!(ctx.element_records(), model.len());
        }
        ctx.assert_consistent("k");
    }
}
