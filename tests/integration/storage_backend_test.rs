// tests/integration/storage_backend_test.rs

//! Tests that exercise the list engine against each storage backend and the
//! backend-specific behaviour it relies on.

use super::test_helpers::{TestContext, assert_lrange_equals, to_bytes};
use bytes::Bytes;
use spinelkv::Db;
use spinelkv::config::Config;
use spinelkv::core::database::DEFAULT_LOCK_STRIPES;
use spinelkv::core::storage::{SledOptions, SledStorage};
use std::sync::Arc;

#[test]
fn test_list_scenario_on_all_backends() {
    for (name, ctx) in TestContext::all_backends() {
        assert_eq!(ctx.rpush("K", &["x", "y", "z"]).unwrap(), 3, "{name}");
        assert_lrange_equals(&ctx, "K", &["x", "y", "z"], name);

        assert_eq!(ctx.db.lpop(b"K").unwrap(), Bytes::from("x"), "{name}");
        assert_eq!(ctx.llen("K"), 2, "{name}");

        ctx.db.lset(b"K", 0, Bytes::from("Y2")).unwrap();
        assert_lrange_equals(&ctx, "K", &["Y2", "z"], name);

        ctx.db.ltrim(b"K", -1, -1).unwrap();
        assert_lrange_equals(&ctx, "K", &["z"], name);
        assert_eq!(ctx.llen("K"), 1, "{name}");
        assert_eq!(ctx.element_records(), 1, "{name}");
    }
}

#[test]
fn test_move_and_edit_on_all_backends() {
    for (name, ctx) in TestContext::all_backends() {
        ctx.rpush("src", &["a", "b", "a", "c"]).unwrap();
        ctx.db.rpoplpush(b"src", b"dst").unwrap();
        assert_eq!(ctx.db.lrem(b"src", 0, b"a").unwrap(), 2, "{name}");
        assert_eq!(
            ctx.db.linsert(b"dst", b"c", Bytes::from("d"), false).unwrap(),
            2,
            "{name}"
        );
        assert_lrange_equals(&ctx, "src", &["b"], name);
        assert_lrange_equals(&ctx, "dst", &["c", "d"], name);
    }
}

#[test]
fn test_sled_lists_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let options = SledOptions {
        flush_every_ms: None,
        ..SledOptions::default()
    };

    {
        let storage = Arc::new(SledStorage::open(dir.path(), options).unwrap());
        let db = Db::new(storage, DEFAULT_LOCK_STRIPES);
        db.rpush(b"persisted", &to_bytes(&["one", "two", "three"]))
            .unwrap();
        db.lpop(b"persisted").unwrap();
        db.flush().unwrap();
    }

    let storage = Arc::new(SledStorage::open(dir.path(), options).unwrap());
    let db = Db::new(storage, DEFAULT_LOCK_STRIPES);
    assert_eq!(db.llen(b"persisted").unwrap(), 2);
    assert_eq!(
        db.lrange(b"persisted", 0, -1).unwrap(),
        to_bytes(&["two", "three"])
    );
    assert!(db.lverify(b"persisted").unwrap().unwrap().is_consistent());
}

#[test]
fn test_db_open_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let toml = format!(
        "[storage]\nbackend = \"sled\"\npath = {:?}\nflush_every_ms = 0\nlock_stripes = 4\n",
        dir.path().join("db").display().to_string()
    );
    let config = Config::from_toml_str(&toml).unwrap();
    let db = Db::open(&config).unwrap();
    assert_eq!(db.rpush(b"k", &to_bytes(&["v"])).unwrap(), 1);
    assert_eq!(db.lindex(b"k", 0).unwrap(), Some(Bytes::from("v")));

    let db = Db::open(&Config::default()).unwrap();
    assert_eq!(db.llen(b"k").unwrap(), 0);
}

#[test]
fn test_range_scan_does_not_fill_read_cache() {
    let ctx = TestContext::new();
    let values: Vec<String> = (0..100).map(|i| format!("v{i}")).collect();
    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
    ctx.rpush("big", &refs).unwrap();

    let before = ctx.memory().cache_stats();
    assert_eq!(ctx.lrange("big", 0, -1).len(), 100);
    assert_eq!(ctx.db.lpos(b"big", b"v99").unwrap(), Some(99));
    let after = ctx.memory().cache_stats();
    // Only the metadata record may be cached by the scans.
    assert!(after.entries <= 1, "range scans filled the cache: {after:?}");
    assert!(after.fills - before.fills <= 1);

    ctx.db.lindex(b"big", 50).unwrap();
    assert!(ctx.memory().cache_stats().entries >= 1);
}

#[test]
fn test_point_reads_see_writes_through_cache() {
    let ctx = TestContext::new();
    ctx.rpush("k", &["a", "b"]).unwrap();
    assert_eq!(ctx.db.lindex(b"k", 0).unwrap(), Some(Bytes::from("a")));
    assert_eq!(ctx.db.lindex(b"k", 0).unwrap(), Some(Bytes::from("a")));
    assert!(ctx.memory().cache_stats().hits >= 1);

    ctx.db.lset(b"k", 0, Bytes::from("A")).unwrap();
    assert_eq!(ctx.db.lindex(b"k", 0).unwrap(), Some(Bytes::from("A")));

    ctx.db.lpop(b"k").unwrap();
    assert_eq!(ctx.db.lindex(b"k", 0).unwrap(), Some(Bytes::from("b")));
}

#[test]
fn test_cacheless_memory_backend() {
    let ctx = TestContext::with_cache_capacity(0);
    ctx.rpush("k", &["a"]).unwrap();
    assert_eq!(ctx.db.lindex(b"k", 0).unwrap(), Some(Bytes::from("a")));
    assert_eq!(ctx.memory().cache_stats().entries, 0);
}
