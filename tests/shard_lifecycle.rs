//! Shard rolling and reader pruning behavior.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::json;

use galena::config::Config;
use galena::core::Registry;

fn registry_with_shard_limit(shard_max_size: u64) -> (tempfile::TempDir, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_path: dir.path().to_path_buf(),
        shard_max_size,
        ..Config::default()
    };
    (dir, Registry::open(config).unwrap())
}

#[test]
fn shard_ids_stay_contiguous_across_rolls() {
    // Every committed write exceeds the one-byte limit and rolls.
    let (_dir, registry) = registry_with_shard_limit(1);
    let index = registry.get_or_create("logs").unwrap();

    for i in 0..4 {
        index
            .write_document(&format!("doc{i}"), &json!({"n": i}))
            .unwrap();
    }

    let descriptor = index.descriptor();
    let ids: Vec<u64> = descriptor.shards.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(index.latest_shard_id(), 4);
}

#[test]
fn crossing_the_size_threshold_creates_exactly_one_shard() {
    let (_dir, registry) = registry_with_shard_limit(8 * 1024);
    let index = registry.get_or_create("logs").unwrap();

    // Fill until the active shard exceeds the limit.
    let mut writes = 0;
    while index.shard_count() == 1 {
        index
            .write_document(
                &format!("doc{writes}"),
                &json!({"body": "some moderately long log line for sizing purposes"}),
            )
            .unwrap();
        writes += 1;
        assert!(writes < 10_000, "shard never rolled");
    }

    assert_eq!(index.shard_count(), 2);
}

#[test]
fn retired_shard_bounds_are_frozen() {
    let (_dir, registry) = registry_with_shard_limit(1);
    let index = registry.get_or_create("logs").unwrap();

    index
        .write_document("1", &json!({"@timestamp": "2022-06-19T10:00:00Z", "n": 1}))
        .unwrap();
    let frozen = index.descriptor().shards[0];
    assert!(frozen.doc_time_min > 0);
    assert!(frozen.doc_time_min <= frozen.doc_time_max);

    // Later writes land in newer shards and never touch the frozen bounds.
    index
        .write_document("2", &json!({"@timestamp": "2023-06-19T10:00:00Z", "n": 2}))
        .unwrap();
    let after = index.descriptor().shards[0];
    assert_eq!(after.doc_time_min, frozen.doc_time_min);
    assert_eq!(after.doc_time_max, frozen.doc_time_max);
}

#[test]
fn disjoint_time_window_opens_no_retired_readers() {
    let (_dir, registry) = registry_with_shard_limit(1);
    let index = registry.get_or_create("logs").unwrap();

    index
        .write_document("1", &json!({"@timestamp": "2022-06-19T10:00:00Z", "n": 1}))
        .unwrap();
    index
        .write_document("2", &json!({"@timestamp": "2022-06-19T11:00:00Z", "n": 2}))
        .unwrap();

    // A window far after every frozen shard: only the empty active shard
    // remains eligible.
    let readers = index
        .get_readers(4_102_444_800_000, 4_102_448_400_000)
        .unwrap();
    assert_eq!(readers.len(), 1);
    assert_eq!(readers[0].doc_count(), 0);
}

#[test]
fn search_spans_all_shards() {
    let (_dir, registry) = registry_with_shard_limit(1);
    let index = registry.get_or_create("logs").unwrap();

    for i in 0..3 {
        index
            .write_document(&format!("doc{i}"), &json!({"City": "Turin", "n": i}))
            .unwrap();
    }
    assert!(index.shard_count() > 1);

    let out = index
        .search(
            &json!({"query": {"term": {"City": "turin"}}, "size": 10}),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
    assert_eq!(out.total, 3);
}

#[test]
fn registry_reload_preserves_shard_layout() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_path: dir.path().to_path_buf(),
        shard_max_size: 1,
        ..Config::default()
    };

    {
        let registry = Registry::open(config.clone()).unwrap();
        let index = registry.get_or_create("logs").unwrap();
        index.write_document("1", &json!({"n": 1})).unwrap();
        index.write_document("2", &json!({"n": 2})).unwrap();
        registry.close_all().unwrap();
    }

    let registry = Registry::open(config).unwrap();
    let index = registry.get("logs").unwrap();
    assert_eq!(index.shard_count(), 3);
    assert_eq!(index.doc_count().unwrap(), 2);
}
