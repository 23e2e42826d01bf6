use bytesize::ByteSize;
use logcask::{Config, Error, WriteBatchOptions};
use rand::prelude::*;
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> logcask::Engine {
    Config::new(dir).open().unwrap()
}

#[test]
fn s1_put_get_delete_round_trip() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());

    engine.put("name", "trojan").unwrap();
    assert_eq!(engine.get(b"name").unwrap().as_ref(), b"trojan");

    engine.delete(b"name").unwrap();
    assert!(matches!(engine.get(b"name").unwrap_err(), Error::KeyNotFound));

    engine.close().unwrap();
}

#[test]
fn s2_overwrite_survives_reopen() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());

    engine.put("a", "1").unwrap();
    engine.put("a", "2").unwrap();
    engine.close().unwrap();

    let engine = open(dir.path());
    assert_eq!(engine.get(b"a").unwrap().as_ref(), b"2");
    assert_eq!(engine.stat().unwrap().key_num, 1);
    engine.close().unwrap();
}

#[test]
fn s3_batch_commit_visible_abandoned_batch_is_not() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put("x", "1").unwrap();
    batch.put("y", "2").unwrap();
    batch.commit().unwrap();

    assert_eq!(engine.get(b"x").unwrap().as_ref(), b"1");
    assert_eq!(engine.get(b"y").unwrap().as_ref(), b"2");

    // Buffered but never committed: must not become visible, even across
    // the batch's own drop.
    let abandoned = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    abandoned.put("x", "3").unwrap();
    abandoned.delete("y").unwrap();
    drop(abandoned);

    engine.close().unwrap();

    let engine = open(dir.path());
    assert_eq!(engine.get(b"x").unwrap().as_ref(), b"1");
    assert_eq!(engine.get(b"y").unwrap().as_ref(), b"2");
    engine.close().unwrap();
}

const S4_KEY_COUNT: usize = 10_000;
const S4_VALUE_SIZE: usize = 1024;

fn s4_kv_pairs() -> Vec<(String, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..S4_KEY_COUNT)
        .map(|i| {
            let value: Vec<u8> = (0..S4_VALUE_SIZE).map(|_| rng.gen()).collect();
            (format!("key-{i:06}"), value)
        })
        .collect()
}

#[test]
fn s4_many_keys_rotate_across_data_files() {
    let dir = tempdir().unwrap();
    let mut config = Config::new(dir.path());
    config.data_file_size(ByteSize::mib(1));
    let engine = config.open().unwrap();

    let pairs = s4_kv_pairs();
    for (key, value) in &pairs {
        engine.put(key.clone(), value.clone()).unwrap();
    }

    let stat = engine.stat().unwrap();
    assert!(
        stat.data_file_num >= 10,
        "expected at least 10 data files, got {}",
        stat.data_file_num
    );
    assert_eq!(stat.key_num, S4_KEY_COUNT);

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let (key, value) = &pairs[rng.gen_range(0..pairs.len())];
        assert_eq!(engine.get(key.as_bytes()).unwrap().as_ref(), value.as_slice());
    }

    engine.close().unwrap();
}

#[test]
fn s5_overwrite_then_merge_reclaims_space() {
    let dir = tempdir().unwrap();
    let mut config = Config::new(dir.path());
    config.data_file_size(ByteSize::mib(1));
    config.data_file_merge_ratio(0.3);
    let engine = config.open().unwrap();

    let pairs = s4_kv_pairs();
    for (key, value) in &pairs {
        engine.put(key.clone(), value.clone()).unwrap();
    }
    let overwritten: Vec<(String, Vec<u8>)> = {
        let mut rng = StdRng::seed_from_u64(99);
        pairs
            .iter()
            .map(|(k, v)| {
                let mut v2 = v.clone();
                rng.fill(v2.as_mut_slice());
                (k.clone(), v2)
            })
            .collect()
    };
    for (key, value) in &overwritten {
        engine.put(key.clone(), value.clone()).unwrap();
    }

    let before_merge = engine.stat().unwrap();
    let data_file_num_before_merge = before_merge.data_file_num;
    assert!(before_merge.reclaim_size > 0);
    // Every key was written twice; the first generation is entirely
    // reclaimable, so the superseded bytes should be in the same ballpark
    // as the live data currently on disk.
    let live_bytes = before_merge.disk_size.saturating_sub(before_merge.reclaim_size);
    assert!(before_merge.reclaim_size >= live_bytes / 2);

    engine.merge().unwrap();
    engine.close().unwrap();

    let engine = open(dir.path());
    let after = engine.stat().unwrap();
    assert_eq!(after.key_num, S4_KEY_COUNT);
    assert_eq!(after.reclaim_size, 0);
    assert!(after.data_file_num < data_file_num_before_merge);

    for (key, value) in &overwritten {
        assert_eq!(engine.get(key.as_bytes()).unwrap().as_ref(), value.as_slice());
    }

    engine.close().unwrap();
}

#[test]
fn s6_second_open_of_same_directory_fails() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());

    let err = Config::new(dir.path()).open().unwrap_err();
    assert!(matches!(err, Error::DatabaseInUse));

    engine.close().unwrap();
}
