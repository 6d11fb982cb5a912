use std::sync::Arc;
use std::thread;

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::thread_rng;

use taigadb::common::types::Rid;
use taigadb::index::btree::BTreeIndex;

mod common;
use common::create_test_buffer_pool;

fn rid_for(key: i64) -> Rid {
    Rid::new((key / 100 + 2) as u32, (key % 100) as u32)
}

#[test]
fn test_empty_tree() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(32)?;
    let tree = BTreeIndex::<i64>::new("empty", buffer_pool, 4, 5)?;

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&1)?, None);
    assert_eq!(tree.iter()?.count(), 0);
    tree.remove(&1)?;
    Ok(())
}

#[test]
fn test_insert_and_point_lookup() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(64)?;
    let tree = BTreeIndex::<i64>::new("points", buffer_pool, 4, 5)?;

    for key in [5i64, 3, 8, 2, 7, 11, 1, 9] {
        assert!(tree.insert(key, rid_for(key))?);
    }
    for key in [5i64, 3, 8, 2, 7, 11, 1, 9] {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    assert_eq!(tree.get_value(&100)?, None);

    // Duplicate keys are rejected without changing the stored value.
    assert!(!tree.insert(5, Rid::new(99, 99))?);
    assert_eq!(tree.get_value(&5)?, Some(rid_for(5)));
    tree.verify_integrity()?;
    Ok(())
}

#[test]
fn test_random_insert_iterate_sorted() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(256)?;
    let tree = BTreeIndex::<i64>::new("random", buffer_pool, 4, 5)?;

    let mut keys: Vec<i64> = (0..1000).collect();
    keys.shuffle(&mut thread_rng());
    for &key in &keys {
        assert!(tree.insert(key, rid_for(key))?);
    }
    tree.verify_integrity()?;

    let collected: Vec<i64> = tree.iter()?.map(|(key, _)| key).collect();
    assert_eq!(collected.len(), 1000);
    assert_eq!(collected, (0..1000).collect::<Vec<i64>>());
    Ok(())
}

#[test]
fn test_iter_from_positions_at_lower_bound() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(64)?;
    let tree = BTreeIndex::<i64>::new("bounds", buffer_pool, 4, 5)?;

    for key in (0..50i64).map(|k| k * 2) {
        tree.insert(key, rid_for(key))?;
    }

    // Exact hit.
    let from_exact: Vec<i64> = tree.iter_from(&20)?.map(|(k, _)| k).take(3).collect();
    assert_eq!(from_exact, vec![20, 22, 24]);

    // Between keys: starts at the next larger.
    let from_gap: Vec<i64> = tree.iter_from(&21)?.map(|(k, _)| k).take(3).collect();
    assert_eq!(from_gap, vec![22, 24, 26]);

    // Past the end.
    assert_eq!(tree.iter_from(&1000)?.count(), 0);
    Ok(())
}

#[test]
fn test_delete_every_other_key() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(256)?;
    let tree = BTreeIndex::<i64>::new("deletions", buffer_pool, 4, 5)?;

    let mut keys: Vec<i64> = (0..300).collect();
    keys.shuffle(&mut thread_rng());
    for &key in &keys {
        tree.insert(key, rid_for(key))?;
    }

    for key in (0..300i64).filter(|k| k % 2 == 0) {
        tree.remove(&key)?;
        tree.verify_integrity()?;
    }

    for key in 0..300i64 {
        let expected = if key % 2 == 0 { None } else { Some(rid_for(key)) };
        assert_eq!(tree.get_value(&key)?, expected, "key {}", key);
    }

    let survivors: Vec<i64> = tree.iter()?.map(|(k, _)| k).collect();
    assert_eq!(survivors, (0..300i64).filter(|k| k % 2 == 1).collect::<Vec<i64>>());
    Ok(())
}

#[test]
fn test_delete_until_empty_and_reuse() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(128)?;
    let tree = BTreeIndex::<i64>::new("drain", buffer_pool, 4, 5)?;

    for key in 0..100i64 {
        tree.insert(key, rid_for(key))?;
    }
    for key in 0..100i64 {
        tree.remove(&key)?;
    }
    assert!(tree.is_empty());
    assert_eq!(tree.iter()?.count(), 0);

    // The tree grows again from scratch.
    for key in 0..20i64 {
        tree.insert(key, rid_for(key))?;
    }
    tree.verify_integrity()?;
    assert_eq!(tree.iter()?.count(), 20);
    Ok(())
}

#[test]
fn test_reopen_finds_persisted_root() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(128)?;

    {
        let tree = BTreeIndex::<i64>::new("persistent", buffer_pool.clone(), 4, 5)?;
        for key in 0..200i64 {
            tree.insert(key, rid_for(key))?;
        }
    }

    // A fresh handle picks the root up from the header page.
    let reopened = BTreeIndex::<i64>::new("persistent", buffer_pool, 4, 5)?;
    assert!(!reopened.is_empty());
    for key in 0..200i64 {
        assert_eq!(reopened.get_value(&key)?, Some(rid_for(key)));
    }
    Ok(())
}

#[test]
fn test_concurrent_disjoint_inserts_and_removes() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(256)?;
    let tree = Arc::new(BTreeIndex::<i64>::new("concurrent", buffer_pool, 4, 5)?);

    let threads = 4;
    let per_thread = 200i64;
    let mut handles = Vec::new();
    for t in 0..threads {
        let tree = tree.clone();
        handles.push(thread::spawn(move || {
            let base = t as i64 * per_thread;
            for key in base..base + per_thread {
                tree.insert(key, rid_for(key)).unwrap();
            }
            // Remove the lower half of this thread's range.
            for key in base..base + per_thread / 2 {
                tree.remove(&key).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    tree.verify_integrity()?;
    let expected: Vec<i64> = (0..threads as i64)
        .flat_map(|t| (t * per_thread + per_thread / 2)..(t + 1) * per_thread)
        .collect();
    let collected: Vec<i64> = tree.iter()?.map(|(k, _)| k).collect();
    assert_eq!(collected, expected);
    Ok(())
}

#[test]
fn test_concurrent_readers_and_writers() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(256)?;
    let tree = Arc::new(BTreeIndex::<i64>::new("mixed", buffer_pool, 4, 5)?);

    for key in 0..500i64 {
        tree.insert(key, rid_for(key))?;
    }

    let writer = {
        let tree = tree.clone();
        thread::spawn(move || {
            for key in 500..800i64 {
                tree.insert(key, rid_for(key)).unwrap();
            }
        })
    };
    let reader = {
        let tree = tree.clone();
        thread::spawn(move || {
            for key in 0..500i64 {
                assert_eq!(tree.get_value(&key).unwrap(), Some(rid_for(key)));
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();

    tree.verify_integrity()?;
    assert_eq!(tree.iter()?.count(), 800);
    Ok(())
}
