use taigadb::storage::buffer::LruKReplacer;

#[test]
fn test_single_infinite_distance_frame_is_victim() {
    // With k=2 and accesses 1, 2, 3, 1, 2, only frame 3 has fewer than
    // two recorded accesses, so its backward K-distance is infinite.
    let replacer = LruKReplacer::new(8, 2);
    for frame in [1, 2, 3, 1, 2] {
        replacer.record_access(frame);
    }
    assert_eq!(replacer.size(), 3);
    assert_eq!(replacer.evict(), Some(3));
    assert_eq!(replacer.size(), 2);
}

#[test]
fn test_ties_among_infinite_break_by_oldest_access() {
    let replacer = LruKReplacer::new(8, 3);
    replacer.record_access(4);
    replacer.record_access(5);
    replacer.record_access(6);
    // All three are below k accesses; the least recently first-touched
    // frame goes first.
    assert_eq!(replacer.evict(), Some(4));
    assert_eq!(replacer.evict(), Some(5));
    assert_eq!(replacer.evict(), Some(6));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_full_frames_evict_by_kth_recent_access() {
    let replacer = LruKReplacer::new(4, 2);
    for frame in [0, 1, 2, 0, 1, 2] {
        replacer.record_access(frame);
    }
    // Everyone has two accesses; frame 0's second-most-recent stamp is
    // the oldest.
    assert_eq!(replacer.evict(), Some(0));

    // A fresh access to frame 2 pushes its K-distance below frame 1's.
    replacer.record_access(1);
    replacer.record_access(2);
    assert_eq!(replacer.evict(), Some(1));
}

#[test]
fn test_set_evictable_controls_size_and_victims() {
    let replacer = LruKReplacer::new(4, 2);
    replacer.record_access(0);
    replacer.record_access(1);
    assert_eq!(replacer.size(), 2);

    replacer.set_evictable(0, false);
    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.evict(), Some(1));
    assert_eq!(replacer.evict(), None);

    replacer.set_evictable(0, true);
    assert_eq!(replacer.evict(), Some(0));
}

#[test]
fn test_evicted_frame_starts_over() {
    let replacer = LruKReplacer::new(2, 2);
    replacer.record_access(0);
    replacer.record_access(0);
    replacer.record_access(1);
    assert_eq!(replacer.evict(), Some(1));

    // Frame 1 was reset: after one new access it is infinite-distance
    // again and beats the fully-tracked frame 0.
    replacer.record_access(1);
    assert_eq!(replacer.evict(), Some(1));
}

#[test]
#[should_panic(expected = "non-evictable")]
fn test_remove_non_evictable_frame_is_fatal() {
    let replacer = LruKReplacer::new(2, 2);
    replacer.record_access(0);
    replacer.set_evictable(0, false);
    replacer.remove(0);
}
