// LRU-K Replacer
//
// Chooses a victim frame among evictable frames by backward K-distance:
// the distance is infinite while a frame has fewer than K recorded
// accesses, otherwise `now - timestamp_of_kth_most_recent_access`.
// Infinite-distance frames win ties by least recent first access.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::types::FrameId;

#[derive(Debug, Clone)]
struct FrameRecord {
    /// Up to the last `k` access timestamps, oldest first.
    history: VecDeque<u64>,
    valid: bool,
    evictable: bool,
}

impl FrameRecord {
    fn new(k: usize) -> Self {
        Self { history: VecDeque::with_capacity(k), valid: false, evictable: false }
    }

    fn full(&self, k: usize) -> bool {
        self.history.len() >= k
    }

    /// Oldest retained timestamp: with K accesses recorded this is the
    /// K-th most recent, which orders backward K-distances.
    fn timestamp(&self) -> u64 {
        self.history.front().copied().unwrap_or(0)
    }

    fn access(&mut self, now: u64, k: usize) {
        if self.history.len() == k {
            self.history.pop_front();
        }
        self.history.push_back(now);
    }

    fn reset(&mut self) {
        self.history.clear();
        self.valid = false;
        self.evictable = false;
    }
}

struct ReplacerState {
    frames: Vec<FrameRecord>,
    current_timestamp: u64,
    current_size: usize,
}

/// LRU-K page replacement policy guarded by a single mutex.
pub struct LruKReplacer {
    num_frames: usize,
    k: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "k must be at least 1");
        let state = ReplacerState {
            frames: vec![FrameRecord::new(k); num_frames],
            current_timestamp: 0,
            current_size: 0,
        };
        Self { num_frames, k, state: Mutex::new(state) }
    }

    /// Evict the evictable frame with the largest backward K-distance,
    /// clearing its history. Returns `None` when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let mut victim: Option<usize> = None;

        for i in 0..self.num_frames {
            let frame = &state.frames[i];
            if !frame.valid || !frame.evictable {
                continue;
            }
            victim = match victim {
                None => Some(i),
                Some(v) => {
                    let best = &state.frames[v];
                    // A frame with fewer than K accesses beats any full
                    // one; among equals the older retained timestamp wins.
                    let beats = if frame.full(self.k) == best.full(self.k) {
                        frame.timestamp() < best.timestamp()
                    } else {
                        !frame.full(self.k)
                    };
                    if beats {
                        Some(i)
                    } else {
                        Some(v)
                    }
                }
            };
        }

        let v = victim?;
        state.frames[v].reset();
        state.current_size -= 1;
        Some(v as FrameId)
    }

    /// Stamp the current timestamp on a frame. A frame's first access
    /// marks it valid and evictable.
    pub fn record_access(&self, frame_id: FrameId) {
        assert!((frame_id as usize) < self.num_frames, "frame id {} out of range", frame_id);
        let mut state = self.state.lock();
        let now = state.current_timestamp;
        state.current_timestamp += 1;
        let k = self.k;
        let frame = &mut state.frames[frame_id as usize];
        if !frame.valid {
            frame.valid = true;
            frame.evictable = true;
            frame.access(now, k);
            state.current_size += 1;
            return;
        }
        frame.access(now, k);
    }

    /// Toggle a frame's evictability; no-op on frames never accessed.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        assert!((frame_id as usize) < self.num_frames, "frame id {} out of range", frame_id);
        let mut state = self.state.lock();
        let frame = &mut state.frames[frame_id as usize];
        if !frame.valid {
            return;
        }
        if frame.evictable != evictable {
            frame.evictable = evictable;
            if evictable {
                state.current_size += 1;
            } else {
                state.current_size -= 1;
            }
        }
    }

    /// Clear a frame's state entirely. Panics if the frame is pinned
    /// (non-evictable): the pool must never drop a frame it still pins.
    pub fn remove(&self, frame_id: FrameId) {
        if frame_id as usize >= self.num_frames {
            return;
        }
        let mut state = self.state.lock();
        let frame = &mut state.frames[frame_id as usize];
        if !frame.valid {
            return;
        }
        assert!(frame.evictable, "removing a non-evictable frame");
        frame.reset();
        state.current_size -= 1;
    }

    /// Number of frames currently evictable.
    pub fn size(&self) -> usize {
        self.state.lock().current_size
    }
}
