use std::sync::Arc;

use anyhow::Result;
use parking_lot::lock_api::ArcRwLockReadGuard;
use parking_lot::RawRwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Page, PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::deserialize_node;
use crate::storage::buffer::BufferPoolManager;

use super::base::BTreeIndex;

struct LeafPosition<K> {
    page_id: PageId,
    // Held for the lifetime of the position: iteration keeps exactly one
    // leaf read-latched at a time.
    _guard: ArcRwLockReadGuard<RawRwLock, Page>,
    node: BTreeNode<K>,
    pos: usize,
}

/// Ordered scan over the leaf chain. The current leaf stays pinned and
/// read-latched; both are released before the next leaf is latched, so an
/// iterator can never participate in a latch cycle.
pub struct TreeIterator<K> {
    buffer_pool: Arc<BufferPoolManager>,
    current: Option<LeafPosition<K>>,
}

impl<K> Iterator for TreeIterator<K>
where
    K: Clone + Ord + DeserializeOwned,
{
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current = self.current.as_mut()?;
            if current.pos < current.node.keys.len() {
                let item =
                    (current.node.keys[current.pos].clone(), current.node.values[current.pos]);
                current.pos += 1;
                return Some(item);
            }

            // Advance to the next leaf, releasing the current latch and
            // pin first.
            let next_page_id = current.node.next_page_id;
            let page_id = current.page_id;
            self.current = None;
            self.buffer_pool.unpin_page(page_id, false).ok()?;

            if next_page_id == INVALID_PAGE_ID {
                return None;
            }
            let page = self.buffer_pool.fetch_page(next_page_id).ok()?;
            let guard = page.read_arc();
            let node = deserialize_node(&guard).ok()?;
            self.current =
                Some(LeafPosition { page_id: next_page_id, _guard: guard, node, pos: 0 });
        }
    }
}

impl<K> Drop for TreeIterator<K> {
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            let page_id = current.page_id;
            drop(current);
            let _ = self.buffer_pool.unpin_page(page_id, false);
        }
    }
}

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Iterate from the leftmost leaf.
    pub fn iter(&self) -> Result<TreeIterator<K>, BTreeError> {
        self.make_iterator(None)
    }

    /// Iterate from the first entry whose key is >= `key`.
    pub fn iter_from(&self, key: &K) -> Result<TreeIterator<K>, BTreeError> {
        self.make_iterator(Some(key))
    }

    fn make_iterator(&self, start: Option<&K>) -> Result<TreeIterator<K>, BTreeError> {
        let root = *self.root_page_id.read();
        if root == INVALID_PAGE_ID {
            return Ok(TreeIterator { buffer_pool: self.buffer_pool.clone(), current: None });
        }

        // Descend without coupling: read each node, release it, then step
        // into the child.
        let mut page_id = root;
        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;
            let guard = page.read_arc();
            let node: BTreeNode<K> = deserialize_node(&guard)?;

            if node.is_leaf {
                let pos = match start {
                    None => 0,
                    Some(key) => match node.leaf_pos_of(key) {
                        None => 0,
                        Some(p) if node.keys[p] == *key => p,
                        Some(p) => p + 1,
                    },
                };
                return Ok(TreeIterator {
                    buffer_pool: self.buffer_pool.clone(),
                    current: Some(LeafPosition { page_id, _guard: guard, node, pos }),
                });
            }

            let child_id = match start {
                None => node.children[0],
                Some(key) => node.children[node.internal_pos_of(key)],
            };
            drop(guard);
            self.buffer_pool.unpin_page(page_id, false)?;
            page_id = child_id;
        }
    }
}
