use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use parking_lot::lock_api::ArcRwLockWriteGuard;
use parking_lot::{RawRwLock, RwLock, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Page, PageId, Rid, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{deserialize_node, serialize_node};
use crate::storage::buffer::BufferPoolManager;

/// What a write descent intends to do; decides when a child proves the
/// ancestors safe to release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOp {
    Insert,
    Delete,
}

/// One write-latched ancestor retained during a descent.
pub(crate) struct AncestorEntry<K> {
    pub page_id: PageId,
    pub guard: ArcRwLockWriteGuard<RawRwLock, Page>,
    pub node: BTreeNode<K>,
}

/// The set of latches a write descent holds: the root-id cell's write
/// guard plus every ancestor not yet proved safe. Dropping the guards and
/// unpinning their pages is the release protocol; pages deleted by a
/// structural change are collected here and freed after all latches are
/// gone.
pub(crate) struct LatchContext<'a, K> {
    pub root_guard: Option<RwLockWriteGuard<'a, PageId>>,
    pub ancestors: Vec<AncestorEntry<K>>,
    pub deleted: Vec<PageId>,
}

impl<'a, K> LatchContext<'a, K> {
    pub fn new(root_guard: RwLockWriteGuard<'a, PageId>) -> Self {
        Self { root_guard: Some(root_guard), ancestors: Vec::new(), deleted: Vec::new() }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_guard.as_ref().map(|g| **g).unwrap_or(INVALID_PAGE_ID)
    }

    /// Release the root-id latch and every retained ancestor. Ancestors
    /// released here were proved safe and never modified.
    pub fn release(&mut self, buffer_pool: &BufferPoolManager) -> Result<(), BTreeError> {
        self.root_guard = None;
        for entry in self.ancestors.drain(..) {
            drop(entry.guard);
            buffer_pool.unpin_page(entry.page_id, false)?;
        }
        Ok(())
    }
}

/// A paged B+Tree index with duplicate-free keys.
///
/// The root page id lives in a cell with its own RwLock, acquired before
/// any page latch and released as soon as the descent proves the root
/// cannot change. Tree roots are registered by name on the header page so
/// indexes survive reopening the database file.
pub struct BTreeIndex<K> {
    name: String,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root_page_id: RwLock<PageId>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    _phantom: PhantomData<K>,
}

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        assert!(leaf_max_size >= 2, "leaf_max_size too small");
        assert!(internal_max_size >= 3, "internal_max_size too small");

        let name = name.into();
        let root = Self::read_registry(&buffer_pool)?
            .get(&name)
            .copied()
            .unwrap_or(INVALID_PAGE_ID);

        Ok(Self {
            name,
            buffer_pool,
            root_page_id: RwLock::new(root),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.read() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Point lookup. Crabs down with read latches: the child's latch is
    /// taken before the parent's is released.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let root_cell = self.root_page_id.read();
        let root = *root_cell;
        if root == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut page_id = root;
        let page = self.buffer_pool.fetch_page(page_id)?;
        let mut guard = page.read_arc();
        drop(root_cell);

        loop {
            let node: BTreeNode<K> = deserialize_node(&guard)?;
            if node.is_leaf {
                let result = match node.leaf_pos_of(key) {
                    Some(pos) if node.keys[pos] == *key => Some(node.values[pos]),
                    _ => None,
                };
                drop(guard);
                self.buffer_pool.unpin_page(page_id, false)?;
                return Ok(result);
            }

            let child_id = node.children[node.internal_pos_of(key)];
            let child_page = self.buffer_pool.fetch_page(child_id)?;
            let child_guard = child_page.read_arc();
            drop(guard);
            self.buffer_pool.unpin_page(page_id, false)?;
            page_id = child_id;
            guard = child_guard;
        }
    }

    /// Descend to the leaf for `key` under write latches, retaining every
    /// ancestor the pending mutation could touch and releasing the rest
    /// (including the root-id latch) as soon as a safe child is found.
    pub(crate) fn find_leaf_write(
        &self,
        key: &K,
        op: WriteOp,
        ctx: &mut LatchContext<'_, K>,
    ) -> Result<(PageId, ArcRwLockWriteGuard<RawRwLock, Page>, BTreeNode<K>), BTreeError> {
        let mut page_id = ctx.root_page_id();
        let page = self.buffer_pool.fetch_page(page_id)?;
        let mut guard = page.write_arc();
        let mut node: BTreeNode<K> = deserialize_node(&guard)?;

        if Self::is_safe(&node, op, true) {
            ctx.release(&self.buffer_pool)?;
        }

        while !node.is_leaf {
            let child_id = node.children[node.internal_pos_of(key)];
            let child_page = self.buffer_pool.fetch_page(child_id)?;
            let child_guard = child_page.write_arc();
            let child_node: BTreeNode<K> = deserialize_node(&child_guard)?;

            ctx.ancestors.push(AncestorEntry { page_id, guard, node });
            if Self::is_safe(&child_node, op, false) {
                ctx.release(&self.buffer_pool)?;
            }

            page_id = child_id;
            guard = child_guard;
            node = child_node;
        }

        Ok((page_id, guard, node))
    }

    fn is_safe(node: &BTreeNode<K>, op: WriteOp, is_root: bool) -> bool {
        match op {
            WriteOp::Insert => node.safe_for_insert(),
            WriteOp::Delete => node.safe_for_delete(is_root),
        }
    }

    /// Serialize a node into a write-latched page.
    pub(crate) fn write_node(
        &self,
        guard: &mut ArcRwLockWriteGuard<RawRwLock, Page>,
        node: &BTreeNode<K>,
    ) -> Result<(), BTreeError> {
        serialize_node(node, &mut **guard)
    }

    // ---- header-page root registry ----

    fn read_registry(
        buffer_pool: &Arc<BufferPoolManager>,
    ) -> Result<HashMap<String, PageId>, BTreeError> {
        let page = buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let registry = {
            let guard = page.read();
            Self::decode_registry(&guard)
        };
        buffer_pool.unpin_page(HEADER_PAGE_ID, false)?;
        registry
    }

    fn decode_registry(page: &Page) -> Result<HashMap<String, PageId>, BTreeError> {
        let len = LittleEndian::read_u16(&page.data[0..2]) as usize;
        if len == 0 {
            return Ok(HashMap::new());
        }
        bincode::deserialize(&page.data[2..2 + len])
            .map_err(|e| BTreeError::DeserializationError(e.to_string()))
    }

    /// Record the tree's root in the header page. Called with the root-id
    /// write latch held, every time the root changes.
    pub(crate) fn store_root(&self, root: PageId) -> Result<(), BTreeError> {
        log::trace!("index {} root is now page {}", self.name, root);
        let page = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let result = {
            let mut guard = page.write();
            Self::decode_registry(&guard).and_then(|mut registry| {
                registry.insert(self.name.clone(), root);
                let bytes = bincode::serialize(&registry)
                    .map_err(|e| BTreeError::SerializationError(e.to_string()))?;
                if 2 + bytes.len() > guard.data.len() {
                    return Err(BTreeError::NodeTooLarge);
                }
                LittleEndian::write_u16(&mut guard.data[0..2], bytes.len() as u16);
                guard.data[2..2 + bytes.len()].copy_from_slice(&bytes);
                Ok(())
            })
        };
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, result.is_ok())?;
        result
    }

    // ---- integrity checking (used by tests and debugging) ----

    /// Walk the whole tree and verify the structural invariants: size
    /// bounds, sorted keys, separators bounding their subtrees, uniform
    /// leaf depth, and the leaf chain visiting all keys in order.
    pub fn verify_integrity(&self) -> Result<(), BTreeError> {
        let root = *self.root_page_id.read();
        if root == INVALID_PAGE_ID {
            return Ok(());
        }
        let summary = self.check_subtree(root, true)?;

        // The leaf chain must start at the leftmost leaf and stay sorted.
        let mut page_id = summary.leftmost_leaf;
        let mut last_key: Option<K> = None;
        while page_id != INVALID_PAGE_ID {
            let node = self.load_node(page_id)?;
            if !node.is_leaf {
                return Err(BTreeError::Corrupted(format!("page {} in leaf chain", page_id)));
            }
            for key in &node.keys {
                if let Some(prev) = &last_key {
                    if prev >= key {
                        return Err(BTreeError::Corrupted(format!(
                            "leaf chain out of order at page {}",
                            page_id
                        )));
                    }
                }
                last_key = Some(key.clone());
            }
            page_id = node.next_page_id;
        }
        Ok(())
    }

    fn load_node(&self, page_id: PageId) -> Result<BTreeNode<K>, BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let node = {
            let guard = page.read();
            deserialize_node(&guard)
        };
        self.buffer_pool.unpin_page(page_id, false)?;
        node
    }

    fn check_subtree(&self, page_id: PageId, is_root: bool) -> Result<SubtreeSummary<K>, BTreeError> {
        let node = self.load_node(page_id)?;

        if node.is_leaf {
            if node.values.len() != node.keys.len() {
                return Err(BTreeError::Corrupted(format!("leaf {} arity mismatch", page_id)));
            }
            if !node.keys.windows(2).all(|w| w[0] < w[1]) {
                return Err(BTreeError::Corrupted(format!("leaf {} keys unsorted", page_id)));
            }
            if !is_root && (node.size() < node.min_size() || node.size() >= node.max_size) {
                return Err(BTreeError::Corrupted(format!(
                    "leaf {} size {} out of [{}, {})",
                    page_id,
                    node.size(),
                    node.min_size(),
                    node.max_size
                )));
            }
            return Ok(SubtreeSummary {
                leftmost_leaf: page_id,
                min_key: node.keys.first().cloned(),
                max_key: node.keys.last().cloned(),
                depth: 0,
            });
        }

        if node.children.len() != node.keys.len() {
            return Err(BTreeError::Corrupted(format!("internal {} arity mismatch", page_id)));
        }
        // Separators above the sentinel must be strictly increasing.
        if !node.keys[1..].windows(2).all(|w| w[0] < w[1]) {
            return Err(BTreeError::Corrupted(format!("internal {} keys unsorted", page_id)));
        }
        if !is_root && (node.size() < node.min_size() || node.size() > node.max_size) {
            return Err(BTreeError::Corrupted(format!(
                "internal {} size {} out of [{}, {}]",
                page_id,
                node.size(),
                node.min_size(),
                node.max_size
            )));
        }
        if is_root && node.size() < 2 {
            return Err(BTreeError::Corrupted(format!("root {} has a single child", page_id)));
        }

        let mut summary = SubtreeSummary {
            leftmost_leaf: INVALID_PAGE_ID,
            min_key: None,
            max_key: None,
            depth: 0,
        };
        for (i, &child) in node.children.iter().enumerate() {
            let child_summary = self.check_subtree(child, false)?;
            if i == 0 {
                summary.leftmost_leaf = child_summary.leftmost_leaf;
                summary.min_key = child_summary.min_key;
                summary.depth = child_summary.depth + 1;
            } else {
                if child_summary.depth + 1 != summary.depth {
                    return Err(BTreeError::Corrupted(format!(
                        "leaves at unequal depth under page {}",
                        page_id
                    )));
                }
                // A separator is a lower bound for its subtree and an
                // upper bound for everything to its left. (Deletions may
                // leave it below its subtree's current minimum.)
                let sep = &node.keys[i];
                if let Some(prev_max) = &summary.max_key {
                    if prev_max >= sep {
                        return Err(BTreeError::Corrupted(format!(
                            "separator {} of page {} not above left subtree",
                            i, page_id
                        )));
                    }
                }
                if let Some(child_min) = &child_summary.min_key {
                    if sep > child_min {
                        return Err(BTreeError::Corrupted(format!(
                            "separator {} of page {} above subtree minimum",
                            i, page_id
                        )));
                    }
                }
            }
            if child_summary.max_key.is_some() {
                summary.max_key = child_summary.max_key;
            }
        }
        Ok(summary)
    }
}

struct SubtreeSummary<K> {
    leftmost_leaf: PageId,
    min_key: Option<K>,
    max_key: Option<K>,
    depth: usize,
}
