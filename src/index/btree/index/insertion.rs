use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, Rid};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::serialize_node;

use super::base::{BTreeIndex, LatchContext, WriteOp};

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Insert a key/rid pair. Returns false when the key already exists.
    ///
    /// The descent write-latches the path and drops every latch above the
    /// first split-proof node; splits propagate separators upward through
    /// the retained ancestors.
    pub fn insert(&self, key: K, rid: Rid) -> Result<bool, BTreeError> {
        let mut ctx = LatchContext::new(self.root_page_id.write());

        // Empty tree: the first key becomes a single leaf root.
        if ctx.root_page_id() == crate::common::types::INVALID_PAGE_ID {
            let (page, page_id) = self.buffer_pool.new_page()?;
            let mut leaf = BTreeNode::new_leaf(self.leaf_max_size);
            leaf.keys.push(key);
            leaf.values.push(rid);
            {
                let mut guard = page.write();
                serialize_node(&leaf, &mut guard)?;
            }
            self.buffer_pool.unpin_page(page_id, true)?;

            if let Some(root) = ctx.root_guard.as_mut() {
                **root = page_id;
            }
            self.store_root(page_id)?;
            ctx.release(&self.buffer_pool)?;
            return Ok(true);
        }

        let (leaf_id, mut leaf_guard, mut leaf) =
            self.find_leaf_write(&key, WriteOp::Insert, &mut ctx)?;

        let pos = leaf.leaf_pos_of(&key);
        if let Some(p) = pos {
            if leaf.keys[p] == key {
                ctx.release(&self.buffer_pool)?;
                drop(leaf_guard);
                self.buffer_pool.unpin_page(leaf_id, false)?;
                return Ok(false);
            }
        }

        leaf.leaf_insert_at(pos.map_or(0, |p| p + 1), key, rid);

        if leaf.size() < leaf.max_size {
            self.write_node(&mut leaf_guard, &leaf)?;
            ctx.release(&self.buffer_pool)?;
            drop(leaf_guard);
            self.buffer_pool.unpin_page(leaf_id, true)?;
            return Ok(true);
        }

        // Leaf is full: split it and push the new sibling's low key up.
        let (new_page, new_page_id) = self.buffer_pool.new_page()?;
        let mut new_leaf = BTreeNode::new_leaf(self.leaf_max_size);
        leaf.leaf_split(new_page_id, &mut new_leaf);
        let separator = new_leaf.keys[0].clone();
        let left_min = leaf.keys[0].clone();

        self.write_node(&mut leaf_guard, &leaf)?;
        {
            let mut guard = new_page.write();
            serialize_node(&new_leaf, &mut guard)?;
        }

        self.insert_into_parent(&mut ctx, leaf_id, left_min, separator, new_page_id)?;

        drop(leaf_guard);
        self.buffer_pool.unpin_page(leaf_id, true)?;
        self.buffer_pool.unpin_page(new_page_id, true)?;
        Ok(true)
    }

    /// Wire `(separator, right_id)` into the parent of `left_id`, growing
    /// a new root or splitting the parent as needed. The parent is the
    /// innermost retained ancestor; an empty ancestor stack means `left`
    /// was the root.
    fn insert_into_parent(
        &self,
        ctx: &mut LatchContext<'_, K>,
        left_id: PageId,
        left_min: K,
        separator: K,
        right_id: PageId,
    ) -> Result<(), BTreeError> {
        let mut parent = match ctx.ancestors.pop() {
            Some(parent) => parent,
            None => {
                // The split reached the root: grow the tree by one level.
                let (page, page_id) = self.buffer_pool.new_page()?;
                let mut root = BTreeNode::new_internal(self.internal_max_size);
                root.keys = vec![left_min, separator];
                root.children = vec![left_id, right_id];
                {
                    let mut guard = page.write();
                    serialize_node(&root, &mut guard)?;
                }
                self.buffer_pool.unpin_page(page_id, true)?;

                match ctx.root_guard.as_mut() {
                    Some(cell) => **cell = page_id,
                    None => {
                        return Err(BTreeError::Corrupted(
                            "root split without the root-id latch".to_string(),
                        ))
                    }
                }
                self.store_root(page_id)?;
                ctx.release(&self.buffer_pool)?;
                return Ok(());
            }
        };

        if parent.node.size() < parent.node.max_size {
            let pos = parent.node.internal_pos_of(&separator);
            parent.node.internal_insert_at(pos + 1, separator, right_id);
            self.write_node(&mut parent.guard, &parent.node)?;
            drop(parent.guard);
            self.buffer_pool.unpin_page(parent.page_id, true)?;
            ctx.release(&self.buffer_pool)?;
            return Ok(());
        }

        // Parent is full. When the separator sorts before the parent's
        // last entry, that entry is carried to the new sibling and the
        // separator takes its place; otherwise the separator itself is
        // carried.
        let (end_key, end_child) = if separator < parent.node.keys[parent.node.size() - 1] {
            let (last_key, last_child) = parent.node.internal_pop_last();
            let pos = parent.node.internal_pos_of(&separator);
            parent.node.internal_insert_at(pos + 1, separator, right_id);
            (last_key, last_child)
        } else {
            (separator, right_id)
        };

        let (new_page, new_page_id) = self.buffer_pool.new_page()?;
        let mut new_parent = BTreeNode::new_internal(self.internal_max_size);
        parent.node.internal_split(&mut new_parent, end_key, end_child);
        let promoted = new_parent.keys[0].clone();
        let parent_min = parent.node.keys[0].clone();

        // Both halves are final; write them before the recursion can
        // release latches above and make the new sibling reachable.
        self.write_node(&mut parent.guard, &parent.node)?;
        {
            let mut guard = new_page.write();
            serialize_node(&new_parent, &mut guard)?;
        }

        self.insert_into_parent(ctx, parent.page_id, parent_min, promoted, new_page_id)?;

        drop(parent.guard);
        self.buffer_pool.unpin_page(parent.page_id, true)?;
        self.buffer_pool.unpin_page(new_page_id, true)?;
        Ok(())
    }
}
