use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::INVALID_PAGE_ID;
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::deserialize_node;

use super::base::{AncestorEntry, BTreeIndex, LatchContext, WriteOp};

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Remove a key. A missing key is a no-op. Underflowing nodes borrow
    /// from a sibling when possible, otherwise merge; merges delete the
    /// emptied page and may cascade to the parent. Deleted pages are
    /// returned to the buffer pool only after every latch is released.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let mut ctx = LatchContext::new(self.root_page_id.write());
        if ctx.root_page_id() == INVALID_PAGE_ID {
            ctx.release(&self.buffer_pool)?;
            return Ok(());
        }

        let (leaf_id, mut leaf_guard, mut leaf) =
            self.find_leaf_write(key, WriteOp::Delete, &mut ctx)?;

        let pos = match leaf.leaf_pos_of(key) {
            Some(p) if leaf.keys[p] == *key => p,
            _ => {
                ctx.release(&self.buffer_pool)?;
                drop(leaf_guard);
                self.buffer_pool.unpin_page(leaf_id, false)?;
                return Ok(());
            }
        };

        leaf.leaf_delete_at(pos);
        let delete_leaf = self.coalesce_or_redistribute(&mut leaf, key, &mut ctx)?;

        self.write_node(&mut leaf_guard, &leaf)?;
        drop(leaf_guard);
        self.buffer_pool.unpin_page(leaf_id, true)?;

        if delete_leaf {
            ctx.deleted.push(leaf_id);
        }
        for page_id in ctx.deleted.drain(..) {
            // A page still pinned elsewhere (e.g. by an iterator) simply
            // stays resident until its borrower lets go.
            let _ = self.buffer_pool.delete_page(page_id);
        }
        Ok(())
    }

    /// Rebalance `node` after a deletion. `locate_key` is any key known to
    /// fall inside the node's range; it finds the node's slot in its
    /// parent. Returns true when the node's page must be deleted by the
    /// caller.
    fn coalesce_or_redistribute(
        &self,
        node: &mut BTreeNode<K>,
        locate_key: &K,
        ctx: &mut LatchContext<'_, K>,
    ) -> Result<bool, BTreeError> {
        if ctx.ancestors.is_empty() {
            // `node` is the root.
            if !node.is_leaf && node.size() == 1 {
                // A single-child internal root hands the tree to its child.
                let new_root = node.children[0];
                if let Some(cell) = ctx.root_guard.as_mut() {
                    **cell = new_root;
                }
                self.store_root(new_root)?;
                ctx.release(&self.buffer_pool)?;
                return Ok(true);
            }
            if node.is_leaf && node.size() == 0 {
                if let Some(cell) = ctx.root_guard.as_mut() {
                    **cell = INVALID_PAGE_ID;
                }
                self.store_root(INVALID_PAGE_ID)?;
                ctx.release(&self.buffer_pool)?;
                return Ok(true);
            }
            ctx.release(&self.buffer_pool)?;
            return Ok(false);
        }

        if node.size() >= node.min_size() {
            ctx.release(&self.buffer_pool)?;
            return Ok(false);
        }

        let mut parent = match ctx.ancestors.pop() {
            Some(parent) => parent,
            None => return Err(BTreeError::Corrupted("underflow without a parent".to_string())),
        };
        let pos = parent.node.internal_pos_of(locate_key);

        if pos > 0 {
            // Prefer the left sibling.
            let left_id = parent.node.children[pos - 1];
            let left_page = self.buffer_pool.fetch_page(left_id)?;
            let mut left_guard = left_page.write_arc();
            let mut left: BTreeNode<K> = deserialize_node(&left_guard)?;

            if left.size() > left.min_size() {
                // Borrow the left sibling's last entry.
                if node.is_leaf {
                    left.leaf_shift_to(node);
                } else {
                    left.internal_shift_to(node);
                }
                parent.node.keys[pos] = node.keys[0].clone();

                self.write_node(&mut left_guard, &left)?;
                drop(left_guard);
                self.buffer_pool.unpin_page(left_id, true)?;
                self.finish_parent(parent, ctx)?;
                return Ok(false);
            }

            // Merge `node` into the left sibling; the caller deletes
            // `node`'s page.
            if node.is_leaf {
                left.leaf_merge(node);
            } else {
                left.internal_merge(node, parent.node.keys[pos].clone());
            }
            self.write_node(&mut left_guard, &left)?;
            drop(left_guard);
            self.buffer_pool.unpin_page(left_id, true)?;

            parent.node.internal_delete_at(pos);
            self.recurse_into_parent(parent, ctx)?;
            return Ok(true);
        }

        // Leftmost child: fall back to the right sibling.
        if parent.node.size() > 1 {
            let right_id = parent.node.children[pos + 1];
            let right_page = self.buffer_pool.fetch_page(right_id)?;
            let mut right_guard = right_page.write_arc();
            let mut right: BTreeNode<K> = deserialize_node(&right_guard)?;

            if right.size() > right.min_size() {
                // Borrow the right sibling's first entry.
                if node.is_leaf {
                    node.leaf_shift_from(&mut right);
                } else {
                    node.internal_shift_from(&mut right);
                }
                parent.node.keys[pos + 1] = right.keys[0].clone();

                self.write_node(&mut right_guard, &right)?;
                drop(right_guard);
                self.buffer_pool.unpin_page(right_id, true)?;
                self.finish_parent(parent, ctx)?;
                return Ok(false);
            }

            // Merge the right sibling into `node` and delete its page.
            if node.is_leaf {
                node.leaf_merge(&mut right);
            } else {
                node.internal_merge(&mut right, parent.node.keys[pos + 1].clone());
            }
            drop(right_guard);
            self.buffer_pool.unpin_page(right_id, true)?;
            ctx.deleted.push(right_id);

            parent.node.internal_delete_at(pos + 1);
            self.recurse_into_parent(parent, ctx)?;
            return Ok(false);
        }

        ctx.release(&self.buffer_pool)?;
        Ok(false)
    }

    /// Write back a modified parent whose subtree is balanced again and
    /// release everything above it.
    fn finish_parent(
        &self,
        mut parent: AncestorEntry<K>,
        ctx: &mut LatchContext<'_, K>,
    ) -> Result<(), BTreeError> {
        self.write_node(&mut parent.guard, &parent.node)?;
        drop(parent.guard);
        self.buffer_pool.unpin_page(parent.page_id, true)?;
        ctx.release(&self.buffer_pool)?;
        Ok(())
    }

    /// A merge removed a separator from the parent: rebalance it in turn,
    /// then write it back.
    fn recurse_into_parent(
        &self,
        mut parent: AncestorEntry<K>,
        ctx: &mut LatchContext<'_, K>,
    ) -> Result<(), BTreeError> {
        let parent_locate = parent.node.keys[0].clone();
        let delete_parent =
            self.coalesce_or_redistribute(&mut parent.node, &parent_locate, ctx)?;
        self.write_node(&mut parent.guard, &parent.node)?;
        drop(parent.guard);
        self.buffer_pool.unpin_page(parent.page_id, true)?;
        if delete_parent {
            ctx.deleted.push(parent.page_id);
        }
        Ok(())
    }
}
