// B+Tree node codec
//
// Nodes are serialized whole into their page. Layout:
//   [0]      node type (1 = leaf, 0 = internal)
//   [1..3]   entry count (u16)
//   [3..5]   max size (u16)
//   [5..9]   next page id (u32, leaves only)
//   keys     u16 length prefix + bincode bytes, per key
//   payload  8-byte rids (leaf) or 4-byte child page ids (internal)

use byteorder::{ByteOrder, LittleEndian};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Page, Rid, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;

pub(crate) const NODE_HEADER_SIZE: usize = 9;

pub fn serialize_node<K>(node: &BTreeNode<K>, page: &mut Page) -> Result<(), BTreeError>
where
    K: Serialize + Clone + Ord,
{
    page.data.fill(0);

    page.data[0] = if node.is_leaf { 1 } else { 0 };
    LittleEndian::write_u16(&mut page.data[1..3], node.size() as u16);
    LittleEndian::write_u16(&mut page.data[3..5], node.max_size as u16);
    LittleEndian::write_u32(&mut page.data[5..9], node.next_page_id);

    let mut offset = NODE_HEADER_SIZE;
    for key in &node.keys {
        let key_bytes = bincode::serialize(key)
            .map_err(|e| BTreeError::SerializationError(e.to_string()))?;
        if offset + 2 + key_bytes.len() > PAGE_SIZE {
            return Err(BTreeError::NodeTooLarge);
        }
        LittleEndian::write_u16(&mut page.data[offset..offset + 2], key_bytes.len() as u16);
        offset += 2;
        page.data[offset..offset + key_bytes.len()].copy_from_slice(&key_bytes);
        offset += key_bytes.len();
    }

    if node.is_leaf {
        for rid in &node.values {
            if offset + 8 > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            LittleEndian::write_u32(&mut page.data[offset..offset + 4], rid.page_id);
            LittleEndian::write_u32(&mut page.data[offset + 4..offset + 8], rid.slot);
            offset += 8;
        }
    } else {
        for child in &node.children {
            if offset + 4 > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            LittleEndian::write_u32(&mut page.data[offset..offset + 4], *child);
            offset += 4;
        }
    }

    Ok(())
}

pub fn deserialize_node<K>(page: &Page) -> Result<BTreeNode<K>, BTreeError>
where
    K: DeserializeOwned + Clone + Ord,
{
    let is_leaf = page.data[0] == 1;
    let size = LittleEndian::read_u16(&page.data[1..3]) as usize;
    let max_size = LittleEndian::read_u16(&page.data[3..5]) as usize;
    let next_page_id = LittleEndian::read_u32(&page.data[5..9]);

    let mut offset = NODE_HEADER_SIZE;
    let mut keys = Vec::with_capacity(size);
    for _ in 0..size {
        if offset + 2 > PAGE_SIZE {
            return Err(BTreeError::DeserializationError("key length out of bounds".to_string()));
        }
        let key_len = LittleEndian::read_u16(&page.data[offset..offset + 2]) as usize;
        offset += 2;
        if offset + key_len > PAGE_SIZE {
            return Err(BTreeError::DeserializationError("key data out of bounds".to_string()));
        }
        let key = bincode::deserialize(&page.data[offset..offset + key_len])
            .map_err(|e| BTreeError::DeserializationError(e.to_string()))?;
        keys.push(key);
        offset += key_len;
    }

    let mut values = Vec::new();
    let mut children = Vec::new();
    if is_leaf {
        values.reserve(size);
        for _ in 0..size {
            if offset + 8 > PAGE_SIZE {
                return Err(BTreeError::DeserializationError("rid out of bounds".to_string()));
            }
            let page_id = LittleEndian::read_u32(&page.data[offset..offset + 4]);
            let slot = LittleEndian::read_u32(&page.data[offset + 4..offset + 8]);
            values.push(Rid::new(page_id, slot));
            offset += 8;
        }
    } else {
        children.reserve(size);
        for _ in 0..size {
            if offset + 4 > PAGE_SIZE {
                return Err(BTreeError::DeserializationError("child id out of bounds".to_string()));
            }
            children.push(LittleEndian::read_u32(&page.data[offset..offset + 4]));
            offset += 4;
        }
    }

    Ok(BTreeNode { is_leaf, max_size, next_page_id, keys, children, values })
}
