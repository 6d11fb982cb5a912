use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel for "no page". Page numbering starts at 1.
pub const INVALID_PAGE_ID: PageId = 0;

/// The first page of every database file; holds the index root registry.
pub const HEADER_PAGE_ID: PageId = 1;

/// Transaction ID type
pub type TxnId = u32;

/// Sentinel for "no transaction".
pub const INVALID_TXN_ID: TxnId = 0;

/// Buffer pool frame ID type
pub type FrameId = u32;

/// Table object ID type
pub type TableOid = u32;

/// Record ID: the page a tuple lives on plus its slot within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page structure. The surrounding `RwLock` doubles as the page latch;
/// pin counts live in the buffer pool's frame metadata.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self { data: [0; PAGE_SIZE], page_id }
    }

    pub fn reset(&mut self, page_id: PageId) {
        self.data.fill(0);
        self.page_id = page_id;
    }
}

/// Smart pointer to a page
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame bookkeeping. The page bytes themselves sit behind the
/// frame's `PagePtr`; this struct tracks what the pool knows about the slot.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub page_id: PageId,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl Frame {
    pub fn empty() -> Self {
        Self { page_id: INVALID_PAGE_ID, pin_count: 0, is_dirty: false }
    }
}
