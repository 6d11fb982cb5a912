// Table Heap
//
// A table's tuples live in a doubly linked chain of slotted pages pulled
// through the buffer pool. Inserts go to the tail page, spilling into a
// freshly allocated page when full; deletes only mark the slot.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{PageError, PageManager};

#[derive(Error, Debug)]
pub enum HeapError {
    #[error("Tuple {0} not found")]
    TupleNotFound(Rid),
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),
    #[error("Page error: {0}")]
    Page(#[from] PageError),
}

pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: PageManager,
    first_page_id: PageId,
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    /// Create an empty heap with one initialized page.
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, HeapError> {
        let page_manager = PageManager::new();
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut guard = page.write();
            page_manager.init_page(&mut guard);
        }
        buffer_pool.unpin_page(page_id, true)?;

        Ok(Self {
            buffer_pool,
            page_manager,
            first_page_id: page_id,
            last_page_id: Mutex::new(page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Insert a serialized tuple, returning its record id.
    pub fn insert_tuple(&self, data: &[u8]) -> Result<Rid, HeapError> {
        let mut last = self.last_page_id.lock();
        let page = self.buffer_pool.fetch_page(*last)?;

        let inserted = {
            let mut guard = page.write();
            self.page_manager.insert_record(&mut guard, data)
        };

        match inserted {
            Ok(slot) => {
                let rid = Rid::new(*last, slot);
                self.buffer_pool.unpin_page(*last, true)?;
                Ok(rid)
            }
            Err(PageError::InsufficientSpace) => {
                // Tail is full: chain a fresh page and retry there.
                let (new_page, new_page_id) = self.buffer_pool.new_page()?;
                let inserted = {
                    let mut old_guard = page.write();
                    let mut header = self.page_manager.get_header(&old_guard);
                    header.next_page_id = new_page_id;
                    self.page_manager.set_header(&mut old_guard, &header);

                    let mut new_guard = new_page.write();
                    self.page_manager.init_page(&mut new_guard);
                    let mut new_header = self.page_manager.get_header(&new_guard);
                    new_header.prev_page_id = *last;
                    self.page_manager.set_header(&mut new_guard, &new_header);
                    self.page_manager.insert_record(&mut new_guard, data)
                };
                self.buffer_pool.unpin_page(*last, true)?;
                self.buffer_pool.unpin_page(new_page_id, true)?;
                *last = new_page_id;
                Ok(Rid::new(new_page_id, inserted?))
            }
            Err(e) => {
                self.buffer_pool.unpin_page(*last, false)?;
                Err(e.into())
            }
        }
    }

    /// Read a tuple's bytes by record id.
    pub fn get_tuple(&self, rid: Rid) -> Result<Vec<u8>, HeapError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let guard = page.read();
            self.page_manager.get_record(&guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;
        match result {
            Ok(data) => Ok(data),
            Err(PageError::RecordNotFound) | Err(PageError::InvalidSlot) => {
                Err(HeapError::TupleNotFound(rid))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a tuple deleted. Returns false when it was already gone.
    pub fn mark_delete(&self, rid: Rid) -> Result<bool, HeapError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            self.page_manager.delete_record(&mut guard, rid.slot)
        };
        match result {
            Ok(()) => {
                self.buffer_pool.unpin_page(rid.page_id, true)?;
                Ok(true)
            }
            Err(PageError::RecordNotFound) | Err(PageError::InvalidSlot) => {
                self.buffer_pool.unpin_page(rid.page_id, false)?;
                Ok(false)
            }
            Err(e) => {
                self.buffer_pool.unpin_page(rid.page_id, false)?;
                Err(e.into())
            }
        }
    }

    /// Iterate over every live tuple in the heap. The iterator buffers one
    /// page's records at a time, so it never holds a page latch across
    /// `next` calls.
    pub fn iter(&self) -> TableIterator {
        TableIterator {
            buffer_pool: self.buffer_pool.clone(),
            page_manager: PageManager::new(),
            next_page_id: self.first_page_id,
            buffered: Vec::new(),
            pos: 0,
        }
    }
}

pub struct TableIterator {
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: PageManager,
    next_page_id: PageId,
    buffered: Vec<(Rid, Vec<u8>)>,
    pos: usize,
}

impl TableIterator {
    fn load_next_page(&mut self) -> Result<bool, HeapError> {
        while self.next_page_id != INVALID_PAGE_ID {
            let page_id = self.next_page_id;
            let page = self.buffer_pool.fetch_page(page_id)?;
            let (records, next) = {
                let guard = page.read();
                let header = self.page_manager.get_header(&guard);
                (self.page_manager.live_records(&guard), header.next_page_id)
            };
            self.buffer_pool.unpin_page(page_id, false)?;
            self.next_page_id = next;
            if !records.is_empty() {
                self.buffered = records
                    .into_iter()
                    .map(|(slot, data)| (Rid::new(page_id, slot), data))
                    .collect();
                self.pos = 0;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Iterator for TableIterator {
    type Item = Result<(Rid, Vec<u8>), HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buffered.len() {
            match self.load_next_page() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
        let item = self.buffered[self.pos].clone();
        self.pos += 1;
        Some(Ok(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_heap() -> (Arc<BufferPoolManager>, TableHeap, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let pool = Arc::new(BufferPoolManager::new(16, 2, file.path()).unwrap());
        let heap = TableHeap::new(pool.clone()).unwrap();
        (pool, heap, file)
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let (_pool, heap, _file) = test_heap();
        let rid = heap.insert_tuple(b"hello").unwrap();
        assert_eq!(heap.get_tuple(rid).unwrap(), b"hello");
    }

    #[test]
    fn test_delete_and_scan() {
        let (_pool, heap, _file) = test_heap();
        let rids: Vec<Rid> =
            (0..10).map(|i| heap.insert_tuple(format!("row-{i}").as_bytes()).unwrap()).collect();

        assert!(heap.mark_delete(rids[3]).unwrap());
        assert!(!heap.mark_delete(rids[3]).unwrap());
        assert!(heap.get_tuple(rids[3]).is_err());

        let remaining: Vec<_> = heap.iter().map(|r| r.unwrap()).collect();
        assert_eq!(remaining.len(), 9);
        assert!(remaining.iter().all(|(rid, _)| *rid != rids[3]));
    }

    #[test]
    fn test_spills_across_pages() {
        let (_pool, heap, _file) = test_heap();
        let blob = vec![42u8; 900];
        let mut rids = Vec::new();
        for _ in 0..20 {
            rids.push(heap.insert_tuple(&blob).unwrap());
        }
        // 4KB pages cannot hold twenty 900-byte tuples on one page.
        assert!(rids.iter().any(|r| r.page_id != rids[0].page_id));
        let scanned: Vec<_> = heap.iter().map(|r| r.unwrap()).collect();
        assert_eq!(scanned.len(), 20);
        for (_, data) in scanned {
            assert_eq!(data, blob);
        }
    }
}
