use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::common::types::{Frame, FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruKReplacer;
use crate::storage::disk::DiskManager;
use crate::storage::hash::ExtendibleHashTable;

/// Bucket capacity of the extendible-hash page table.
const PAGE_TABLE_BUCKET_SIZE: usize = 8;

struct PoolState {
    frames: Vec<Frame>,
    free_list: VecDeque<FrameId>,
}

/// Fixed-size buffer pool over a paged disk file.
///
/// Frame bookkeeping (pin counts, dirty bits, free list) sits behind one
/// mutex held for the duration of each operation; the page table and the
/// LRU-K replacer are internally synchronized and only ever mutated under
/// that mutex. Page bytes live behind per-page RwLocks handed out as
/// `PagePtr`s, which callers latch independently of the pool.
pub struct BufferPoolManager {
    pool_size: usize,
    pages: Vec<PagePtr>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
    disk_manager: Arc<DiskManager>,
    state: Mutex<PoolState>,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        replacer_k: usize,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Self::with_disk_manager(pool_size, replacer_k, disk_manager)
    }

    pub fn with_disk_manager(
        pool_size: usize,
        replacer_k: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Result<Self, BufferPoolError> {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            pages.push(Arc::new(parking_lot::RwLock::new(Page::new(INVALID_PAGE_ID))));
            free_list.push_back(i as FrameId);
        }

        Ok(Self {
            pool_size,
            pages,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            disk_manager,
            state: Mutex::new(PoolState { frames: vec![Frame::empty(); pool_size], free_list }),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Allocate a brand-new page, pin it and return it zero-filled.
    /// Fails with `BufferPoolFull` only when every frame is pinned.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = self.disk_manager.allocate_page()?;
        {
            let mut page = self.pages[frame_id as usize].write();
            page.reset(page_id);
        }
        state.frames[frame_id as usize] =
            Frame { page_id, pin_count: 1, is_dirty: false };

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok((self.pages[frame_id as usize].clone(), page_id))
    }

    /// Fetch a page, reading it from disk unless already resident.
    /// Fails with `BufferPoolFull` only when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "cannot fetch the invalid page id".to_string(),
            ));
        }

        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            state.frames[frame_id as usize].pin_count += 1;
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(self.pages[frame_id as usize].clone());
        }

        let frame_id = self.acquire_frame(&mut state)?;
        {
            let mut page = self.pages[frame_id as usize].write();
            page.reset(page_id);
            self.disk_manager.read_page(page_id, &mut page)?;
        }
        state.frames[frame_id as usize] =
            Frame { page_id, pin_count: 1, is_dirty: false };

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(self.pages[frame_id as usize].clone())
    }

    /// Drop one pin on a page, recording whether the caller dirtied it.
    /// The frame becomes evictable when its pin count reaches zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let frame_id = self
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &mut state.frames[frame_id as usize];
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }
        frame.is_dirty |= is_dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        Ok(())
    }

    /// Unconditionally write a resident page through to disk.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let frame_id = self
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        {
            let page = self.pages[frame_id as usize].read();
            self.disk_manager.write_page(&page)?;
        }
        state.frames[frame_id as usize].is_dirty = false;
        Ok(())
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        for frame_id in 0..self.pool_size {
            if state.frames[frame_id].page_id == INVALID_PAGE_ID {
                continue;
            }
            {
                let page = self.pages[frame_id].read();
                self.disk_manager.write_page(&page)?;
            }
            state.frames[frame_id].is_dirty = false;
        }
        Ok(())
    }

    /// Remove a page from the pool and return its disk space. Deleting a
    /// non-resident page succeeds trivially; deleting a pinned page fails.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let frame_id = match self.page_table.find(&page_id) {
            Some(f) => f,
            None => return Ok(()),
        };

        if state.frames[frame_id as usize].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        state.frames[frame_id as usize] = Frame::empty();
        {
            let mut page = self.pages[frame_id as usize].write();
            page.reset(INVALID_PAGE_ID);
        }
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    /// Pick a frame for a new resident page: free list first, then the
    /// replacer. An evicted frame's dirty page is written back before the
    /// frame is reused.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(BufferPoolError::BufferPoolFull)?;
        let frame = state.frames[frame_id as usize];
        if frame.page_id != INVALID_PAGE_ID {
            if frame.is_dirty {
                log::trace!("writing back page {} evicted from frame {}", frame.page_id, frame_id);
                let page = self.pages[frame_id as usize].read();
                self.disk_manager.write_page(&page)?;
            }
            self.page_table.remove(&frame.page_id);
        }
        state.frames[frame_id as usize] = Frame::empty();
        Ok(frame_id)
    }
}
