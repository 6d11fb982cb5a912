use crate::common::types::Page;
use crate::storage::page::error::PageError;
use crate::storage::page::header::{PageHeader, SlotEntry, HEADER_SIZE, SLOT_SIZE};

/// Record-level operations on slotted heap pages. Record data grows from
/// just past the header; the slot directory grows from the page tail.
pub struct PageManager;

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager {
    pub fn new() -> Self {
        Self
    }

    pub fn init_page(&self, page: &mut Page) {
        let header = PageHeader::new();
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn get_header(&self, page: &Page) -> PageHeader {
        PageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn set_header(&self, page: &mut Page, header: &PageHeader) {
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    /// Insert a record, returning its slot number.
    pub fn insert_record(&self, page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        let mut header = self.get_header(page);

        let record_size = data.len() as u32;
        let needed = record_size + SLOT_SIZE as u32;
        if header.free_space_size < needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.slot_count;
        let slot_pos = self.slot_position(slot);
        let entry = SlotEntry { offset: header.free_space_offset, length: record_size };

        let start = header.free_space_offset as usize;
        page.data[start..start + data.len()].copy_from_slice(data);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&entry.to_bytes());

        header.free_space_offset += record_size;
        header.free_space_size -= needed;
        header.slot_count += 1;
        self.set_header(page, &header);

        Ok(slot)
    }

    /// Read a live record by slot number.
    pub fn get_record(&self, page: &Page, slot: u32) -> Result<Vec<u8>, PageError> {
        let entry = self.slot_entry(page, slot)?;
        if entry.is_deleted() {
            return Err(PageError::RecordNotFound);
        }
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        Ok(page.data[start..end].to_vec())
    }

    /// Mark a record deleted by zeroing its slot length. The data space is
    /// reclaimed by offline compaction, not here.
    pub fn delete_record(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let entry = self.slot_entry(page, slot)?;
        if entry.is_deleted() {
            return Err(PageError::RecordNotFound);
        }
        let dead = SlotEntry { offset: entry.offset, length: 0 };
        let slot_pos = self.slot_position(slot);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&dead.to_bytes());
        Ok(())
    }

    /// All live records on the page as (slot, bytes) pairs.
    pub fn live_records(&self, page: &Page) -> Vec<(u32, Vec<u8>)> {
        let header = self.get_header(page);
        let mut records = Vec::new();
        for slot in 0..header.slot_count {
            if let Ok(entry) = self.slot_entry(page, slot) {
                if !entry.is_deleted() {
                    let start = entry.offset as usize;
                    let end = start + entry.length as usize;
                    records.push((slot, page.data[start..end].to_vec()));
                }
            }
        }
        records
    }

    fn slot_entry(&self, page: &Page, slot: u32) -> Result<SlotEntry, PageError> {
        let header = self.get_header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidSlot);
        }
        let slot_pos = self.slot_position(slot);
        Ok(SlotEntry::from_bytes(&page.data[slot_pos..slot_pos + SLOT_SIZE]))
    }

    fn slot_position(&self, slot: u32) -> usize {
        crate::common::types::PAGE_SIZE - SLOT_SIZE * (slot as usize + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Page, PAGE_SIZE};

    #[test]
    fn test_insert_and_get() {
        let manager = PageManager::new();
        let mut page = Page::new(2);
        manager.init_page(&mut page);

        let slot_a = manager.insert_record(&mut page, b"alpha").unwrap();
        let slot_b = manager.insert_record(&mut page, b"bravo").unwrap();
        assert_eq!(slot_a, 0);
        assert_eq!(slot_b, 1);
        assert_eq!(manager.get_record(&page, slot_a).unwrap(), b"alpha");
        assert_eq!(manager.get_record(&page, slot_b).unwrap(), b"bravo");
    }

    #[test]
    fn test_delete_hides_record() {
        let manager = PageManager::new();
        let mut page = Page::new(2);
        manager.init_page(&mut page);

        let slot = manager.insert_record(&mut page, b"gone").unwrap();
        manager.delete_record(&mut page, slot).unwrap();
        assert!(matches!(manager.get_record(&page, slot), Err(PageError::RecordNotFound)));
        assert!(matches!(manager.delete_record(&mut page, slot), Err(PageError::RecordNotFound)));
        assert!(manager.live_records(&page).is_empty());
    }

    #[test]
    fn test_page_fills_up() {
        let manager = PageManager::new();
        let mut page = Page::new(2);
        manager.init_page(&mut page);

        let record = vec![7u8; 512];
        let mut inserted = 0;
        loop {
            match manager.insert_record(&mut page, &record) {
                Ok(_) => inserted += 1,
                Err(PageError::InsufficientSpace) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(inserted > 0);
        assert!(inserted <= PAGE_SIZE / 512);
        assert_eq!(manager.live_records(&page).len(), inserted);
    }
}
