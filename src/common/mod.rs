// Common Types Module
//
// Shared type aliases, the page representation and configuration
// constants used across the storage, index and transaction layers.

pub mod types;

pub use types::{
    Frame, FrameId, Page, PageId, PagePtr, Rid, TableOid, TxnId, HEADER_PAGE_ID, INVALID_PAGE_ID,
    INVALID_TXN_ID, PAGE_SIZE,
};
