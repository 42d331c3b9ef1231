//! Bufstore - the page storage layer of a disk-oriented RDBMS
//!
//! This crate turns a flat file of fixed-size pages into a cached,
//! concurrency-safe working set for the layers above it (catalog, executor,
//! transaction manager). It knows nothing about what the bytes of a page mean.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Raw page I/O
//!   - `DiskManager`: Reads, writes, allocates and deallocates pages in one file
//!   - `DiskScheduler`: Background worker threads that perform page I/O
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in frames
//!   - `Replacer`: Victim selection, with `LruKReplacer` and `ClockReplacer`
//!   - `FrameHeader`: Per-frame metadata and data storage
//!   - `PinnedPage`, `ReadPageGuard`, `WritePageGuard`: pinned page handles
//!
//! - **Recovery** (`recovery`): The durability boundary with the write-ahead
//!   log that dirty write-backs must respect
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bufstore::buffer::BufferPoolManager;
//! use bufstore::storage::disk::DiskManager;
//!
//! // Create a disk manager for a database file
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//!
//! // Create a buffer pool with 100 frames and LRU-2 replacement
//! let bpm = BufferPoolManager::new(100, 2, disk_manager);
//!
//! // Allocate a new page and write to it
//! let page_id = {
//!     let mut guard = bpm.new_page_guarded().unwrap();
//!     guard.data_mut()[..5].copy_from_slice(b"hello");
//!     guard.page_id()
//! };
//!
//! // Flush changes to disk
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod recovery;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{Lsn, PageId, Result, StorageError, TupleId, PAGE_SIZE};
