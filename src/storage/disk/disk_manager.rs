use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use log::info;
use parking_lot::RwLock;

use crate::common::{DiskOp, PageId, Result, StorageError, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from disk.
/// It manages a single database file and tracks the number of pages allocated.
///
/// Page `i` lives at byte range `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`; there is
/// no file header. Reads share the file latch, writes and syncs take it
/// exclusively, and allocation only touches the atomic page counter.
pub struct DiskManager {
    /// The database file
    db_file: RwLock<File>,
    /// Path to the database file
    db_path: String,
    /// One past the highest allocated or written page
    num_pages: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Creates a new DiskManager for the given database file path.
    /// Creates the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        info!("opened {} with {} pages", path_str, num_pages);

        Ok(Self {
            db_file: RwLock::new(file),
            db_path: path_str,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes. Pages at or beyond the
    /// current page count are rejected; a short read is an error and the
    /// buffer contents are then unspecified.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        check_buffer(data.len())?;

        let file = self.db_file.read();

        let num_pages = self.num_pages.load(Ordering::Acquire);
        if !page_id.is_valid() || page_id.as_u32() >= num_pages {
            return Err(StorageError::ReadPastEnd { page_id, num_pages });
        }

        read_exact_at(&file, data, page_id.offset()).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => StorageError::ShortRead { page_id },
            _ => StorageError::PageIo {
                op: DiskOp::Read,
                page_id,
                source: e,
            },
        })?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes. Writing at or past the end
    /// grows the page count to `page_id + 1`.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        self.write_page_as(DiskOp::Write, page_id, data)
    }

    fn write_page_as(&self, op: DiskOp, page_id: PageId, data: &[u8]) -> Result<()> {
        check_buffer(data.len())?;
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let file = self.db_file.write();
        write_all_at(&file, data, page_id.offset()).map_err(|source| StorageError::PageIo {
            op,
            page_id,
            source,
        })?;

        // Still under the exclusive latch, so readers see the new extent only
        // once the bytes are in the file.
        self.num_pages
            .fetch_max(page_id.as_u32() + 1, Ordering::AcqRel);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Reserves the next sequential page ID. No I/O is performed: the page
    /// becomes readable once something is written to it (or to a later page).
    pub fn allocate_page(&self) -> PageId {
        PageId::new(self.num_pages.fetch_add(1, Ordering::AcqRel))
    }

    /// Deallocates a page by overwriting it with zeros. The file never
    /// shrinks and the page ID is not reused.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let zeros = [0u8; PAGE_SIZE];
        self.write_page_as(DiskOp::Deallocate, page_id, &zeros)
    }

    /// Returns the number of pages currently allocated.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Acquire)
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }

    /// Forces all written pages to durable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.write();
        file.sync_all().map_err(|source| StorageError::PageIo {
            op: DiskOp::Sync,
            page_id: crate::common::INVALID_PAGE_ID,
            source,
        })
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        // Ensure all data is flushed to disk
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}

fn check_buffer(len: usize) -> Result<()> {
    if len != PAGE_SIZE {
        return Err(StorageError::InvalidBufferSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
