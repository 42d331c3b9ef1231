use std::fmt;

use thiserror::Error;

use super::types::PageId;

/// Page-level disk operation, carried by I/O errors to say what failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOp {
    Read,
    Write,
    Deallocate,
    Sync,
}

impl fmt::Display for DiskOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiskOp::Read => "read",
            DiskOp::Write => "write",
            DiskOp::Deallocate => "deallocate",
            DiskOp::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The page file could not be read, written or synced
    Io,
    /// Every frame is pinned
    PoolExhausted,
    /// The caller broke the pin/unpin or residency contract
    Usage,
    /// Invalid configuration
    Config,
}

/// Storage layer error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {op} of page {page_id} failed: {source}")]
    PageIo {
        op: DiskOp,
        page_id: PageId,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: read of page {page_id} past end of file ({num_pages} pages)")]
    ReadPastEnd { page_id: PageId, num_pages: u32 },

    #[error("I/O error: short read of page {page_id}")]
    ShortRead { page_id: PageId },

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Buffer pool is full, no evictable frame for page {page_id}")]
    BufferPoolFull { page_id: PageId },

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Buffer must be {expected} bytes, got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Io(_)
            | StorageError::PageIo { .. }
            | StorageError::ReadPastEnd { .. }
            | StorageError::ShortRead { .. }
            | StorageError::DiskScheduler(_) => ErrorKind::Io,
            StorageError::BufferPoolFull { .. } => ErrorKind::PoolExhausted,
            StorageError::InvalidPageId(_)
            | StorageError::PageNotResident(_)
            | StorageError::PageNotPinned(_)
            | StorageError::PageStillPinned(_)
            | StorageError::InvalidBufferSize { .. } => ErrorKind::Usage,
            StorageError::Config(_) => ErrorKind::Config,
        }
    }

    /// The page the failed operation was about, if any.
    pub fn page_id(&self) -> Option<PageId> {
        match self {
            StorageError::PageIo { page_id, .. }
            | StorageError::ReadPastEnd { page_id, .. }
            | StorageError::ShortRead { page_id }
            | StorageError::BufferPoolFull { page_id } => Some(*page_id),
            StorageError::InvalidPageId(page_id)
            | StorageError::PageNotResident(page_id)
            | StorageError::PageNotPinned(page_id)
            | StorageError::PageStillPinned(page_id) => Some(*page_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        assert_eq!(StorageError::from(io).kind(), ErrorKind::Io);
        assert_eq!(
            StorageError::ShortRead {
                page_id: PageId::new(1)
            }
            .kind(),
            ErrorKind::Io
        );
        assert_eq!(
            StorageError::BufferPoolFull {
                page_id: PageId::new(2)
            }
            .kind(),
            ErrorKind::PoolExhausted
        );
        assert_eq!(
            StorageError::PageNotPinned(PageId::new(3)).kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn test_error_display_names_operation_and_page() {
        let err = StorageError::PageIo {
            op: DiskOp::Write,
            page_id: PageId::new(9),
            source: std::io::Error::new(std::io::ErrorKind::Other, "no space"),
        };
        assert_eq!(
            err.to_string(),
            "I/O error: write of page PageId(9) failed: no space"
        );
        assert_eq!(err.page_id(), Some(PageId::new(9)));

        let err = StorageError::ReadPastEnd {
            page_id: PageId::new(4),
            num_pages: 2,
        };
        assert_eq!(
            err.to_string(),
            "I/O error: read of page PageId(4) past end of file (2 pages)"
        );
    }
}
