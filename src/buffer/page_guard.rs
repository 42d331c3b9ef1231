use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, Lsn, PageId, Result};

use super::{FrameHeader, PageData};

/// Callback type for releasing a page guard
type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Callback that drops the pin behind a [`PinnedPage`]
type UnpinCallback = Box<dyn FnOnce(PageId, bool) -> Result<()> + Send + Sync>;

/// A pinned page without a held latch.
///
/// Returned by `fetch_page` and `new_page`. The caller owes exactly one
/// unpin for it. [`unpin`](Self::unpin) consumes the handle so the frame
/// cannot be touched afterwards; with `unpin_page` the caller must drop the
/// handle itself. Latch the bytes with [`read`](Self::read) or
/// [`write`](Self::write) for each access; an LSN for a change must be noted
/// before its write latch is released.
pub struct PinnedPage {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    unpin: UnpinCallback,
}

impl std::fmt::Debug for PinnedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedPage")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .finish_non_exhaustive()
    }
}

impl PinnedPage {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, unpin: UnpinCallback) -> Self {
        Self {
            page_id,
            frame,
            unpin,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }

    /// Shared latch on the page bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, PageData> {
        self.frame.read_data()
    }

    /// Exclusive latch on the page bytes. Report the change by unpinning
    /// with `is_dirty` set.
    pub fn write(&self) -> RwLockWriteGuard<'_, PageData> {
        self.frame.write_data()
    }

    /// Records the LSN of the log record describing a change to this page.
    pub fn note_lsn(&self, lsn: Lsn) {
        self.frame.note_lsn(lsn);
    }

    /// Drops this handle's pin, marking the page dirty if `is_dirty`.
    pub fn unpin(self, is_dirty: bool) -> Result<()> {
        (self.unpin)(self.page_id, is_dirty)
    }
}

/// Base page guard that manages the common functionality
struct PageGuardBase {
    /// The page ID being guarded
    page_id: PageId,
    /// Reference to the frame header (kept alive for the guard's lifetime)
    frame: Arc<FrameHeader>,
    /// Callback to release the guard
    release_callback: Option<ReleaseCallback>,
    /// Whether the page was marked dirty
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn drop_impl(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard for read-only access to a page.
/// Holds the shared data latch and unpins the page when dropped.
pub struct ReadPageGuard {
    base: PageGuardBase,
    /// Read latch on the page data
    data_guard: Option<ArcRwLockReadGuard<RawRwLock, PageData>>,
}

impl ReadPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data_latch().read_arc();

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        match &self.data_guard {
            Some(guard) => &guard[..],
            None => unreachable!("data latch is only released on drop"),
        }
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch before the unpin so an evictable frame is never latched
        self.data_guard.take();
        self.base.drop_impl();
    }
}

/// RAII guard for read-write access to a page.
/// Marks the page dirty on mutable access and unpins it when dropped.
pub struct WritePageGuard {
    base: PageGuardBase,
    /// Write latch on the page data
    data_guard: Option<ArcRwLockWriteGuard<RawRwLock, PageData>>,
}

impl WritePageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data_latch().write_arc();

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        match &self.data_guard {
            Some(guard) => &guard[..],
            None => unreachable!("data latch is only released on drop"),
        }
    }

    /// Returns a mutable reference to the page data.
    /// Automatically marks the page as dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        match &mut self.data_guard {
            Some(guard) => &mut guard[..],
            None => unreachable!("data latch is only released on drop"),
        }
    }

    /// Marks the page dirty without touching its bytes.
    pub fn mark_dirty(&mut self) {
        self.base.is_dirty = true;
    }

    /// Records the LSN of the log record describing this change.
    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.base.is_dirty = true;
        self.base.frame.note_lsn(lsn);
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Drop the data guard first to release the lock
        self.data_guard.take();
        // Then call the release callback
        self.base.drop_impl();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PAGE_SIZE;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_read_page_guard() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        frame.load(&data);

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();

        let guard = ReadPageGuard::new(
            PageId::new(1),
            frame.clone(),
            Box::new(move |_, is_dirty| {
                assert!(!is_dirty);
                released_clone.store(true, Ordering::SeqCst);
            }),
        );

        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard.data()[0], 42);
        assert_eq!(guard[0], 42);
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_write_page_guard() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let released = Arc::new(AtomicBool::new(false));
        let dirty = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        let dirty_clone = dirty.clone();

        let mut guard = WritePageGuard::new(
            PageId::new(1),
            frame.clone(),
            Box::new(move |_, is_dirty| {
                released_clone.store(true, Ordering::SeqCst);
                dirty_clone.store(is_dirty, Ordering::SeqCst);
            }),
        );

        guard.data_mut()[0] = 42;
        guard.set_lsn(9);

        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
        assert!(dirty.load(Ordering::SeqCst));
        assert_eq!(frame.lsn(), 9);

        assert_eq!(frame.snapshot()[0], 42);
    }

    #[test]
    fn test_guard_releases_latch_before_callback() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let frame_in_callback = frame.clone();

        let guard = WritePageGuard::new(
            PageId::new(0),
            frame.clone(),
            Box::new(move |_, _| {
                // Would deadlock if the write latch were still held
                assert!(frame_in_callback.data_latch().try_write().is_some());
            }),
        );
        drop(guard);
    }

    #[test]
    fn test_pinned_page_latches() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(3)));
        let dirty = Arc::new(AtomicBool::new(false));
        let dirty_clone = dirty.clone();
        let page = PinnedPage::new(
            PageId::new(8),
            frame.clone(),
            Box::new(move |page_id, is_dirty| {
                assert_eq!(page_id, PageId::new(8));
                dirty_clone.store(is_dirty, Ordering::SeqCst);
                Ok(())
            }),
        );

        page.write()[10] = 0xAB;
        page.note_lsn(5);

        assert_eq!(page.page_id(), PageId::new(8));
        assert_eq!(page.frame_id(), FrameId::new(3));
        assert_eq!(page.read()[10], 0xAB);
        assert_eq!(frame.lsn(), 5);

        page.unpin(true).unwrap();
        assert!(dirty.load(Ordering::SeqCst));
    }

    #[test]
    fn test_pinned_page_unpin_reports_error() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let page = PinnedPage::new(
            PageId::new(2),
            frame,
            Box::new(|page_id, _| Err(crate::common::StorageError::PageNotPinned(page_id))),
        );
        assert!(matches!(
            page.unpin(false),
            Err(crate::common::StorageError::PageNotPinned(_))
        ));
    }
}
