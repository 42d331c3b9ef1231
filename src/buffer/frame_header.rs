use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, Lsn, PageId, INVALID_LSN, INVALID_PAGE_ID, PAGE_SIZE};

/// Page bytes of one frame behind their own latch.
pub type PageData = Box<[u8; PAGE_SIZE]>;

/// One slot of the buffer pool.
///
/// Pin count, dirty flag and LSN are atomics, so pinning never touches the
/// data latch. The latch is shared through an `Arc` so that page guards can
/// own their lock.
pub struct FrameHeader {
    frame_id: FrameId,
    /// INVALID_PAGE_ID while the frame is free
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    /// Highest LSN applied since the last write-back
    lsn: AtomicU64,
    data: Arc<RwLock<PageData>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            lsn: AtomicU64::new(INVALID_LSN),
            data: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Adds a pin, returning the new count.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops a pin, returning the remaining count, or None if there was none.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pins| pins.checked_sub(1))
            .ok()
            .map(|before| before - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    pub fn lsn(&self) -> Lsn {
        self.lsn.load(Ordering::Acquire)
    }

    /// Raises the frame LSN to `lsn` if it is higher.
    pub fn note_lsn(&self, lsn: Lsn) {
        self.lsn.fetch_max(lsn, Ordering::AcqRel);
    }

    /// Copies the bytes and LSN for a write-back and clears the dirty flag,
    /// all under the read latch so no writer lands in between.
    pub(crate) fn snapshot_for_write(&self) -> (Bytes, Lsn) {
        let data = self.data.read();
        self.set_dirty(false);
        (Bytes::copy_from_slice(&data[..]), self.lsn())
    }

    /// Clears the LSN after a write-back, unless a newer change raced in.
    pub(crate) fn clear_lsn_if(&self, written: Lsn) {
        let _ = self
            .lsn
            .compare_exchange(written, INVALID_LSN, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn clear_lsn(&self) {
        self.lsn.store(INVALID_LSN, Ordering::Release);
    }

    pub fn read_data(&self) -> RwLockReadGuard<'_, PageData> {
        self.data.read()
    }

    pub fn write_data(&self) -> RwLockWriteGuard<'_, PageData> {
        self.data.write()
    }

    pub(crate) fn data_latch(&self) -> &Arc<RwLock<PageData>> {
        &self.data
    }

    /// Overwrites the page bytes. `bytes` must be PAGE_SIZE long.
    pub fn load(&self, bytes: &[u8]) {
        self.data.write().copy_from_slice(bytes);
    }

    /// Returns a copy of the page bytes.
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data.read()[..])
    }

    /// Returns the frame to the free state with zeroed bytes.
    pub fn reset(&self) {
        self.set_page_id(INVALID_PAGE_ID);
        self.pin_count.store(0, Ordering::Release);
        self.set_dirty(false);
        self.clear_lsn();
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_frame_is_free() {
        let frame = FrameHeader::new(FrameId::new(7));
        assert_eq!(frame.frame_id(), FrameId::new(7));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert_eq!(frame.lsn(), INVALID_LSN);
        assert!(frame.snapshot().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unpin_stops_at_zero() {
        let frame = FrameHeader::new(FrameId::new(0));

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_lsn_survives_racing_change() {
        let frame = FrameHeader::new(FrameId::new(0));

        frame.note_lsn(10);
        frame.note_lsn(4);
        assert_eq!(frame.lsn(), 10);

        frame.note_lsn(12);
        frame.clear_lsn_if(10);
        assert_eq!(frame.lsn(), 12);

        frame.clear_lsn_if(12);
        assert_eq!(frame.lsn(), INVALID_LSN);
    }

    #[test]
    fn test_snapshot_for_write_clears_dirty() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.write_data()[PAGE_SIZE - 1] = 0xEE;
        frame.set_dirty(true);
        frame.note_lsn(6);

        let (bytes, lsn) = frame.snapshot_for_write();
        assert_eq!(bytes.len(), PAGE_SIZE);
        assert_eq!(bytes[PAGE_SIZE - 1], 0xEE);
        assert_eq!(lsn, 6);
        assert!(!frame.is_dirty());
        // The LSN stays until the write is known to have landed
        assert_eq!(frame.lsn(), 6);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_page_id(PageId::new(5));
        frame.pin();
        frame.set_dirty(true);
        frame.note_lsn(3);
        frame.load(&[1u8; PAGE_SIZE]);

        frame.reset();

        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert_eq!(frame.lsn(), INVALID_LSN);
        assert_eq!(frame.read_data()[0], 0);
    }
}
