use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::common::{
    BufferPoolConfig, FrameId, Lsn, PageId, Result, StorageError, INVALID_LSN, INVALID_PAGE_ID,
};
use crate::recovery::{LogDurability, NoopLogDurability};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, PinnedPage, ReadPageGuard, Replacer, WritePageGuard};

/// Pool metadata guarded by the pool latch.
struct PoolLatch {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Free list: frames that hold no page
    free_list: VecDeque<FrameId>,
    /// Replacement policy for eviction decisions
    replacer: Box<dyn Replacer>,
    /// Pages whose frame is being written back, filled or deallocated
    in_transit: HashSet<PageId>,
    /// Pages whose bytes are on their way to disk: flush write-backs and
    /// victims from claim until their eviction settles
    writing: HashSet<PageId>,
}

/// Internal state that can be shared across threads
struct BufferPoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// Single latch over the page table, free list, replacer and transit set
    latch: Mutex<PoolLatch>,
    /// Signalled whenever a page leaves the transit or writing set
    transit_done: Condvar,
}

impl BufferPoolState {
    fn frame(&self, frame_id: FrameId) -> &Arc<FrameHeader> {
        &self.frames[frame_id.as_usize()]
    }

    /// Blocks until `page_id` is not in transit.
    fn wait_for_transit(&self, latch: &mut MutexGuard<'_, PoolLatch>, page_id: PageId) {
        while latch.in_transit.contains(&page_id) {
            self.transit_done.wait(latch);
        }
    }

    /// Blocks until `page_id` is neither in transit nor being written.
    fn wait_until_settled(&self, latch: &mut MutexGuard<'_, PoolLatch>, page_id: PageId) {
        while latch.in_transit.contains(&page_id) || latch.writing.contains(&page_id) {
            self.transit_done.wait(latch);
        }
    }

    fn end_write(&self, page_id: PageId) {
        let mut latch = self.latch.lock();
        latch.writing.remove(&page_id);
        self.transit_done.notify_all();
    }

    /// Pins a resident frame and takes it out of victim selection.
    fn pin_resident(&self, latch: &mut PoolLatch, frame_id: FrameId, is_access: bool) {
        self.frame(frame_id).pin();
        if is_access {
            latch.replacer.record_access(frame_id);
        }
        latch.replacer.set_evictable(frame_id, false);
    }

    /// Drops the pin a flush took and ends its write.
    fn release_flush(&self, frame_id: FrameId, page_id: PageId) {
        let mut latch = self.latch.lock();
        if let Some(0) = self.frame(frame_id).unpin() {
            latch.replacer.set_evictable(frame_id, true);
        }
        latch.writing.remove(&page_id);
        self.transit_done.notify_all();
    }

    fn unpin(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let mut latch = self.latch.lock();

        let frame_id = *latch
            .page_table
            .get(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;
        let frame = self.frame(frame_id);

        let remaining = frame
            .unpin()
            .ok_or(StorageError::PageNotPinned(page_id))?;
        if is_dirty {
            frame.set_dirty(true);
        }
        if remaining == 0 {
            latch.replacer.set_evictable(frame_id, true);
        }
        Ok(())
    }

    fn unpin_callback(
        state: &Arc<Self>,
    ) -> Box<dyn FnOnce(PageId, bool) -> Result<()> + Send + Sync> {
        let state = Arc::clone(state);
        Box::new(move |page_id, is_dirty| state.unpin(page_id, is_dirty))
    }

    fn release_callback(
        state: &Arc<Self>,
    ) -> Box<dyn FnOnce(PageId, bool) + Send + Sync> {
        let state = Arc::clone(state);
        Box::new(move |page_id, is_dirty| {
            if let Err(e) = state.unpin(page_id, is_dirty) {
                warn!("releasing guard for {} failed: {}", page_id, e);
            }
        })
    }
}

/// A frame taken for a page fault, pinned by the faulting thread and in
/// nobody's page table entry until the fault completes.
struct FrameClaim {
    frame_id: FrameId,
    /// Page previously held by the frame, if it was taken from the replacer
    victim: Option<PageId>,
}

/// Snapshot of one resident frame's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub pin_count: u32,
    pub is_dirty: bool,
    pub lsn: Lsn,
}

/// BufferPoolManager is responsible for fetching database pages from disk
/// and storing them in memory. It manages a fixed number of frames and asks a
/// [`Replacer`] which unpinned frame to recycle when none is free.
///
/// Metadata (page table, free list, replacer) lives under one pool latch that
/// is never held across disk I/O or a wait on the log. While a frame is being
/// written back or filled, the page ids involved are in transit: requests for
/// them wait until the fault finishes instead of reading a stale page file.
///
/// A request that finds every frame pinned fails with
/// [`StorageError::BufferPoolFull`]; it does not wait for an unpin.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state
    state: Arc<BufferPoolState>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
    /// Durability boundary checked before any dirty write-back
    log: Arc<dyn LogDurability>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for LRU-K,
    /// and disk manager. The log is treated as always durable.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::build(
            pool_size,
            Box::new(LruKReplacer::new(k, pool_size)),
            DiskScheduler::new(disk_manager),
            Arc::new(NoopLogDurability),
        )
    }

    /// Creates a BufferPoolManager from a validated config and log boundary.
    pub fn with_config(
        config: &BufferPoolConfig,
        disk_manager: Arc<DiskManager>,
        log: Arc<dyn LogDurability>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(
            config.pool_size,
            config.replacer.build(config.pool_size),
            DiskScheduler::with_workers(disk_manager, config.disk_workers),
            log,
        ))
    }

    fn build(
        pool_size: usize,
        replacer: Box<dyn Replacer>,
        disk_scheduler: DiskScheduler,
        log: Arc<dyn LogDurability>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            latch: Mutex::new(PoolLatch {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
                replacer,
                in_transit: HashSet::new(),
                writing: HashSet::new(),
            }),
            transit_done: Condvar::new(),
        });

        Self {
            pool_size,
            state,
            disk_scheduler,
            log,
        }
    }

    /// Fetches a page and pins it, reading it from disk on a miss.
    /// The caller must balance this with one [`PinnedPage::unpin`] or
    /// [`unpin_page`](Self::unpin_page).
    pub fn fetch_page(&self, page_id: PageId) -> Result<PinnedPage> {
        let frame_id = self.pin_page(page_id)?;
        Ok(PinnedPage::new(
            page_id,
            Arc::clone(self.state.frame(frame_id)),
            BufferPoolState::unpin_callback(&self.state),
        ))
    }

    /// Drops one pin on a resident page, marking it dirty if `is_dirty`.
    /// The frame becomes evictable when its last pin goes.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        self.state.unpin(page_id, is_dirty)
    }

    /// Allocates a new page and pins it in a zeroed frame without reading
    /// from disk. The frame starts dirty so its first eviction writes it out.
    pub fn new_page(&self) -> Result<(PageId, PinnedPage)> {
        let (page_id, frame_id) = self.create_page()?;
        Ok((
            page_id,
            PinnedPage::new(
                page_id,
                Arc::clone(self.state.frame(frame_id)),
                BufferPoolState::unpin_callback(&self.state),
            ),
        ))
    }

    /// Allocates a new page and returns a write guard on it.
    pub fn new_page_guarded(&self) -> Result<WritePageGuard> {
        let (page_id, frame_id) = self.create_page()?;
        Ok(WritePageGuard::new(
            page_id,
            Arc::clone(self.state.frame(frame_id)),
            BufferPoolState::release_callback(&self.state),
        ))
    }

    /// Fetches a page for read access. The guard unpins it when dropped.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.pin_page(page_id)?;
        Ok(ReadPageGuard::new(
            page_id,
            Arc::clone(self.state.frame(frame_id)),
            BufferPoolState::release_callback(&self.state),
        ))
    }

    /// Fetches a page for write access. The guard unpins it when dropped and
    /// reports it dirty if its bytes were borrowed mutably.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.pin_page(page_id)?;
        Ok(WritePageGuard::new(
            page_id,
            Arc::clone(self.state.frame(frame_id)),
            BufferPoolState::release_callback(&self.state),
        ))
    }

    /// Writes a resident page to disk whatever its pin count, and clears its
    /// dirty flag. The page stays resident and keeps its pins.
    ///
    /// Takes the page's read latch to copy the bytes, so it waits for any
    /// write guard on the page and deadlocks if the caller holds one.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId(page_id));
        }
        self.flush_resident(page_id, false)?
            .map(|_| ())
            .ok_or(StorageError::PageNotResident(page_id))
    }

    /// Flushes every resident dirty page, then syncs the page file.
    ///
    /// Write-backs already in flight when the checkpoint starts, from
    /// `flush_page` or an eviction, are waited for; a page whose write failed
    /// is dirty again and gets flushed here. Blocks on any page whose write
    /// latch is held, including by the caller.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut pending: Vec<PageId> = {
            let latch = self.state.latch.lock();
            latch
                .page_table
                .iter()
                .filter(|&(_, &frame_id)| self.state.frame(frame_id).is_dirty())
                .map(|(&page_id, _)| page_id)
                .chain(latch.writing.iter().copied())
                .collect()
        };
        pending.sort_unstable();
        pending.dedup();

        let mut flushed = 0;
        for page_id in pending {
            // Not resident once settled: its eviction wrote it
            if let Some(true) = self.flush_resident(page_id, true)? {
                flushed += 1;
            }
        }
        debug!("checkpoint flushed {} dirty pages", flushed);

        self.disk_scheduler.disk_manager().sync()
    }

    /// Deletes a page from the buffer pool and deallocates it on disk.
    /// Fails if the page is resident and pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let disk_manager = self.disk_scheduler.disk_manager();
        if !page_id.is_valid() || page_id.as_u32() >= disk_manager.get_num_pages() {
            return Err(StorageError::InvalidPageId(page_id));
        }

        {
            let mut latch = self.state.latch.lock();
            self.state.wait_for_transit(&mut latch, page_id);

            if let Some(&frame_id) = latch.page_table.get(&page_id) {
                let frame = self.state.frame(frame_id);
                if frame.pin_count() > 0 {
                    return Err(StorageError::PageStillPinned(page_id));
                }

                latch.page_table.remove(&page_id);
                latch.replacer.remove(frame_id);
                frame.reset();
                latch.free_list.push_back(frame_id);
            }
            latch.in_transit.insert(page_id);
        }

        let result = disk_manager.deallocate_page(page_id);

        let mut latch = self.state.latch.lock();
        latch.in_transit.remove(&page_id);
        self.state.transit_done.notify_all();

        debug!("deleted {}", page_id);
        result
    }

    /// Returns the pin count for a page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        self.frame_info(page_id).map(|info| info.pin_count)
    }

    /// Pin count, dirty flag and LSN of a resident page.
    pub fn frame_info(&self, page_id: PageId) -> Option<FrameInfo> {
        let latch = self.state.latch.lock();
        latch.page_table.get(&page_id).map(|&frame_id| {
            let frame = self.state.frame(frame_id);
            FrameInfo {
                frame_id,
                pin_count: frame.pin_count(),
                is_dirty: frame.is_dirty(),
                lsn: frame.lsn(),
            }
        })
    }

    /// Resident dirty pages with their LSNs, ordered by page id.
    pub fn dirty_pages(&self) -> Vec<(PageId, Lsn)> {
        let latch = self.state.latch.lock();
        let mut dirty: Vec<_> = latch
            .page_table
            .iter()
            .map(|(&page_id, &frame_id)| (page_id, self.state.frame(frame_id)))
            .filter(|(_, frame)| frame.is_dirty())
            .map(|(page_id, frame)| (page_id, frame.lsn()))
            .collect();
        dirty.sort_unstable();
        dirty
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.latch.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.latch.lock().free_list.len()
    }

    /// Returns the number of frames the replacer may evict.
    pub fn evictable_count(&self) -> usize {
        self.state.latch.lock().replacer.size()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins `page_id` in a frame and returns the frame.
    /// If the page is already in the pool, returns its current frame.
    /// Otherwise, evicts a page if necessary and reads the page from disk.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let claim = {
            let mut latch = self.state.latch.lock();
            self.state.wait_for_transit(&mut latch, page_id);

            if let Some(&frame_id) = latch.page_table.get(&page_id) {
                self.state.pin_resident(&mut latch, frame_id, true);
                trace!("hit {} in {}", page_id, frame_id);
                return Ok(frame_id);
            }

            let claim = self.claim_frame(&mut latch, page_id)?;
            latch.in_transit.insert(page_id);
            claim
        };

        let data = self
            .evict_victim(&claim)
            .and_then(|()| self.disk_scheduler.schedule_read_sync(page_id));
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                self.abort_claim(&claim, page_id);
                return Err(e);
            }
        };

        let frame = self.state.frame(claim.frame_id);
        frame.load(&data);
        frame.set_dirty(false);
        self.install(&claim, page_id);

        debug!("faulted in {} to {}", page_id, claim.frame_id);
        Ok(claim.frame_id)
    }

    /// Allocates a page id and installs it in a zeroed, pinned, dirty frame.
    fn create_page(&self) -> Result<(PageId, FrameId)> {
        let (claim, page_id) = {
            let mut latch = self.state.latch.lock();
            let claim = self.claim_frame(&mut latch, INVALID_PAGE_ID)?;
            let page_id = self.disk_scheduler.disk_manager().allocate_page();
            latch.in_transit.insert(page_id);
            (claim, page_id)
        };

        if let Err(e) = self.evict_victim(&claim) {
            // The id stays allocated since page ids are never reused
            self.abort_claim(&claim, page_id);
            return Err(e);
        }

        let frame = self.state.frame(claim.frame_id);
        frame.write_data().fill(0);
        frame.set_dirty(true);
        self.install(&claim, page_id);

        debug!("created {} in {}", page_id, claim.frame_id);
        Ok((page_id, claim.frame_id))
    }

    /// Takes a frame from the free list, else from the replacer. A victim's
    /// page leaves the page table and enters transit until the fault
    /// completes, and stays in the writing set until its eviction settles.
    /// The claimed frame carries one pin for the faulting thread.
    fn claim_frame(&self, latch: &mut PoolLatch, wanted: PageId) -> Result<FrameClaim> {
        let claim = if let Some(frame_id) = latch.free_list.pop_front() {
            FrameClaim {
                frame_id,
                victim: None,
            }
        } else if let Some(frame_id) = latch.replacer.evict() {
            let old_page_id = self.state.frame(frame_id).page_id();
            latch.page_table.remove(&old_page_id);
            latch.in_transit.insert(old_page_id);
            latch.writing.insert(old_page_id);
            FrameClaim {
                frame_id,
                victim: Some(old_page_id),
            }
        } else {
            debug!("no evictable frame for {}", wanted);
            return Err(StorageError::BufferPoolFull { page_id: wanted });
        };

        self.state.frame(claim.frame_id).pin();
        Ok(claim)
    }

    /// Writes the claimed frame's old page back if it is dirty. On failure
    /// the victim stays in the writing set until `abort_claim` restores it.
    fn evict_victim(&self, claim: &FrameClaim) -> Result<()> {
        let Some(old_page_id) = claim.victim else {
            return Ok(());
        };
        let frame = self.state.frame(claim.frame_id);
        if frame.is_dirty() {
            debug!("evicting dirty {} from {}", old_page_id, claim.frame_id);
            self.write_back(frame, old_page_id)?;
        } else {
            trace!("evicting clean {} from {}", old_page_id, claim.frame_id);
        }
        self.state.end_write(old_page_id);
        Ok(())
    }

    /// Writes a frame's bytes to its page once the log covers the frame LSN.
    /// The dirty flag is cleared at copy time and restored if the write fails.
    fn write_back(&self, frame: &FrameHeader, page_id: PageId) -> Result<()> {
        let (data, lsn) = frame.snapshot_for_write();

        if lsn != INVALID_LSN && self.log.durable_lsn() < lsn {
            debug!("write-back of {} waits for log up to {}", page_id, lsn);
        }
        let result = self
            .log
            .wait_for(lsn)
            .and_then(|()| self.disk_scheduler.schedule_write_sync(page_id, data));

        match result {
            Ok(()) => {
                frame.clear_lsn_if(lsn);
                Ok(())
            }
            Err(e) => {
                frame.set_dirty(true);
                warn!("write-back of {} failed: {}", page_id, e);
                Err(e)
            }
        }
    }

    /// Flushes a resident page once any earlier write of it has settled.
    /// Returns None if it is not resident and Some(false) if `only_dirty` is
    /// set and the page was clean.
    fn flush_resident(&self, page_id: PageId, only_dirty: bool) -> Result<Option<bool>> {
        let frame_id = {
            let mut latch = self.state.latch.lock();
            self.state.wait_until_settled(&mut latch, page_id);

            let Some(&frame_id) = latch.page_table.get(&page_id) else {
                return Ok(None);
            };
            if only_dirty && !self.state.frame(frame_id).is_dirty() {
                return Ok(Some(false));
            }
            // Pinned for the duration of the write so it cannot be evicted
            self.state.pin_resident(&mut latch, frame_id, false);
            latch.writing.insert(page_id);
            frame_id
        };

        let result = self.write_back(self.state.frame(frame_id), page_id);
        self.state.release_flush(frame_id, page_id);
        result.map(|()| Some(true))
    }

    /// Publishes a completed fault: the page becomes resident and pinned.
    fn install(&self, claim: &FrameClaim, page_id: PageId) {
        let frame = self.state.frame(claim.frame_id);
        frame.set_page_id(page_id);
        frame.clear_lsn();

        let mut latch = self.state.latch.lock();
        if let Some(old_page_id) = claim.victim {
            latch.in_transit.remove(&old_page_id);
        }
        latch.in_transit.remove(&page_id);
        latch.page_table.insert(page_id, claim.frame_id);
        latch.replacer.record_access(claim.frame_id);
        latch.replacer.set_evictable(claim.frame_id, false);
        self.state.transit_done.notify_all();
    }

    /// Undoes a failed fault. A victim frame still holds its old bytes (the
    /// new page is only copied in after every I/O succeeded), so it goes back
    /// into the page table as an evictable frame; a free frame returns to the
    /// free list.
    fn abort_claim(&self, claim: &FrameClaim, page_id: PageId) {
        let frame = self.state.frame(claim.frame_id);
        frame.unpin();

        let mut latch = self.state.latch.lock();
        latch.in_transit.remove(&page_id);
        match claim.victim {
            Some(old_page_id) => {
                latch.in_transit.remove(&old_page_id);
                latch.writing.remove(&old_page_id);
                latch.page_table.insert(old_page_id, claim.frame_id);
                latch.replacer.record_access(claim.frame_id);
                latch.replacer.set_evictable(claim.frame_id, true);
            }
            None => latch.free_list.push_front(claim.frame_id),
        }
        self.state.transit_done.notify_all();
    }
}
