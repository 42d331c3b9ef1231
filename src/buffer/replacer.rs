use crate::common::{FrameId, ReplacerKind};

use super::{ClockReplacer, LruKReplacer};

/// Replacement policy bookkeeping for the buffer pool.
///
/// A replacer only tracks frame ids: which frames may be evicted and in what
/// order. It never sees page bytes and performs no I/O. The buffer pool calls
/// it while holding its latch, so implementations need no locking of their own.
pub trait Replacer: Send {
    /// Records that the given frame was accessed.
    fn record_access(&mut self, frame_id: FrameId);

    /// Sets whether a frame takes part in victim selection.
    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool);

    /// Removes and returns one evictable frame, or None if there is none.
    fn evict(&mut self) -> Option<FrameId>;

    /// Forgets a frame entirely, evictable or not.
    fn remove(&mut self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

impl ReplacerKind {
    /// Builds the replacer for a pool of `pool_size` frames.
    pub fn build(&self, pool_size: usize) -> Box<dyn Replacer> {
        match *self {
            ReplacerKind::LruK { k } => Box::new(LruKReplacer::new(k, pool_size)),
            ReplacerKind::Clock => Box::new(ClockReplacer::new(pool_size)),
        }
    }
}
