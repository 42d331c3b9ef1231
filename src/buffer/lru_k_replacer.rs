use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use crate::common::{FrameId, Timestamp};

use super::Replacer;

/// The last (up to) k access times of one frame, oldest at the front.
#[derive(Debug, Default)]
struct History {
    accesses: VecDeque<Timestamp>,
    evictable: bool,
}

impl History {
    fn push(&mut self, at: Timestamp, k: usize) {
        if self.accesses.len() == k {
            self.accesses.pop_front();
        }
        self.accesses.push_back(at);
    }

    fn rank(&self, frame_id: FrameId, now: Timestamp, k: usize) -> Rank {
        let k_distance = (self.accesses.len() >= k).then(|| now - self.accesses[0]);
        Rank {
            frame_id,
            k_distance,
            first_access: self.accesses.front().copied(),
        }
    }
}

/// Eviction rank of one candidate; the greatest rank is the victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rank {
    frame_id: FrameId,
    /// None stands for +inf (fewer than k accesses)
    k_distance: Option<Timestamp>,
    first_access: Option<Timestamp>,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.k_distance, other.k_distance) {
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            // Both +inf: older first access wins; never accessed counts as oldest
            (None, None) => other.first_access.cmp(&self.first_access),
            (Some(a), Some(b)) => a.cmp(&b),
        }
        .then_with(|| other.frame_id.cmp(&self.frame_id))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// LRU-K replacement.
///
/// The victim is the evictable frame with the largest backward k-distance:
/// the time since its k-th most recent access. Frames seen fewer than k times
/// count as +inf and go first, oldest first access first. Remaining ties go
/// to the lower frame id, so the outcome never depends on map order.
pub struct LruKReplacer {
    k: usize,
    /// Frame ids at or past this are ignored
    max_frames: usize,
    /// Logical clock, one tick per recorded access
    clock: Timestamp,
    histories: HashMap<FrameId, History>,
    evictable: usize,
}

impl LruKReplacer {
    /// `k` below 1 is treated as 1.
    pub fn new(k: usize, max_frames: usize) -> Self {
        Self {
            k: k.max(1),
            max_frames,
            clock: 0,
            histories: HashMap::new(),
            evictable: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn in_range(&self, frame_id: FrameId) -> bool {
        frame_id.as_usize() < self.max_frames
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if !self.in_range(frame_id) {
            return;
        }
        let at = self.clock;
        self.clock += 1;
        let k = self.k;
        self.histories.entry(frame_id).or_default().push(at, k);
    }

    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        if !self.in_range(frame_id) {
            return;
        }
        // An untracked frame only needs an entry if it becomes a candidate
        if !is_evictable && !self.histories.contains_key(&frame_id) {
            return;
        }

        let history = self.histories.entry(frame_id).or_default();
        if history.evictable == is_evictable {
            return;
        }
        history.evictable = is_evictable;
        if is_evictable {
            self.evictable += 1;
        } else {
            self.evictable -= 1;
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.evictable == 0 {
            return None;
        }

        let (now, k) = (self.clock, self.k);
        let victim = self
            .histories
            .iter()
            .filter(|(_, history)| history.evictable)
            .map(|(&frame_id, history)| history.rank(frame_id, now, k))
            .max()?
            .frame_id;

        self.histories.remove(&victim);
        self.evictable -= 1;
        Some(victim)
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(history) = self.histories.remove(&frame_id) {
            if history.evictable {
                self.evictable -= 1;
            }
        }
    }

    fn size(&self) -> usize {
        self.evictable
    }
}
