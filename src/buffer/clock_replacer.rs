use crate::common::FrameId;

use super::Replacer;

#[derive(Debug, Clone, Copy, Default)]
struct ClockSlot {
    tracked: bool,
    is_evictable: bool,
    /// Second-chance bit, set on access and cleared as the hand passes
    referenced: bool,
}

/// Clock (second chance) replacement policy.
///
/// One slot per frame, swept by a hand in ascending frame id order. An
/// evictable frame whose reference bit is set gets the bit cleared and is
/// skipped; the first evictable frame found with the bit clear is the victim.
pub struct ClockReplacer {
    slots: Vec<ClockSlot>,
    hand: usize,
    num_evictable: usize,
}

impl ClockReplacer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            slots: vec![ClockSlot::default(); max_frames],
            hand: 0,
            num_evictable: 0,
        }
    }

    fn advance(&mut self) {
        self.hand = (self.hand + 1) % self.slots.len();
    }
}

impl Replacer for ClockReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if let Some(slot) = self.slots.get_mut(frame_id.as_usize()) {
            slot.tracked = true;
            slot.referenced = true;
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        let Some(slot) = self.slots.get_mut(frame_id.as_usize()) else {
            return;
        };
        if !slot.tracked {
            if !is_evictable {
                return;
            }
            slot.tracked = true;
        }
        if slot.is_evictable != is_evictable {
            slot.is_evictable = is_evictable;
            if is_evictable {
                self.num_evictable += 1;
            } else {
                self.num_evictable -= 1;
            }
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.num_evictable == 0 {
            return None;
        }

        // With at least one evictable slot, two sweeps always find a victim.
        loop {
            let slot = &mut self.slots[self.hand];
            if slot.tracked && slot.is_evictable {
                if slot.referenced {
                    slot.referenced = false;
                } else {
                    *slot = ClockSlot::default();
                    self.num_evictable -= 1;
                    let victim = FrameId::new(self.hand as u32);
                    self.advance();
                    return Some(victim);
                }
            }
            self.advance();
        }
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(slot) = self.slots.get_mut(frame_id.as_usize()) {
            if slot.is_evictable {
                self.num_evictable -= 1;
            }
            *slot = ClockSlot::default();
        }
    }

    fn size(&self) -> usize {
        self.num_evictable
    }
}
