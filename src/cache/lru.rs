use crate::cache::{EvictionPolicy, FrameId};

use priority_queue::PriorityQueue;

/// Least-recently-released eviction order.
pub struct Lru {
    // the queue pops the highest priority first, so release
    // ticks are negated to surface the oldest release
    queue: PriorityQueue<FrameId, i64>,
}

impl Lru {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
        }
    }
}

impl Default for Lru {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for Lru {
    fn record_release(&mut self, frame_id: FrameId, tick: i64) {
        self.queue.push(frame_id, -tick);
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.queue.remove(&frame_id);
    }

    fn peek_victim(&self) -> Option<FrameId> {
        self.queue.peek().map(|(&frame_id, _)| frame_id)
    }

    fn pop_victim(&mut self) -> Option<FrameId> {
        self.queue.pop().map(|(frame_id, _)| frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_eviction_order() {
        let mut lru = Lru::new();
        lru.record_release(0, 1);
        lru.record_release(1, 2);
        lru.record_release(2, 3);
        assert_eq!(lru.peek_victim(), Some(0));
        assert_eq!(lru.pop_victim(), Some(0));
        lru.remove(1);
        assert_eq!(lru.pop_victim(), Some(2));
        assert_eq!(lru.pop_victim(), None);
    }

    #[test]
    fn released_again_moves_to_tail() {
        let mut lru = Lru::new();
        lru.record_release(0, 1);
        lru.record_release(1, 2);
        lru.remove(0);
        lru.record_release(0, 3);
        assert_eq!(lru.pop_victim(), Some(1));
        assert_eq!(lru.pop_victim(), Some(0));
    }
}
