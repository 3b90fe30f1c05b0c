//! Delta-queue timed sleep, ported structurally from the original teaching
//! kernel's `Bell`/`Bellringer`: nodes are kept sorted by *residual* time
//! relative to the node before them, so the sum of residuals up to any
//! node equals its absolute remaining time, and a tick only ever touches
//! the head.

use super::WaitingRoom;
use alloc::collections::VecDeque;
use spin::Mutex;

struct Node {
    residual_ms: u64,
    room: &'static WaitingRoom,
}

pub struct Bellringer {
    queue: Mutex<VecDeque<Node>>,
}

impl Bellringer {
    pub const fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }

    /// Schedules `room` to be woken `ms` milliseconds from now.
    pub fn job(&self, ms: u64, room: &'static WaitingRoom) {
        let mut queue = self.queue.lock();
        let mut remaining = ms;
        let mut insert_at = queue.len();
        for (i, node) in queue.iter().enumerate() {
            if remaining < node.residual_ms {
                insert_at = i;
                break;
            }
            remaining -= node.residual_ms;
        }
        if insert_at < queue.len() {
            queue[insert_at].residual_ms -= remaining;
        }
        queue.insert(insert_at, Node { residual_ms: remaining, room });
    }

    /// Removes every pending bell for `room`, re-basing the following
    /// node's residual so the invariant holds. Used when a sleeper is
    /// killed or otherwise abandons its wait.
    pub fn cancel(&self, room: &WaitingRoom) {
        let mut queue = self.queue.lock();
        let mut i = 0;
        while i < queue.len() {
            if core::ptr::eq(queue[i].room, room) {
                let removed = queue.remove(i).unwrap();
                if i < queue.len() {
                    queue[i].residual_ms += removed.residual_ms;
                }
            } else {
                i += 1;
            }
        }
    }

    /// Called once per timer tick. Decrements the head's residual and
    /// rings (wakes) every bell that reaches zero this tick, including any
    /// ties that land on the same tick once the head is removed.
    pub fn tick(&self) {
        let mut queue = self.queue.lock();
        if let Some(head) = queue.front_mut() {
            head.residual_ms = head.residual_ms.saturating_sub(1);
        }
        while matches!(queue.front(), Some(node) if node.residual_ms == 0) {
            let node = queue.pop_front().unwrap();
            node.room.wake_one();
        }
    }

    #[cfg(test)]
    fn residuals(&self) -> alloc::vec::Vec<u64> {
        self.queue.lock().iter().map(|n| n.residual_ms).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_queue_ordering_matches_scenario() {
        // B1=50, B2=100, B3=150, B4=75 submitted in that order must settle
        // as B1(50) -> B4(25) -> B2(25) -> B3(50).
        static R1: WaitingRoom = WaitingRoom::new();
        static R2: WaitingRoom = WaitingRoom::new();
        static R3: WaitingRoom = WaitingRoom::new();
        static R4: WaitingRoom = WaitingRoom::new();
        let ringer = Bellringer::new();
        ringer.job(50, &R1);
        ringer.job(100, &R2);
        ringer.job(150, &R3);
        ringer.job(75, &R4);
        assert_eq!(ringer.residuals(), alloc::vec![50, 25, 25, 50]);
    }

    #[test]
    fn equal_deltas_ring_in_enqueue_order() {
        static A: WaitingRoom = WaitingRoom::new();
        static B: WaitingRoom = WaitingRoom::new();
        static C: WaitingRoom = WaitingRoom::new();
        let ringer = Bellringer::new();
        ringer.job(10, &A);
        ringer.job(10, &B);
        ringer.job(10, &C);
        for _ in 0..10 {
            ringer.tick();
        }
        assert!(ringer.queue.lock().is_empty());
    }
}
