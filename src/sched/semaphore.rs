//! A counting semaphore built on a [`WaitingRoom`]; the canonical consumer
//! of `p()`/`v()` in the scenario the Assassin test exercises (a thread
//! sleeping in `Semaphore::p()` that gets killed from another core).

use super::WaitingRoom;
use core::sync::atomic::{AtomicI32, Ordering};

pub struct Semaphore {
    count: AtomicI32,
    room: WaitingRoom,
}

impl Semaphore {
    pub const fn new(initial: i32) -> Self {
        Self { count: AtomicI32::new(initial), room: WaitingRoom::new() }
    }

    /// Blocks until a unit is available, then takes it.
    pub fn p(&self) {
        loop {
            let current = self.count.load(Ordering::SeqCst);
            if current > 0
                && self
                    .count
                    .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return;
            }
            self.room.sleep();
        }
    }

    /// Releases a unit and wakes the oldest waiter, if any.
    pub fn v(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.room.wake_one();
    }

    /// Removes `thread_id` from this semaphore's waiting room, for the
    /// Assassin to call when killing a thread blocked in `p()`.
    pub fn evict(&self, thread_id: u32) -> bool {
        self.room.remove(thread_id)
    }
}
