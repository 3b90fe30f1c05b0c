//! A FIFO queue of blocked threads. The room owns the queue entries; a
//! thread only ever knows it is "somewhere blocked", never which room —
//! that back-reference lives nowhere, breaking what would otherwise be a
//! room-thread-room ownership cycle.

use crate::thread::{dispatcher::Dispatcher, Thread, ThreadState};
use alloc::collections::VecDeque;
use spin::Mutex;

pub struct WaitingRoom {
    queue: Mutex<VecDeque<&'static Thread>>,
}

impl WaitingRoom {
    pub const fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }

    /// Blocks the currently active thread on this core: enqueue it here,
    /// mark it `Blocked`, and give up the core. Returns once some other
    /// context wakes it back onto the ready queue and the scheduler
    /// switches back in.
    pub fn sleep(&self) {
        let Some(thread) = Dispatcher::active() else {
            return;
        };
        thread.set_state(ThreadState::Blocked);
        self.queue.lock().push_back(thread);
        crate::thread::dispatcher::reschedule();
    }

    /// Moves the oldest blocked thread back onto the ready queue. Returns
    /// `true` if a thread was woken.
    pub fn wake_one(&self) -> bool {
        match self.queue.lock().pop_front() {
            Some(thread) => {
                crate::sched::scheduler::ready(thread);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Removes a thread by id if it is queued here. Used by the Assassin:
    /// a killed thread blocked in a semaphore or room must come out
    /// immediately, not wait for a `v()` that may never come.
    pub fn remove(&self, thread_id: u32) -> bool {
        let mut q = self.queue.lock();
        match q.iter().position(|t| t.id == thread_id) {
            Some(pos) => {
                q.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_one_on_empty_room_is_a_no_op() {
        let room = WaitingRoom::new();
        assert!(!room.wake_one());
    }
}
