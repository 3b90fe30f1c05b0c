//! One global FIFO ready queue shared by every core. There is no
//! per-core runqueue and no priority: the first thread made ready is the
//! first thread any idle core picks up.

use crate::thread::{Thread, ThreadState};
use alloc::collections::VecDeque;
use spin::Mutex;

static READY_QUEUE: Mutex<VecDeque<&'static Thread>> = Mutex::new(VecDeque::new());

/// Appends `thread` to the tail of the ready queue.
pub fn ready(thread: &'static Thread) {
    thread.set_state(ThreadState::Ready);
    READY_QUEUE.lock().push_back(thread);
}

/// Pops the head of the ready queue, skipping (and reaping) any thread the
/// Assassin killed while it was waiting its turn.
pub fn next_ready() -> Option<&'static Thread> {
    loop {
        let thread = READY_QUEUE.lock().pop_front()?;
        if thread.is_killed() {
            thread.set_state(ThreadState::Dead);
            continue;
        }
        return Some(thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_queue_is_fifo() {
        let a = alloc::boxed::Box::leak(Thread::new(|| {}));
        let b = alloc::boxed::Box::leak(Thread::new(|| {}));
        ready(a);
        ready(b);
        assert_eq!(next_ready().unwrap().id, a.id);
        assert_eq!(next_ready().unwrap().id, b.id);
    }
}
