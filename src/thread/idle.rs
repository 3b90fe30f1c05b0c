//! One idle thread per core: runs whenever that core's ready queue is
//! empty, halting between ticks instead of busy-spinning.

use super::Thread;
use crate::config::MAX_CORES;
use spin::Once;

static IDLE_THREADS: [Once<&'static Thread>; MAX_CORES] = {
    const ONCE: Once<&'static Thread> = Once::new();
    [ONCE; MAX_CORES]
};

pub fn idle_thread(core: usize) -> &'static Thread {
    *IDLE_THREADS[core].call_once(|| alloc::boxed::Box::leak(Thread::new(move || idle_action(core))))
}

fn idle_action(core: usize) -> ! {
    loop {
        crate::arch::x86_64::halt();
        let _ = core;
        crate::thread::dispatcher::reschedule();
    }
}
