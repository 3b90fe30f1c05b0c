//! Tracks which thread is running, and which thread is in the middle of
//! "becoming" active, on each core. Grounded on the original teaching
//! kernel's `Dispatcher`: a `life_pointer` per core records the thread a
//! switch is currently landing on, separate from `active()`, so a kill IPI
//! arriving mid-switch can tell the difference between "already running"
//! and "about to run".

use super::{switch, Thread};
use crate::config::MAX_CORES;
use core::sync::atomic::{AtomicPtr, Ordering};

static ACTIVE: [AtomicPtr<Thread>; MAX_CORES] = {
    const NULL: AtomicPtr<Thread> = AtomicPtr::new(core::ptr::null_mut());
    [NULL; MAX_CORES]
};
static LIFE_POINTER: [AtomicPtr<Thread>; MAX_CORES] = {
    const NULL: AtomicPtr<Thread> = AtomicPtr::new(core::ptr::null_mut());
    [NULL; MAX_CORES]
};

pub struct Dispatcher;

impl Dispatcher {
    fn core() -> usize {
        crate::arch::x86_64::cpu::core_id() as usize % MAX_CORES
    }

    /// The thread actually executing on the calling core, if any.
    pub fn active() -> Option<&'static Thread> {
        let ptr = ACTIVE[Self::core()].load(Ordering::SeqCst);
        unsafe { ptr.as_ref() }
    }

    pub fn set_active(core: usize, thread: *mut Thread) {
        ACTIVE[core].store(thread, Ordering::SeqCst);
    }

    /// Switches the calling core onto `next`, recording it as this core's
    /// life pointer for the duration of the switch.
    pub fn go(next: &'static Thread) {
        let core = Self::core();
        LIFE_POINTER[core].store(next as *const Thread as *mut Thread, Ordering::SeqCst);
        let prev = Self::active();
        Self::set_active(core, next as *const Thread as *mut Thread);
        match prev {
            Some(prev) if prev.id != next.id => switch(prev, next),
            _ => {}
        }
        LIFE_POINTER[core].store(core::ptr::null_mut(), Ordering::SeqCst);
    }

    /// `true` if `thread` is either running or in the process of becoming
    /// active on some core — the Assassin must not reap it mid-switch.
    pub fn is_live(thread: &Thread) -> bool {
        for core in 0..MAX_CORES {
            let addr = thread as *const Thread as *mut Thread;
            if ACTIVE[core].load(Ordering::SeqCst) == addr
                || LIFE_POINTER[core].load(Ordering::SeqCst) == addr
            {
                return true;
            }
        }
        false
    }
}

/// Picks the next ready thread (or this core's idle thread, if the ready
/// queue is empty) and switches to it. Returns once some other switch lands
/// back on the calling thread — an ordinary voluntary yield, not an exit.
pub fn reschedule() {
    let core = Dispatcher::core();
    let next = crate::sched::scheduler::next_ready().unwrap_or_else(|| super::idle::idle_thread(core));
    Dispatcher::go(next);
}
