//! The two locks serializing epilogue execution: a per-core lock excluding
//! a core from re-entering its own drain loop, and the Big Kernel Lock
//! excluding every core's epilogue from running at the same time as any
//! other core's.
//!
//! Grounded on the original teaching kernel's `Guard::enter()`/`leave()`:
//! `enter` takes this core's own lock first, then the BKL, then drains only
//! this core's queue of pending epilogues — a core never touches another
//! core's queue, so there is nothing to coordinate beyond the BKL itself.
//! `leave` releases both in reverse order.

use super::{gate_queue, plugbox};
use crate::config::MAX_CORES;
use crate::sync::TicketLock;

pub struct Guard {
    core_locks: [TicketLock<()>; MAX_CORES],
    big_lock: TicketLock<()>,
}

impl Guard {
    pub const fn new() -> Self {
        Self {
            core_locks: [const { TicketLock::new(()) }; MAX_CORES],
            big_lock: TicketLock::new(()),
        }
    }

    /// Takes `CoreLock[core]` then the BKL, then drains `core`'s own queue
    /// of pending epilogues. Both locks are held on return; the caller
    /// must call `leave(core)` once it's done.
    pub fn enter(&self, core: usize) {
        self.core_locks[core].acquire();
        self.big_lock.acquire();
        self.drain(core);
    }

    /// Releases the BKL and then `CoreLock[core]`, the reverse order
    /// `enter` took them in.
    pub fn leave(&self, core: usize) {
        self.big_lock.release();
        self.core_locks[core].release();
    }

    fn drain(&self, core: usize) {
        while let Some(vector) = gate_queue().dequeue(core) {
            plugbox().report(vector).epilogue();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{register, Gate};
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGate(&'static AtomicUsize);
    impl Gate for CountingGate {
        fn epilogue(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    static COUNT: AtomicUsize = AtomicUsize::new(0);
    static GATE: CountingGate = CountingGate(&COUNT);

    #[test]
    fn at_most_one_epilogue_runs_at_a_time() {
        register(200, &GATE);
        crate::interrupt::dispatch(200);
        assert_eq!(COUNT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enter_then_leave_releases_both_locks_for_the_next_caller() {
        let guard = Guard::new();
        guard.enter(0);
        guard.leave(0);
        // A second enter/leave on the same core must not deadlock; it
        // would if `leave` failed to release either lock.
        guard.enter(0);
        guard.leave(0);
    }
}
