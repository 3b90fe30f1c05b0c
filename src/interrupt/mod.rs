//! Interrupt dispatch: a 256-entry vector table (`Plugbox`), per-core
//! pending-epilogue queues (`GateQueue`), and the per-core lock plus Big
//! Kernel Lock (`Guard`) that together serialize epilogue execution across
//! cores — a core only ever drains its own queue, and the BKL keeps at most
//! one epilogue running anywhere in the system at a time.
//!
//! The split mirrors how a real interrupt controller hands work to
//! software: `prologue()` runs with interrupts still mostly masked and
//! decides whether deferred work is needed; if so the gate is queued and
//! `epilogue()` runs later, under the BKL, where it is safe to touch shared
//! kernel state such as the ready queue or the inode cache.

pub mod gates;
pub mod guard;
pub mod plugbox;

pub use guard::Guard;
pub use plugbox::Plugbox;

use crate::config::MAX_CORES;
use alloc::collections::VecDeque;
use spin::Mutex;

/// A registered interrupt source. Implementors are `'static` trait objects
/// stored in the `Plugbox`'s vector table.
pub trait Gate: Sync {
    /// Runs immediately, with the core's interrupts-disabled context still
    /// active. Returns `true` if `epilogue` should be scheduled.
    fn prologue(&self) -> bool {
        true
    }

    /// Runs later, under the Big Kernel Lock, with at most one epilogue
    /// executing anywhere in the system at a time.
    fn epilogue(&self);
}

/// The gate invoked for a vector with no registered handler, or for a CPU
/// exception this kernel cannot recover from. It panics rather than
/// silently ignoring hardware it doesn't understand.
pub struct PanicGate {
    pub vector: u8,
}

impl Gate for PanicGate {
    fn epilogue(&self) {
        panic!("unhandled interrupt vector {}", self.vector);
    }
}

/// Per-core FIFO of vectors awaiting their epilogue. A vector already
/// queued on a core is not queued again (`prologue` ran, decided deferred
/// work is needed, but the work itself coalesces).
pub struct GateQueue {
    queues: [Mutex<VecDeque<u8>>; MAX_CORES],
    pending: [[core::sync::atomic::AtomicBool; 256]; MAX_CORES],
}

impl GateQueue {
    pub const fn new() -> Self {
        const EMPTY_ROW: [core::sync::atomic::AtomicBool; 256] =
            [const { core::sync::atomic::AtomicBool::new(false) }; 256];
        Self {
            queues: [const { Mutex::new(VecDeque::new()) }; MAX_CORES],
            pending: [EMPTY_ROW; MAX_CORES],
        }
    }

    /// Enqueue `vector` for `core`, returning `false` if it was already
    /// pending (dedup — the epilogue will still run exactly once).
    pub fn enqueue(&self, core: usize, vector: u8) -> bool {
        use core::sync::atomic::Ordering;
        if self.pending[core][vector as usize].swap(true, Ordering::SeqCst) {
            return false;
        }
        self.queues[core].lock().push_back(vector);
        true
    }

    pub fn dequeue(&self, core: usize) -> Option<u8> {
        use core::sync::atomic::Ordering;
        let v = self.queues[core].lock().pop_front()?;
        self.pending[core][v as usize].store(false, Ordering::SeqCst);
        Some(v)
    }

    pub fn is_empty(&self, core: usize) -> bool {
        self.queues[core].lock().is_empty()
    }
}

static GATE_QUEUE: GateQueue = GateQueue::new();
static PLUGBOX: Plugbox = Plugbox::new();
static BKL: Guard = Guard::new();

/// Registers `gate` for `vector`. Called during boot only, before
/// interrupts are enabled.
pub fn register(vector: u8, gate: &'static dyn Gate) {
    PLUGBOX.assign(vector, gate);
}

/// The low-level entry point called from every IDT stub after `eoi`.
/// Runs the gate's prologue; if deferred work is needed, queues the vector
/// and drives the epilogue engine via [`Guard::enter`]/[`Guard::leave`].
pub fn dispatch(vector: u8) {
    let gate = PLUGBOX.report(vector);
    if !gate.prologue() {
        return;
    }
    let core = crate::arch::x86_64::cpu::core_id() as usize % MAX_CORES;
    if GATE_QUEUE.enqueue(core, vector) {
        BKL.enter(core);
        BKL.leave(core);
    }
}

pub(crate) fn gate_queue() -> &'static GateQueue {
    &GATE_QUEUE
}

pub(crate) fn plugbox() -> &'static Plugbox {
    &PLUGBOX
}

pub(crate) fn bkl() -> &'static Guard {
    &BKL
}
