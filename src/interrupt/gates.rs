//! Hardware-facing gates: the timer tick (bell-ringer + reschedule), and
//! the serial/ATA IRQ lines. Both devices are driven by polling elsewhere
//! in this kernel (the GDB stub reads the UART directly, the ATA driver
//! busy-waits on `BSY`/`DRQ`), so their gates exist only so an unexpected
//! IRQ from either line dispatches through the normal prologue/epilogue
//! path instead of falling through to [`crate::interrupt::PanicGate`].

use crate::interrupt::Gate;

/// Ticks the bell-ringer and asks the calling core to reschedule. Runs
/// under the Big Kernel Lock like every other epilogue, so it never races
/// a concurrent `Bellringer::job`/`cancel`.
pub struct TimerGate;

impl Gate for TimerGate {
    fn epilogue(&self) {
        crate::sched::bell().tick();
        crate::thread::dispatcher::reschedule();
    }
}

pub static TIMER_GATE: TimerGate = TimerGate;

/// No deferred work; the gate only exists to keep the vector out of
/// [`crate::interrupt::PanicGate`]'s way.
pub struct QuietGate;

impl Gate for QuietGate {
    fn prologue(&self) -> bool {
        false
    }

    fn epilogue(&self) {}
}

pub static PIT_GATE: QuietGate = QuietGate;
pub static SERIAL_GATE: QuietGate = QuietGate;
pub static ATA_GATE: QuietGate = QuietGate;
