//! Fixed 256-entry interrupt vector table. Grounded on the teacher's
//! `InterruptRegistry` (a `[Option<&'static dyn Handler>; 256]` array behind
//! a lock) and on the original teaching kernel's `Plugbox`, which falls
//! back to a panic sentinel instead of ever returning a null handler.

use super::{Gate, PanicGate};
use spin::Mutex;

struct Slot(Option<&'static dyn Gate>);

unsafe impl Send for Slot {}

pub struct Plugbox {
    slots: Mutex<[Slot; 256]>,
}

impl Plugbox {
    pub const fn new() -> Self {
        const EMPTY: Slot = Slot(None);
        Self {
            slots: Mutex::new([EMPTY; 256]),
        }
    }

    pub fn assign(&self, vector: u8, gate: &'static dyn Gate) {
        self.slots.lock()[vector as usize] = Slot(Some(gate));
    }

    /// Always returns a usable gate: a registered handler, or a panic gate
    /// that reports the unknown vector.
    pub fn report(&self, vector: u8) -> &'static dyn Gate {
        match self.slots.lock()[vector as usize].0 {
            Some(gate) => gate,
            None => panic_gate_for(vector),
        }
    }
}

/// One static `PanicGate` per vector so `report` can hand out a `'static`
/// reference without allocating.
fn panic_gate_for(vector: u8) -> &'static dyn Gate {
    static GATES: [PanicGate; 256] = {
        let mut gates = [PanicGate { vector: 0 }; 256];
        let mut i = 0;
        while i < 256 {
            gates[i] = PanicGate { vector: i as u8 };
            i += 1;
        }
        gates
    };
    &GATES[vector as usize]
}

impl Clone for PanicGate {
    fn clone(&self) -> Self {
        PanicGate { vector: self.vector }
    }
}
impl Copy for PanicGate {}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingGate;
    impl Gate for CountingGate {
        fn epilogue(&self) {}
    }
    static COUNTING: CountingGate = CountingGate;

    #[test]
    fn every_vector_reports_a_usable_gate() {
        let plugbox = Plugbox::new();
        for v in 0..=255u8 {
            let _ = plugbox.report(v);
        }
        plugbox.assign(32, &COUNTING);
        let gate = plugbox.report(32);
        gate.epilogue();
    }
}
