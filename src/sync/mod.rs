//! Low-level synchronization primitives that sit below the scheduler and
//! therefore must never block on it: a ticket lock, spun with `pause`.

pub mod ticket_lock;

pub use ticket_lock::TicketLock;
