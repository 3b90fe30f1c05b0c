//! Everything above the ticket lock but below an application: the global
//! ready queue, waiting rooms, semaphores, and the delta-queue bell-ringer
//! for timed sleep.

pub mod bell;
pub mod scheduler;
pub mod semaphore;
pub mod waitingroom;

pub use bell::Bellringer;
pub use semaphore::Semaphore;
pub use waitingroom::WaitingRoom;

static BELLRINGER: Bellringer = Bellringer::new();

/// The one bell-ringer every core's timer tick feeds into.
pub fn bell() -> &'static Bellringer {
    &BELLRINGER
}
