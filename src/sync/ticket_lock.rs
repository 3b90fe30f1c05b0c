//! A fair spinlock: two monotonic counters, a drawn ticket, and a spin on
//! the current-serving counter. Used everywhere a lock must never call into
//! the scheduler to block (ATA polling, the GDB stop-the-world loop, and
//! the Big Kernel Lock that serializes interrupt epilogues).

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

pub struct TicketLock<T> {
    current: AtomicU32,
    next: AtomicU32,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for TicketLock<T> {}

pub struct TicketLockGuard<'a, T> {
    lock: &'a TicketLock<T>,
}

impl<T> TicketLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            current: AtomicU32::new(0),
            next: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Draw a ticket and spin until it is served. The spin is a plain
    /// `pause`-style hint, never a yield into the scheduler.
    pub fn lock(&self) -> TicketLockGuard<'_, T> {
        self.acquire();
        TicketLockGuard { lock: self }
    }

    /// Draw a ticket and spin until served, without a RAII guard. Paired
    /// with `release` by a caller that holds the lock across more than one
    /// function call (the per-core/BKL pair in `interrupt::guard::Guard`).
    pub fn acquire(&self) {
        let my_ticket = self.next.fetch_add(1, Ordering::SeqCst);
        while self.current.load(Ordering::SeqCst) != my_ticket {
            core::hint::spin_loop();
        }
    }

    pub fn release(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    fn unlock(&self) {
        self.release();
    }
}

impl<T> Deref for TicketLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for TicketLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for TicketLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    #[test]
    fn single_threaded_mutual_exclusion() {
        let lock = TicketLock::new(0usize);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn tickets_are_served_in_draw_order() {
        // Single-threaded stand-in for the fairness property: tickets are
        // handed out in fetch_add order and served in the same order since
        // `current` only ever advances by one.
        let counter = AtomicUsize::new(0);
        let lock = TicketLock::new(());
        for expected in 0..4 {
            let _g = lock.lock();
            assert_eq!(counter.fetch_add(1, Ordering::SeqCst), expected);
        }
    }
}
