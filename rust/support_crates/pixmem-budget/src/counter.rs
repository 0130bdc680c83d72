use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free byte counter that never goes below zero.
///
/// Withdrawals either take the full amount or leave the counter untouched,
/// so concurrent callers can race on the same counter without a lock.
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a counter holding `amount`.
    pub fn new(amount: u64) -> Counter {
        Counter(AtomicU64::new(amount))
    }

    /// Withdraws `amount` if at least that much remains.
    ///
    /// Returns `false` (leaving the counter unchanged) when the remaining
    /// amount is insufficient.
    pub fn withdraw(&self, amount: u64) -> bool {
        let mut current = self.0.load(Ordering::Relaxed);
        while current >= amount {
            match self.0.compare_exchange_weak(
                current,
                current - amount,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(updated) => current = updated,
            }
        }
        false
    }

    /// Returns `amount` to the counter.
    pub fn deposit(&self, amount: u64) {
        self.0.fetch_add(amount, Ordering::Release);
    }

    /// Returns the counter value (most likely stale by the time it is observed by the caller).
    pub fn read(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
