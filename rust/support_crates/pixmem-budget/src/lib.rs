//! Byte budgets for the memory resources a process is willing to spend
//! (heap, anonymous mappings, scratch-file disk space).
//!
//! A [`Budget`] is charged when a block is acquired and credited back when the
//! returned [`Charge`] is dropped, which ties the accounting to the lifetime
//! of whatever owns the block.

use std::sync::Arc;

use counter::Counter;

pub mod counter;

/// A shareable limit on the number of bytes that may be outstanding at once.
#[derive(Clone)]
pub struct Budget(Arc<BudgetNode>);

impl Budget {
    /// Creates a budget that allows at most `limit` outstanding bytes.
    pub fn new(limit: u64) -> Budget {
        Budget(Arc::new(BudgetNode {
            limit,
            remaining: Counter::new(limit),
        }))
    }

    /// Creates a budget that never refuses a charge.
    pub fn unlimited() -> Budget {
        Budget::new(u64::MAX)
    }

    /// Returns the remaining amount in this budget.
    ///
    /// **Note**: This method is primarily intended for diagnostic purposes. The returned
    /// value may be outdated in a concurrent environment.
    pub fn remaining(&self) -> u64 {
        self.0.remaining.read()
    }

    /// Bytes currently held by live charges.
    pub fn used(&self) -> u64 {
        self.0.limit - self.remaining()
    }

    /// Takes `amount` bytes from the budget.
    ///
    /// The bytes are returned to the budget when the resulting [`Charge`] is
    /// dropped. Fails without side effects if fewer than `amount` bytes remain.
    pub fn charge(&self, amount: u64) -> Result<Charge, BudgetExceeded> {
        if self.0.remaining.withdraw(amount) {
            Ok(Charge {
                budget: self.0.clone(),
                amount,
            })
        } else {
            Err(BudgetExceeded { requested: amount })
        }
    }
}

impl std::fmt::Debug for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Budget")
            .field("limit", &self.0.limit)
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl Default for Budget {
    fn default() -> Self {
        Budget::unlimited()
    }
}

/// Bytes taken from a [`Budget`], credited back on drop.
pub struct Charge {
    budget: Arc<BudgetNode>,
    amount: u64,
}

impl Charge {
    /// Number of bytes held by this charge.
    pub fn amount(&self) -> u64 {
        self.amount
    }
}

impl Drop for Charge {
    fn drop(&mut self) {
        if self.amount != 0 {
            self.budget.remaining.deposit(self.amount);
        }
    }
}

impl std::fmt::Debug for Charge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Charge")
            .field("amount", &self.amount)
            .finish_non_exhaustive()
    }
}

/// A charge was refused because the budget lacks the requested amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BudgetExceeded {
    pub requested: u64,
}

impl std::fmt::Display for BudgetExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "budget exceeded by a request of {} bytes", self.requested)
    }
}

impl std::error::Error for BudgetExceeded {}

struct BudgetNode {
    limit: u64,
    remaining: Counter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_and_release() {
        let budget = Budget::new(100);
        {
            let charge = budget.charge(40).unwrap();
            assert_eq!(charge.amount(), 40);
            assert_eq!(budget.remaining(), 60);
            assert_eq!(budget.used(), 40);
        }
        assert_eq!(budget.remaining(), 100);
    }

    #[test]
    fn test_charge_refused() {
        let budget = Budget::new(100);
        let _held = budget.charge(80).unwrap();
        assert_eq!(
            budget.charge(30).unwrap_err(),
            BudgetExceeded { requested: 30 }
        );
        assert_eq!(budget.remaining(), 20);
    }

    #[test]
    fn test_clones_share_balance() {
        let budget = Budget::new(10);
        let other = budget.clone();
        let _charge = other.charge(10).unwrap();
        assert!(budget.charge(1).is_err());
    }

    #[test]
    fn test_unlimited() {
        let budget = Budget::unlimited();
        assert_eq!(budget.used(), 0);
        let _a = budget.charge(u64::MAX / 2).unwrap();
        let _b = budget.charge(u64::MAX / 2).unwrap();
        assert_eq!(budget.remaining(), 1);
    }
}
