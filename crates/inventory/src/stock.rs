//! Stock level arithmetic for a single item.

use serde::{Deserialize, Serialize};

use dropshop_core::{DomainError, DomainResult, ValueObject};

/// Per-item stock counts: fixed `total`, mutable `available`.
///
/// Owns the ledger bounds: `0 <= available <= total` at all times. The lower
/// bound is structural (`u32`); the upper bound is enforced by `return_unit`,
/// which refuses to increment past `total` and reports the overrun instead of
/// clamping silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    total: u32,
    available: u32,
}

impl StockLevel {
    /// Full stock level for a freshly created item.
    pub fn new(total: u32) -> DomainResult<Self> {
        if total == 0 {
            return Err(DomainError::validation("total stock must be positive"));
        }
        Ok(Self {
            total,
            available: total,
        })
    }

    /// Rebuild a level from stored counts.
    pub fn restore(total: u32, available: u32) -> DomainResult<Self> {
        if available > total {
            return Err(DomainError::storage(format!(
                "stored stock out of bounds: available {available} > total {total}"
            )));
        }
        Ok(Self { total, available })
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn is_depleted(&self) -> bool {
        self.available == 0
    }

    /// Remove one unit from availability iff any is left.
    ///
    /// Returns `false` with no state change when depleted.
    pub fn take_unit(&mut self) -> bool {
        if self.available == 0 {
            return false;
        }
        self.available -= 1;
        true
    }

    /// Return one unit to availability.
    ///
    /// Fails with `LedgerOverrun` when `available` is already at `total`;
    /// callers must surface that, not swallow it.
    pub fn return_unit(&mut self) -> DomainResult<()> {
        if self.available >= self.total {
            return Err(DomainError::ledger_overrun(format!(
                "increment past total stock ({} of {})",
                self.available, self.total
            )));
        }
        self.available += 1;
        Ok(())
    }
}

impl ValueObject for StockLevel {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_level_starts_full() {
        let level = StockLevel::new(5).unwrap();
        assert_eq!(level.total(), 5);
        assert_eq!(level.available(), 5);
        assert!(!level.is_depleted());
    }

    #[test]
    fn zero_total_is_rejected() {
        let err = StockLevel::new(0).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("total stock") => {}
            _ => panic!("Expected validation error for zero total"),
        }
    }

    #[test]
    fn take_unit_decrements_until_depleted() {
        let mut level = StockLevel::new(2).unwrap();
        assert!(level.take_unit());
        assert!(level.take_unit());
        assert!(level.is_depleted());
        assert!(!level.take_unit());
        assert_eq!(level.available(), 0);
    }

    #[test]
    fn return_unit_restores_taken_units() {
        let mut level = StockLevel::new(3).unwrap();
        assert!(level.take_unit());
        assert!(level.take_unit());
        level.return_unit().unwrap();
        assert_eq!(level.available(), 2);
    }

    #[test]
    fn return_unit_past_total_reports_overrun() {
        let mut level = StockLevel::new(2).unwrap();
        let err = level.return_unit().unwrap_err();
        match err {
            DomainError::LedgerOverrun(_) => {}
            _ => panic!("Expected ledger overrun"),
        }
        assert_eq!(level.available(), 2);
    }

    #[test]
    fn restore_rejects_out_of_bounds_counts() {
        assert!(StockLevel::restore(3, 3).is_ok());
        assert!(StockLevel::restore(3, 0).is_ok());
        let err = StockLevel::restore(3, 4).unwrap_err();
        match err {
            DomainError::Storage(msg) if msg.contains("out of bounds") => {}
            _ => panic!("Expected storage error for out-of-bounds counts"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any interleaving of takes and returns keeps
        /// `available` within `0..=total`, with takes failing exactly when
        /// depleted and returns failing exactly when full.
        #[test]
        fn bounds_hold_under_arbitrary_take_return_sequences(
            total in 1u32..50,
            ops in prop::collection::vec(any::<bool>(), 0..200)
        ) {
            let mut level = StockLevel::new(total).unwrap();
            for take in ops {
                let before = level.available();
                if take {
                    prop_assert_eq!(level.take_unit(), before > 0);
                } else {
                    prop_assert_eq!(level.return_unit().is_ok(), before < total);
                }
                prop_assert!(level.available() <= level.total());
            }
        }
    }
}
