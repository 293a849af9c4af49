//! Inventory ledger tests
//!
//! Tests for the stock movement rules including:
//! - Position quantities never go negative
//! - Restock accumulates, adjustment overwrites
//! - Transfer conservation across initiate, confirm and reject

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    credit, generate_transfer_id, is_valid_transfer_id, parse_quantity,
    validate_confirmed_quantity, MovementCategory, RuleViolation, StockMovement, TransferStatus,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn movement(category: MovementCategory, quantity: Decimal) -> StockMovement {
    let to_store = match category {
        MovementCategory::Transfer => Some(Uuid::new_v4()),
        _ => None,
    };
    StockMovement::new(category, quantity, Uuid::new_v4(), to_store).unwrap()
}

/// Two stores holding one item, tracked the way the ledger updates them
#[derive(Debug, Default)]
struct TwoStores {
    source: Option<Decimal>,
    destination: Option<Decimal>,
}

impl TwoStores {
    fn initiate(&mut self, quantity: Decimal) -> Result<(), RuleViolation> {
        self.source = Some(movement(MovementCategory::Transfer, quantity).apply(self.source)?);
        Ok(())
    }

    fn confirm(&mut self, confirmed: Decimal, initiated: Decimal) -> Result<(), RuleViolation> {
        validate_confirmed_quantity(confirmed, initiated)?;
        self.destination = Some(credit(self.destination, confirmed)?);
        Ok(())
    }

    fn reject(&mut self, initiated: Decimal) {
        self.source = Some(credit(self.source, initiated).unwrap());
    }

    fn total(&self) -> Decimal {
        self.source.unwrap_or_default() + self.destination.unwrap_or_default()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// RESTOCK 50 on a fresh position leaves 50 on hand
    #[test]
    fn test_restock_fresh_position() {
        let remaining = movement(MovementCategory::Restock, dec("50"))
            .apply(None)
            .unwrap();
        assert_eq!(remaining, dec("50"));
    }

    /// Two restocks add up
    #[test]
    fn test_restocks_accumulate() {
        let first = movement(MovementCategory::Restock, dec("12.5")).apply(None).unwrap();
        let second = movement(MovementCategory::Restock, dec("7.5"))
            .apply(Some(first))
            .unwrap();
        assert_eq!(second, dec("20"));
    }

    /// DEPLETION 60 against 50 fails and reports both quantities
    #[test]
    fn test_depletion_beyond_stock() {
        let result = movement(MovementCategory::Depletion, dec("60")).apply(Some(dec("50")));
        assert_eq!(
            result,
            Err(RuleViolation::InsufficientStock {
                available: dec("50"),
                requested: dec("60"),
            })
        );
    }

    /// Depleting an item never stocked in the store is a not-found
    #[test]
    fn test_depletion_without_position() {
        let result = movement(MovementCategory::Depletion, dec("1")).apply(None);
        assert!(matches!(result, Err(RuleViolation::NotFound(_))));
    }

    /// Adjustment overwrites whatever was on hand
    #[test]
    fn test_adjustment_overwrites() {
        let adjust = movement(MovementCategory::Adjustment, dec("3"));
        assert_eq!(adjust.apply(Some(dec("90"))).unwrap(), dec("3"));
        assert_eq!(adjust.apply(None).unwrap(), dec("3"));
    }

    /// Initiate 15 of 40, confirm 15: source 25, destination 15
    #[test]
    fn test_transfer_confirmed_in_full() {
        let mut stores = TwoStores {
            source: Some(dec("40")),
            destination: None,
        };
        stores.initiate(dec("15")).unwrap();
        assert_eq!(stores.source, Some(dec("25")));
        stores.confirm(dec("15"), dec("15")).unwrap();
        assert_eq!(stores.destination, Some(dec("15")));
        assert_eq!(stores.total(), dec("40"));
    }

    /// Rejecting restores the source and leaves the destination alone
    #[test]
    fn test_transfer_rejected() {
        let mut stores = TwoStores {
            source: Some(dec("40")),
            destination: Some(dec("5")),
        };
        stores.initiate(dec("15")).unwrap();
        stores.reject(dec("15"));
        assert_eq!(stores.source, Some(dec("40")));
        assert_eq!(stores.destination, Some(dec("5")));
    }

    /// A short delivery credits only what arrived
    #[test]
    fn test_transfer_short_delivery() {
        let mut stores = TwoStores {
            source: Some(dec("40")),
            destination: None,
        };
        stores.initiate(dec("15")).unwrap();
        stores.confirm(dec("12"), dec("15")).unwrap();
        assert_eq!(stores.destination, Some(dec("12")));
        assert!(stores.confirm(dec("16"), dec("15")).is_err());
    }

    /// Terminal transfers refuse both actions
    #[test]
    fn test_terminal_transfers() {
        for status in [TransferStatus::Confirmed, TransferStatus::Rejected] {
            assert!(matches!(
                status.ensure_pending("confirm"),
                Err(RuleViolation::Conflict(_))
            ));
            assert!(status.ensure_pending("reject").is_err());
        }
    }

    /// Quantities arrive as text
    #[test]
    fn test_quantity_parsing() {
        assert_eq!(parse_quantity("0.25").unwrap(), dec("0.25"));
        assert!(parse_quantity("-5").is_err());
        assert!(parse_quantity("five").is_err());
    }

    /// Transfers need a destination other than the source
    #[test]
    fn test_transfer_destination_rules() {
        let store = Uuid::new_v4();
        assert!(StockMovement::new(MovementCategory::Transfer, dec("1"), store, None).is_err());
        assert!(
            StockMovement::new(MovementCategory::Transfer, dec("1"), store, Some(store)).is_err()
        );
        let other = Uuid::new_v4();
        let transfer =
            StockMovement::new(MovementCategory::Transfer, dec("1"), store, Some(other)).unwrap();
        assert_eq!(transfer.destination(), Some(other));
        assert_eq!(transfer.category(), MovementCategory::Transfer);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating quantities (0.0 to 1000.0)
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=10000i64).prop_map(|n| Decimal::new(n, 1))
    }

    fn category_strategy() -> impl Strategy<Value = MovementCategory> {
        prop_oneof![
            Just(MovementCategory::Restock),
            Just(MovementCategory::Depletion),
            Just(MovementCategory::Adjustment),
            Just(MovementCategory::Transfer),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any sequence of movements keeps the position non-negative;
        /// rejected movements leave it unchanged
        #[test]
        fn prop_position_never_negative(
            steps in prop::collection::vec((category_strategy(), quantity_strategy()), 1..30)
        ) {
            let mut position: Option<Decimal> = None;
            for (category, quantity) in steps {
                let before = position;
                match movement(category, quantity).apply(position) {
                    Ok(after) => {
                        prop_assert!(after >= Decimal::ZERO);
                        position = Some(after);
                    }
                    Err(_) => prop_assert_eq!(position, before),
                }
            }
        }

        /// Restocking twice on a fresh triple yields the sum
        #[test]
        fn prop_restock_sums(q1 in quantity_strategy(), q2 in quantity_strategy()) {
            let first = movement(MovementCategory::Restock, q1).apply(None).unwrap();
            let second = movement(MovementCategory::Restock, q2).apply(Some(first)).unwrap();
            prop_assert_eq!(second, q1 + q2);
        }

        /// Adjustment sets the quantity regardless of history
        #[test]
        fn prop_adjustment_sets(current in quantity_strategy(), target in quantity_strategy()) {
            let result = movement(MovementCategory::Adjustment, target).apply(Some(current)).unwrap();
            prop_assert_eq!(result, target);
        }

        /// A confirmed or rejected transfer never creates stock
        #[test]
        fn prop_transfer_conserves(
            on_hand in quantity_strategy(),
            sent in quantity_strategy(),
            received_tenths in 0i64..=10,
            confirm in any::<bool>(),
        ) {
            let mut stores = TwoStores { source: Some(on_hand), destination: None };
            if stores.initiate(sent).is_err() {
                prop_assert!(sent > on_hand);
                prop_assert_eq!(stores.source, Some(on_hand));
                return Ok(());
            }

            if confirm {
                let received = sent * Decimal::new(received_tenths, 1);
                stores.confirm(received, sent).unwrap();
                prop_assert_eq!(stores.total(), on_hand - sent + received);
                prop_assert!(stores.total() <= on_hand);
            } else {
                stores.reject(sent);
                prop_assert_eq!(stores.source, Some(on_hand));
                prop_assert_eq!(stores.destination, None);
            }
        }

        /// Generated transfer ids are 8 characters of A-Z0-9
        #[test]
        fn prop_transfer_ids_well_formed(seed in any::<u64>()) {
            use rand::{rngs::StdRng, SeedableRng};
            let mut rng = StdRng::seed_from_u64(seed);
            let id = generate_transfer_id(&mut rng);
            prop_assert!(is_valid_transfer_id(&id));
        }
    }
}
