//! Property-based tests for stress testing core math.
//!
//! These tests verify invariants hold under random inputs.

use liqbot_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = Amount> {
    (0i64..1_000_000_0000i64).prop_map(|x| Amount::new_unchecked(Decimal::new(x, 4)))
}

fn stake_strategy() -> impl Strategy<Value = Amount> {
    // stakes are fractions of the total stake pool
    (0i64..=10_000i64).prop_map(|x| Amount::new_unchecked(Decimal::new(x, 4)))
}

fn decay_factor_strategy() -> impl Strategy<Value = Amount> {
    (9_000i64..9_999i64).prop_map(|x| Amount::new_unchecked(Decimal::new(x, 4)))
}

fn rate_strategy() -> impl Strategy<Value = Amount> {
    (0i64..500i64).prop_map(|x| Amount::new_unchecked(Decimal::new(x, 4))) // 0 to 5%
}

fn fees_with(base_rate: Amount, decay: Amount, recovery: bool) -> Fees {
    Fees::new(
        base_rate,
        decay,
        Amount::new_unchecked(dec!(2)),
        Timestamp::from_millis(0),
        Timestamp::from_millis(0),
        recovery,
    )
}

proptest! {
    /// Clamped subtraction is never observably negative, even when the
    /// subtrahend exceeds the minuend component-wise
    #[test]
    fn subtract_never_negative(
        ca in amount_strategy(),
        da in amount_strategy(),
        cb in amount_strategy(),
        db in amount_strategy(),
    ) {
        let a = Trove::new(ca, da);
        let b = Trove::new(cb, db);

        let diff = a.subtract(&b);
        prop_assert!(diff.collateral.value() >= Decimal::ZERO);
        prop_assert!(diff.debt.value() >= Decimal::ZERO);
    }

    /// Redistribution settlement is exact: settled = stored + delta * stake,
    /// component-wise, for representable fixed-point values
    #[test]
    fn redistribution_settlement_exact(
        collateral in amount_strategy(),
        debt in amount_strategy(),
        delta_collateral in amount_strategy(),
        delta_debt in amount_strategy(),
        stake in stake_strategy(),
    ) {
        let snapshot = Trove::new(
            Amount::new_unchecked(dec!(100)),
            Amount::new_unchecked(dec!(50)),
        );
        let delta = Trove::new(delta_collateral, delta_debt);
        let current = snapshot.add(&delta);

        let trove = TroveWithPendingRedistribution::new(
            Address::new("0xowner"),
            TroveStatus::Open,
            Trove::new(collateral, debt),
            stake,
            snapshot,
        );

        let settled = trove.apply_redistribution(&current);

        // 4dp inputs: every intermediate product fits in 18dp exactly
        prop_assert_eq!(
            settled.collateral().value(),
            collateral.value() + delta_collateral.value() * stake.value()
        );
        prop_assert_eq!(
            settled.debt().value(),
            debt.value() + delta_debt.value() * stake.value()
        );
    }

    /// Base rate decays monotonically: more elapsed time never raises it
    #[test]
    fn base_rate_monotone_non_increasing(
        base in rate_strategy(),
        decay in decay_factor_strategy(),
        t1 in 0i64..10_000_000i64,
        t2 in 0i64..10_000_000i64,
    ) {
        let fees = fees_with(base, decay, false);
        let (earlier, later) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };

        let rate_earlier = fees.base_rate(Some(Timestamp::from_millis(earlier)));
        let rate_later = fees.base_rate(Some(Timestamp::from_millis(later)));

        prop_assert!(rate_later <= rate_earlier);
    }

    /// At zero elapsed time the base rate equals the undecayed value exactly
    #[test]
    fn base_rate_identity_at_zero_elapsed(
        base in rate_strategy(),
        decay in decay_factor_strategy(),
    ) {
        let fees = fees_with(base, decay, false);
        prop_assert_eq!(fees.base_rate(Some(Timestamp::from_millis(0))), base);
    }

    /// Borrowing rate stays in [min, max] in normal mode and is exactly zero
    /// in recovery mode
    #[test]
    fn borrowing_rate_bounded(
        base in rate_strategy(),
        decay in decay_factor_strategy(),
        at in 0i64..10_000_000i64,
        recovery in any::<bool>(),
    ) {
        let fees = fees_with(base, decay, recovery);
        let rate = fees.borrowing_rate(Some(Timestamp::from_millis(at)));

        if recovery {
            prop_assert_eq!(rate, Amount::ZERO);
        } else {
            prop_assert!(rate >= MINIMUM_BORROWING_RATE);
            prop_assert!(rate <= MAXIMUM_BORROWING_RATE);
        }
    }

    /// Redemption rate stays in [min, 1] for any redeemed fraction
    #[test]
    fn redemption_rate_bounded(
        base in rate_strategy(),
        decay in decay_factor_strategy(),
        fraction in (0i64..=10_000i64).prop_map(|x| Amount::new_unchecked(Decimal::new(x, 4))),
    ) {
        let fees = fees_with(base, decay, false);
        let rate = fees.redemption_rate(fraction, None);

        prop_assert!(rate >= MINIMUM_REDEMPTION_RATE);
        prop_assert!(rate <= Amount::ONE);
    }

    /// The selector never returns more than the limit, never invents troves,
    /// and never returns duplicates
    #[test]
    fn selector_respects_limit_and_candidates(
        collaterals in prop::collection::vec(1i64..1_000_0000i64, 0..8),
        limit in 0usize..6,
        pool in (0i64..100_000_0000i64).prop_map(|x| Amount::new_unchecked(Decimal::new(x, 4))),
    ) {
        let candidates: Vec<UserTrove> = collaterals
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                UserTrove::new(
                    Address::new(format!("0x{:02}", i)),
                    TroveStatus::Open,
                    // debt scaled so every candidate is near the liquidation
                    // threshold at the chosen price
                    Trove::new(
                        Amount::new_unchecked(Decimal::new(c, 4)),
                        Amount::new_unchecked(Decimal::new(c, 4) * dec!(700)),
                    ),
                )
            })
            .collect();

        let state = LiquidationState {
            total: Trove::new(
                Amount::new_unchecked(dec!(10_000)),
                Amount::new_unchecked(dec!(4_000_000)),
            ),
            price: Price::new_unchecked(dec!(0.001)),
            stability_pool_balance: pool,
        };

        let selected = select_for_liquidation(candidates.clone(), &state, limit);

        prop_assert!(selected.len() <= limit);
        let mut seen = std::collections::HashSet::new();
        for trove in &selected {
            prop_assert!(candidates.iter().any(|c| c == trove));
            prop_assert!(seen.insert(trove.owner_address.clone()), "duplicate selection");
        }
    }
}

/// Non-proptest stress scenarios
#[cfg(test)]
mod stress_tests {
    use super::*;

    #[test]
    fn deep_redistribution_history_stays_exact() {
        // a trove left untouched through many redistribution rounds settles
        // in one step, identical to settling after each round
        let stake = Amount::new_unchecked(dec!(0.002));
        let snapshot = Trove::EMPTY;
        let trove = TroveWithPendingRedistribution::new(
            Address::new("0xpatient"),
            TroveStatus::Open,
            Trove::new(
                Amount::new_unchecked(dec!(10)),
                Amount::new_unchecked(dec!(4_000)),
            ),
            stake,
            snapshot,
        );

        let mut accumulator = Trove::EMPTY;
        for _ in 0..1_000 {
            accumulator = accumulator.add(&Trove::new(
                Amount::new_unchecked(dec!(0.5)),
                Amount::new_unchecked(dec!(250)),
            ));
        }

        let settled = trove.apply_redistribution(&accumulator);
        assert_eq!(settled.collateral().value(), dec!(10) + dec!(500) * dec!(0.002));
        assert_eq!(settled.debt().value(), dec!(4_000) + dec!(250_000) * dec!(0.002));
    }

    #[test]
    fn base_rate_decay_over_a_week() {
        let fees = Fees::new(
            Amount::new_unchecked(dec!(0.05)),
            Amount::new_unchecked(dec!(0.999037758833783)),
            Amount::new_unchecked(dec!(2)),
            Timestamp::from_millis(0),
            Timestamp::from_millis(0),
            false,
        );

        // half-life of the reference decay factor is about 12 hours
        let half_day = fees.base_rate(Some(Timestamp::from_millis(12 * 60 * 60 * 1000)));
        assert!(half_day.value() > dec!(0.024));
        assert!(half_day.value() < dec!(0.026));

        let week = fees.base_rate(Some(Timestamp::from_millis(7 * 24 * 60 * 60 * 1000)));
        assert!(week.value() < dec!(0.000004));
    }

    #[test]
    fn selector_handles_a_large_candidate_page() {
        let candidates: Vec<UserTrove> = (0..500)
            .map(|i| {
                UserTrove::new(
                    Address::new(format!("0x{:04}", i)),
                    TroveStatus::Open,
                    Trove::new(
                        Amount::new_unchecked(Decimal::from(i + 1)),
                        Amount::new_unchecked(Decimal::from((i + 1) * 1_000)),
                    ),
                )
            })
            .collect();

        let state = LiquidationState {
            total: Trove::new(
                Amount::new_unchecked(dec!(200_000)),
                Amount::new_unchecked(dec!(70_000_000)),
            ),
            price: Price::new_unchecked(dec!(0.001)),
            stability_pool_balance: Amount::new_unchecked(dec!(1_000_000)),
        };

        // every candidate sits at ratio 1.0: all liquidatable
        let selected = select_for_liquidation(candidates, &state, 10);

        assert_eq!(selected.len(), 10);
        // largest collateral first
        assert_eq!(selected[0].collateral().value(), Decimal::from(500));
        assert_eq!(selected[9].collateral().value(), Decimal::from(491));
    }
}
