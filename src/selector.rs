// 6.0: liquidation candidate selection. a greedy simulation over a snapshot of
// system state: pick the largest liquidatable trove, replay the settlement
// arithmetic against the simulated totals, repeat. Nothing here mutates the
// store; the ledger's own settlement recomputes the authoritative outcome at
// execution time, so overestimating candidates only wastes gas while
// underestimating forfeits compensation.

use crate::trove::{Trove, UserTrove};
use crate::types::{Amount, Price, LIQUIDATION_RESERVE};

/// 0.5% of collateral, taken off the top of every liquidated trove.
const GAS_COMPENSATION_DIVISOR: u64 = 200;

// 6.1: the snapshot the selection runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationState {
    pub total: Trove,
    pub price: Price,
    pub stability_pool_balance: Amount,
}

impl LiquidationState {
    pub fn in_recovery_mode(&self) -> bool {
        !self.total.debt.is_zero() && self.total.collateral_ratio_is_below_critical(self.price)
    }

    fn collateral_ratio(&self) -> Amount {
        self.total.collateral_ratio(self.price)
    }
}

// 6.2: liquidatability at the current simulated state. recovery mode admits a
// second branch: troves above minimum but below the system's own ratio are
// liquidatable if the pool can absorb their full debt.
fn is_liquidatable(trove: &UserTrove, state: &LiquidationState, recovery_mode: bool) -> bool {
    if trove.debt().is_zero() {
        return false;
    }

    if trove.trove.collateral_ratio_is_below_minimum(state.price) {
        return true;
    }

    recovery_mode
        && trove.trove.collateral_ratio(state.price) < state.collateral_ratio()
        && trove.debt() <= state.stability_pool_balance
}

// 6.3: settlement arithmetic for one trove. gas compensation leaves the system
// unconditionally; the remainder offsets against the pool when allowed, fully
// if the pool covers the debt, otherwise draining the pool with a proportional
// share of the collateral.
fn simulate_liquidation(
    trove: &UserTrove,
    state: &LiquidationState,
    recovery_mode: bool,
) -> LiquidationState {
    let gas_compensation = trove
        .collateral()
        .div(Amount::from(GAS_COMPENSATION_DIVISOR));
    let after_gas = trove.trove.subtract_collateral(gas_compensation);

    let mut total = state.total;
    let mut pool = state.stability_pool_balance;

    let offsettable =
        !recovery_mode || after_gas.collateral_ratio(state.price) > Amount::ONE;

    if offsettable && !pool.is_zero() {
        if after_gas.debt <= pool {
            pool = pool.sub(after_gas.debt);
            total = total.subtract(&after_gas);
        } else {
            let absorbed_collateral = after_gas.collateral.mul_div(pool, after_gas.debt);
            total = total.subtract(&Trove::new(absorbed_collateral, pool));
            pool = Amount::ZERO;
        }
    }

    total = total.subtract_collateral(gas_compensation);

    LiquidationState {
        total,
        price: state.price,
        stability_pool_balance: pool,
    }
}

/// Picks up to `maximum` troves predicted liquidatable in sequence, largest
/// collateral first. System mode is re-derived from the simulated totals before
/// every pick, so a selection can start in recovery mode and finish in normal
/// mode as offsets shrink the system.
pub fn select_for_liquidation(
    mut candidates: Vec<UserTrove>,
    state: &LiquidationState,
    maximum: usize,
) -> Vec<UserTrove> {
    // stable descending sort; equal collateral keeps input order
    candidates.sort_by(|a, b| b.collateral().cmp(&a.collateral()));

    let mut state = state.clone();
    let mut selected = Vec::new();

    while selected.len() < maximum {
        let recovery_mode = state.in_recovery_mode();
        let Some(index) = candidates
            .iter()
            .position(|t| is_liquidatable(t, &state, recovery_mode))
        else {
            break;
        };

        let trove = candidates.remove(index);
        state = simulate_liquidation(&trove, &state, recovery_mode);
        selected.push(trove);
    }

    selected
}

/// Expected caller compensation for submitting a batch: 0.5% of aggregate
/// collateral value in debt-token terms, less the block builder's cut, plus
/// the flat per-trove reserve. Informational only; submission is not gated on
/// it.
pub fn expected_compensation(troves: &[UserTrove], price: Price, miner_cut: Amount) -> Amount {
    let collateral_value_cut: Amount = troves
        .iter()
        .map(|t| {
            t.collateral()
                .mul_div(price.amount(), Amount::from(GAS_COMPENSATION_DIVISOR))
        })
        .sum();

    collateral_value_cut
        .mul(Amount::ONE.sub(miner_cut))
        .add(LIQUIDATION_RESERVE.mul(Amount::from(troves.len() as u64)))
}
