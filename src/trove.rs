// 2.0: trove accounting. a trove is one borrower's collateral/debt pair.
// every mutator returns a new instance; nothing here is ever negative.
// 2.3 has the lazy redistribution settlement, the invariant-bearing piece:
// global redistribution events touch one accumulator in O(1), and a trove's
// true balance is materialized on demand from (accumulator - snapshot) * stake.

use crate::types::{
    Address, Amount, Price, CRITICAL_COLLATERAL_RATIO, LIQUIDATION_RESERVE,
    MINIMUM_COLLATERAL_RATIO,
};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

const NOMINAL_COLLATERAL_RATIO_PRECISION: Amount = Amount(dec!(100));

// 2.1: the pure value type. collateral held against stablecoin debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trove {
    pub collateral: Amount,
    pub debt: Amount,
}

impl Trove {
    pub const EMPTY: Trove = Trove {
        collateral: Amount::ZERO,
        debt: Amount::ZERO,
    };

    pub fn new(collateral: Amount, debt: Amount) -> Self {
        Self { collateral, debt }
    }

    pub fn is_empty(&self) -> bool {
        self.collateral.is_zero() && self.debt.is_zero()
    }

    /// Debt minus the flat liquidation reserve. Querying this on a trove with
    /// debt below the reserve is a caller bug, not a recoverable condition.
    pub fn net_debt(&self) -> Amount {
        assert!(
            self.debt >= LIQUIDATION_RESERVE,
            "net_debt queried on a trove with debt below the liquidation reserve"
        );
        self.debt.sub(LIQUIDATION_RESERVE)
    }

    /// Price-independent ratio used for relative ordering: collateral * 100 / debt.
    pub fn nominal_collateral_ratio(&self) -> Amount {
        self.collateral
            .mul_div(NOMINAL_COLLATERAL_RATIO_PRECISION, self.debt)
    }

    pub fn collateral_ratio(&self, price: Price) -> Amount {
        self.collateral.div(self.debt.mul(price.amount()))
    }

    pub fn collateral_ratio_is_below_minimum(&self, price: Price) -> bool {
        self.collateral_ratio(price) < MINIMUM_COLLATERAL_RATIO
    }

    pub fn collateral_ratio_is_below_critical(&self, price: Price) -> bool {
        self.collateral_ratio(price) < CRITICAL_COLLATERAL_RATIO
    }

    pub fn is_openable_in_recovery_mode(&self, price: Price) -> bool {
        self.collateral_ratio(price) >= CRITICAL_COLLATERAL_RATIO
    }

    pub fn add(&self, that: &Trove) -> Trove {
        Trove::new(
            self.collateral.add(that.collateral),
            self.debt.add(that.debt),
        )
    }

    pub fn add_collateral(&self, collateral: Amount) -> Trove {
        Trove::new(self.collateral.add(collateral), self.debt)
    }

    pub fn add_debt(&self, debt: Amount) -> Trove {
        Trove::new(self.collateral, self.debt.add(debt))
    }

    /// Field-wise clamped subtraction: never observably negative.
    pub fn subtract(&self, that: &Trove) -> Trove {
        Trove::new(self.collateral.sub(that.collateral), self.debt.sub(that.debt))
    }

    pub fn subtract_collateral(&self, collateral: Amount) -> Trove {
        Trove::new(self.collateral.sub(collateral), self.debt)
    }

    pub fn subtract_debt(&self, debt: Amount) -> Trove {
        Trove::new(self.collateral, self.debt.sub(debt))
    }

    pub fn multiply(&self, multiplier: Amount) -> Trove {
        Trove::new(self.collateral.mul(multiplier), self.debt.mul(multiplier))
    }

    pub fn set_collateral(&self, collateral: Amount) -> Trove {
        Trove::new(collateral, self.debt)
    }

    pub fn set_debt(&self, debt: Amount) -> Trove {
        Trove::new(self.collateral, debt)
    }
}

impl fmt::Display for Trove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ collateral: {}, debt: {} }}",
            self.collateral, self.debt
        )
    }
}

// 2.2: trove + ownership. status tracks how a trove left the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TroveStatus {
    NonExistent,
    Open,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTrove {
    pub trove: Trove,
    pub owner_address: Address,
    pub status: TroveStatus,
}

impl UserTrove {
    pub fn new(owner_address: Address, status: TroveStatus, trove: Trove) -> Self {
        Self {
            trove,
            owner_address,
            status,
        }
    }

    pub fn collateral(&self) -> Amount {
        self.trove.collateral
    }

    pub fn debt(&self) -> Amount {
        self.trove.debt
    }
}

impl fmt::Display for UserTrove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ owner_address: \"{}\", collateral: {}, debt: {}, status: {:?} }}",
            self.owner_address, self.trove.collateral, self.trove.debt, self.status
        )
    }
}

// 2.3: a trove as last physically touched on the ledger. stake and snapshot are
// frozen at that touch; the stored collateral/debt are stale until
// apply_redistribution is called with the current global accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveWithPendingRedistribution {
    user_trove: UserTrove,
    stake: Amount,
    snapshot_of_total_redistributed: Trove,
}

impl TroveWithPendingRedistribution {
    pub fn new(
        owner_address: Address,
        status: TroveStatus,
        trove: Trove,
        stake: Amount,
        snapshot_of_total_redistributed: Trove,
    ) -> Self {
        Self {
            user_trove: UserTrove::new(owner_address, status, trove),
            stake,
            snapshot_of_total_redistributed,
        }
    }

    /// Sentinel for an empty system: zero address, non-existent status.
    pub fn non_existent(owner_address: Address) -> Self {
        Self::new(
            owner_address,
            TroveStatus::NonExistent,
            Trove::EMPTY,
            Amount::ZERO,
            Trove::EMPTY,
        )
    }

    pub fn owner_address(&self) -> &Address {
        &self.user_trove.owner_address
    }

    pub fn status(&self) -> TroveStatus {
        self.user_trove.status
    }

    /// Materializes the trove's true current balance: the only path by which
    /// up-to-date collateral/debt are obtained.
    pub fn apply_redistribution(&self, total_redistributed: &Trove) -> UserTrove {
        let after_redistribution = self.user_trove.trove.add(
            &total_redistributed
                .subtract(&self.snapshot_of_total_redistributed)
                .multiply(self.stake),
        );

        UserTrove::new(
            self.user_trove.owner_address.clone(),
            self.user_trove.status,
            after_redistribution,
        )
    }
}
