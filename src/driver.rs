// 8.0: liquidation driver. decides when an attempt is warranted, pulls the
// riskiest candidates, runs the selection and submits the batch. The
// at-most-one-concurrent rule for attempts is an explicit state machine: a
// trigger landing mid-attempt is recorded as one deferred flag, never a queue.

use crate::ledger::{
    LiquidationDetails, LiquidationSender, PendingLiquidation, ProtocolReader, ReadError,
    SendError, TroveListingParams,
};
use crate::selector::{expected_compensation, select_for_liquidation, LiquidationState};
use crate::store::StoreState;
use crate::types::{Address, Amount};
use log::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DriverError<R: std::fmt::Debug> {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Send(#[from] SendError<R>),
}

// 8.1: idle / running / running-with-deferred-rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskPhase {
    Idle,
    Running,
    RunningWithDeferred,
}

#[derive(Debug)]
pub struct LiquidationTask {
    phase: TaskPhase,
}

impl Default for LiquidationTask {
    fn default() -> Self {
        Self::new()
    }
}

impl LiquidationTask {
    pub fn new() -> Self {
        Self {
            phase: TaskPhase::Idle,
        }
    }

    /// True when the caller should run an attempt now. A trigger during a run
    /// collapses into a single deferred flag no matter how many arrive.
    pub fn request_run(&mut self) -> bool {
        match self.phase {
            TaskPhase::Idle => {
                self.phase = TaskPhase::Running;
                true
            }
            TaskPhase::Running | TaskPhase::RunningWithDeferred => {
                self.phase = TaskPhase::RunningWithDeferred;
                false
            }
        }
    }

    /// Marks the current attempt finished. True when a deferred trigger calls
    /// for exactly one follow-up run, in which case the task stays running.
    pub fn finish(&mut self) -> bool {
        match self.phase {
            TaskPhase::RunningWithDeferred => {
                self.phase = TaskPhase::Running;
                true
            }
            _ => {
                self.phase = TaskPhase::Idle;
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != TaskPhase::Idle
    }
}

#[derive(Debug)]
pub enum AttemptOutcome {
    /// The selector found nothing liquidatable in the candidate page.
    NothingToLiquidate,
    /// Read-only mode: the opportunity is reported, never submitted.
    ObservedOnly {
        addresses: Vec<Address>,
        expected_compensation: Amount,
    },
    Liquidated(LiquidationDetails),
}

// 8.2: policy and the attempt flow.
pub struct Liquidator {
    max_troves_to_liquidate: u32,
    /// No signing credential configured; observe and report only.
    read_only: bool,
    miner_cut: Amount,
}

impl Liquidator {
    pub fn new(max_troves_to_liquidate: u32, read_only: bool, miner_cut: Amount) -> Self {
        Self {
            max_troves_to_liquidate,
            read_only,
            miner_cut,
        }
    }

    /// Whether the current snapshot warrants an attempt. Normal mode: the
    /// riskiest trove is below minimum. Recovery mode: the riskiest trove is
    /// riskier than the system average, by nominal ratio so a price wobble
    /// cannot flip the comparison between the two reads.
    pub fn should_attempt<X>(&self, state: &StoreState<X>) -> bool {
        let riskiest = state
            .base
            .riskiest_trove_before_redistribution
            .apply_redistribution(&state.base.total_redistributed);

        if riskiest.debt().is_zero() || state.base.total.debt.is_zero() {
            return false;
        }

        if state.base.total.collateral_ratio_is_below_critical(state.base.price) {
            riskiest.trove.nominal_collateral_ratio()
                < state.base.total.nominal_collateral_ratio()
        } else {
            riskiest.trove.collateral_ratio_is_below_minimum(state.base.price)
        }
    }

    /// One liquidation attempt against the given snapshot. Read and send
    /// failures bubble up; the periodic refresh provides the retry.
    pub fn attempt<X, L>(
        &self,
        ledger: &mut L,
        state: &StoreState<X>,
    ) -> Result<AttemptOutcome, DriverError<L::Receipt>>
    where
        L: ProtocolReader + LiquidationSender,
    {
        let candidates: Vec<_> = ledger
            .troves_before_redistribution(&TroveListingParams::riskiest_first(
                self.max_troves_to_liquidate,
            ))?
            .iter()
            .map(|t| t.apply_redistribution(&state.base.total_redistributed))
            .collect();

        let snapshot = LiquidationState {
            total: state.base.total,
            price: state.base.price,
            stability_pool_balance: state.base.stability_pool_balance,
        };

        let selected = select_for_liquidation(
            candidates,
            &snapshot,
            self.max_troves_to_liquidate as usize,
        );

        if selected.is_empty() {
            return Ok(AttemptOutcome::NothingToLiquidate);
        }

        let estimate = expected_compensation(&selected, snapshot.price, self.miner_cut);
        let addresses: Vec<Address> = selected
            .iter()
            .map(|t| t.owner_address.clone())
            .collect();

        info!(
            "attempting to liquidate {} trove(s), expected compensation {}",
            addresses.len(),
            estimate
        );

        if self.read_only {
            warn!("no wallet configured; reporting only");
            return Ok(AttemptOutcome::ObservedOnly {
                addresses,
                expected_compensation: estimate,
            });
        }

        let mut pending = ledger.liquidate(&addresses)?;
        let details = pending.wait_for_success()?;

        info!(
            "liquidated {} trove(s), gas compensation {} collateral + {} debt tokens",
            details.liquidated_addresses.len(),
            details.collateral_gas_compensation,
            details.debt_gas_compensation
        );

        Ok(AttemptOutcome::Liquidated(details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::Fees;
    use crate::ledger::MockLedger;
    use crate::source::BlockPolledSource;
    use crate::types::{Price, Timestamp};
    use rust_decimal_macros::dec;

    fn amt(value: rust_decimal::Decimal) -> Amount {
        Amount::new_unchecked(value)
    }

    fn fees() -> Fees {
        Fees::new(
            amt(dec!(0.01)),
            amt(dec!(0.99)),
            amt(dec!(2)),
            Timestamp::from_millis(0),
            Timestamp::from_millis(0),
            false,
        )
    }

    fn populated_ledger() -> MockLedger {
        let mut ledger = MockLedger::new(Price::new_unchecked(dec!(0.001)), fees());
        ledger.stability_pool_balance = amt(dec!(100_000));
        // safe backing mass keeps the system in normal mode
        ledger.open_trove(Address::new("0xsafe"), amt(dec!(990)), amt(dec!(390_000)));
        // ratio 1.4: below minimum
        ledger.open_trove(Address::new("0xrisky"), amt(dec!(7)), amt(dec!(5_000)));
        ledger
    }

    #[test]
    fn task_coalesces_triggers_into_one_deferred_rerun() {
        let mut task = LiquidationTask::new();

        assert!(task.request_run());
        assert!(!task.request_run());
        assert!(!task.request_run());
        assert!(task.is_running());

        // three triggers during the run, exactly one follow-up
        assert!(task.finish());
        assert!(task.is_running());
        assert!(!task.finish());
        assert!(!task.is_running());
    }

    #[test]
    fn attempt_liquidates_selected_troves() {
        let mut ledger = populated_ledger();
        let mut source = BlockPolledSource::new(ledger.clone(), None);
        source.start(1, Timestamp::from_millis(0)).unwrap();
        let state = source.store().state();

        let liquidator = Liquidator::new(10, false, Amount::ZERO);
        assert!(liquidator.should_attempt(&state));

        let outcome = liquidator.attempt(&mut ledger, &state).unwrap();
        let AttemptOutcome::Liquidated(details) = outcome else {
            panic!("expected a liquidation");
        };
        assert_eq!(details.liquidated_addresses, vec![Address::new("0xrisky")]);
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[test]
    fn read_only_mode_never_submits() {
        let mut ledger = populated_ledger();
        let mut source = BlockPolledSource::new(ledger.clone(), None);
        source.start(1, Timestamp::from_millis(0)).unwrap();
        let state = source.store().state();

        let liquidator = Liquidator::new(10, true, Amount::ZERO);
        let outcome = liquidator.attempt(&mut ledger, &state).unwrap();

        let AttemptOutcome::ObservedOnly { addresses, .. } = outcome else {
            panic!("expected observation only");
        };
        assert_eq!(addresses, vec![Address::new("0xrisky")]);
        assert!(ledger.submissions().is_empty());
    }

    #[test]
    fn no_attempt_when_riskiest_is_safe() {
        let mut ledger = MockLedger::new(Price::new_unchecked(dec!(0.001)), fees());
        ledger.open_trove(Address::new("0xsafe"), amt(dec!(990)), amt(dec!(390_000)));

        let mut source = BlockPolledSource::new(ledger, None);
        source.start(1, Timestamp::from_millis(0)).unwrap();

        let liquidator = Liquidator::new(10, false, Amount::ZERO);
        assert!(!liquidator.should_attempt(&source.store().state()));
    }
}
