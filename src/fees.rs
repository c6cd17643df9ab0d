// 3.0: fee schedule. the base rate decays multiplicatively per whole minute
// since the last fee-triggering operation; borrowing and redemption rates are
// clamped functions of it. values are immutable; recovery mode is swapped in
// via a copy so the store can re-derive without touching the source fields.

use crate::types::{
    Amount, Timestamp, MAXIMUM_BORROWING_RATE, MINIMUM_BORROWING_RATE, MINIMUM_REDEMPTION_RATE,
};
use std::fmt;

const MILLISECONDS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fees {
    base_rate_without_decay: Amount,
    minute_decay_factor: Amount,
    beta: Amount,
    last_fee_operation: Timestamp,
    time_of_latest_block: Timestamp,
    recovery_mode: bool,
}

impl Fees {
    /// A decay factor at or above 1 is a programming error: the base rate
    /// would grow without bound instead of decaying.
    pub fn new(
        base_rate_without_decay: Amount,
        minute_decay_factor: Amount,
        beta: Amount,
        last_fee_operation: Timestamp,
        time_of_latest_block: Timestamp,
        recovery_mode: bool,
    ) -> Self {
        assert!(minute_decay_factor < Amount::ONE);

        Self {
            base_rate_without_decay,
            minute_decay_factor,
            beta,
            last_fee_operation,
            time_of_latest_block,
            recovery_mode,
        }
    }

    pub fn set_recovery_mode(&self, recovery_mode: bool) -> Fees {
        Fees {
            recovery_mode,
            ..self.clone()
        }
    }

    pub fn recovery_mode(&self) -> bool {
        self.recovery_mode
    }

    /// Decayed base rate at `when` (default: latest block time). Elapsed time
    /// is clamped at zero so a client clock behind the ledger's slightly
    /// overestimates the rate rather than underestimating it.
    pub fn base_rate(&self, when: Option<Timestamp>) -> Amount {
        let when = when.unwrap_or(self.time_of_latest_block);
        let elapsed_ms = when.saturating_millis_since(self.last_fee_operation);
        let whole_minutes = elapsed_ms / MILLISECONDS_PER_MINUTE;
        let exponent = u32::try_from(whole_minutes).unwrap_or(u32::MAX);

        self.minute_decay_factor
            .pow(exponent)
            .mul(self.base_rate_without_decay)
    }

    pub fn borrowing_rate(&self, when: Option<Timestamp>) -> Amount {
        if self.recovery_mode {
            Amount::ZERO
        } else {
            MINIMUM_BORROWING_RATE
                .add(self.base_rate(when))
                .min(MAXIMUM_BORROWING_RATE)
        }
    }

    pub fn redemption_rate(
        &self,
        redeemed_fraction_of_supply: Amount,
        when: Option<Timestamp>,
    ) -> Amount {
        let mut base_rate = self.base_rate(when);

        if !redeemed_fraction_of_supply.is_zero() {
            base_rate = redeemed_fraction_of_supply.div(self.beta).add(base_rate);
        }

        MINIMUM_REDEMPTION_RATE.add(base_rate).min(Amount::ONE)
    }
}

// The rendering deliberately omits the per-block timestamps: the store uses it
// as a cheap "did the observable value change" probe to suppress per-block
// notification spam on a rate that hasn't meaningfully moved.
impl fmt::Display for Fees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ base_rate_without_decay: {}, last_fee_operation: {}, recovery_mode: {} }}",
            self.base_rate_without_decay,
            self.last_fee_operation.as_millis(),
            self.recovery_mode
        )
    }
}
