// 1.0: all the primitives live here. nothing in the bot works without these types.
// amounts, prices, addresses, timestamps. each is a newtype so the compiler catches type mixups.
//
// Amount is the workhorse: an 18-decimal-place non-negative magnitude. every
// collateral, debt, rate and ratio in the protocol is one of these. ratio math
// (collateral / (debt * price)) is chained and precision-sensitive, so mul_div
// is computed as a single expression and only the final result is re-quantized.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Decimal places carried by every [`Amount`]. Matches the protocol's
/// on-ledger fixed-point representation.
pub const AMOUNT_DECIMALS: u32 = 18;

// 1.1: protocol constants. these feed the ratio predicates and the fee clamps.
pub const CRITICAL_COLLATERAL_RATIO: Amount = Amount(dec!(2.0));
pub const MINIMUM_COLLATERAL_RATIO: Amount = Amount(dec!(1.5));
/// Flat debt-token reserve set aside per trove to reimburse the liquidator.
pub const LIQUIDATION_RESERVE: Amount = Amount(dec!(200));
pub const MINIMUM_BORROWING_RATE: Amount = Amount(dec!(0.005));
pub const MAXIMUM_BORROWING_RATE: Amount = Amount(dec!(0.05));
pub const MINIMUM_REDEMPTION_RATE: Amount = Amount(dec!(0.005));

fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DECIMALS, RoundingStrategy::ToZero)
}

// 1.2: non-negative 18dp magnitude. subtraction clamps at zero instead of
// underflowing: redistribution deltas can transiently imply tiny negative
// results from rounding, and those must never be observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(pub(crate) Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);
    pub const ONE: Amount = Amount(Decimal::ONE);

    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(quantize(value)))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value >= Decimal::ZERO);
        Self(quantize(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: Amount) -> Self {
        Self(quantize(self.0 + other.0))
    }

    /// Clamped subtraction: never goes below zero.
    pub fn sub(&self, other: Amount) -> Self {
        if self.0 > other.0 {
            Self(quantize(self.0 - other.0))
        } else {
            Self::ZERO
        }
    }

    pub fn mul(&self, other: Amount) -> Self {
        Self(quantize(self.0 * other.0))
    }

    /// Division. The zero denominator case is a caller precondition violation,
    /// not a runtime input error.
    pub fn div(&self, divisor: Amount) -> Self {
        self.checked_div(divisor)
            .expect("Amount::div by zero; caller must guarantee a non-zero divisor")
    }

    pub fn checked_div(&self, divisor: Amount) -> Option<Self> {
        if divisor.is_zero() {
            None
        } else {
            Some(Self(quantize(self.0 / divisor.0)))
        }
    }

    /// `self * b / c` with full intermediate precision. The two operations must
    /// not round separately: chained ratio computations lose their last digits
    /// otherwise.
    pub fn mul_div(&self, b: Amount, c: Amount) -> Self {
        assert!(
            !c.is_zero(),
            "Amount::mul_div by zero; caller must guarantee a non-zero divisor"
        );
        Self(quantize(self.0 * b.0 / c.0))
    }

    /// Integer exponentiation by squaring, re-quantizing each step the way the
    /// on-ledger fixed-point math does.
    pub fn pow(&self, mut exponent: u32) -> Self {
        let mut base = *self;
        let mut result = Amount::ONE;

        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result.mul(base);
            }
            exponent >>= 1;
            if exponent > 0 {
                base = base.mul(base);
            }
        }

        result
    }

    pub fn min(self, other: Amount) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(Decimal::from(value))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, a| acc.add(a))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// 1.3: price in debt-token units per unit of collateral. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Amount);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(Amount(quantize(value))))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(Amount(quantize(value)))
    }

    pub fn amount(&self) -> Amount {
        self.0
    }

    pub fn value(&self) -> Decimal {
        self.0.value()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.4: ledger account address. opaque to the bot beyond equality and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Placeholder owner for the "no troves exist" sentinel.
    pub fn zero() -> Self {
        Self("0x0000000000000000000000000000000000000000".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.5: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn plus_millis(&self, millis: i64) -> Self {
        Self(self.0 + millis)
    }

    /// Milliseconds elapsed since `earlier`, clamped at zero. A client clock
    /// behind the ledger's clock must never produce negative elapsed time.
    pub fn saturating_millis_since(&self, earlier: Timestamp) -> i64 {
        (self.0 - earlier.0).max(0)
    }
}
