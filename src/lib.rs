// liqbot-core: trove monitoring and liquidation selection engine.
// prediction-first architecture: every submission is rehearsed against a
// simulated copy of system state before it is sent.
// all computation is deterministic; time and ledger I/O enter as explicit data.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Amount, Price, Address, Timestamp, constants
//   2.x  trove.rs: collateral/debt pairs, lazy redistribution settlement
//   3.x  fees.rs: time-decayed base rate, borrowing/redemption rates
//   4.x  store.rs: reactive state store, field-wise reconcile, subscriptions
//   5.x  ledger.rs: read/write traits, receipt taxonomy, in-memory mock
//   6.x  selector.rs: greedy liquidation selection over a simulated state
//   7.x  source.rs: block-polled store adapter, new-block debounce
//   8.x  driver.rs: attempt trigger, coalesced task state machine
//   9.x  config.rs: endpoints, credential, submission limits

// protocol state modules
pub mod fees;
pub mod store;
pub mod trove;
pub mod types;

// decision modules
pub mod driver;
pub mod selector;

// integration modules
pub mod config;
pub mod ledger;
pub mod source;

// re exports for convenience
pub use fees::*;
pub use store::*;
pub use trove::*;
pub use types::*;
pub use driver::{AttemptOutcome, DriverError, LiquidationTask, Liquidator};
pub use ledger::{
    LiquidationDetails, LiquidationSender, MinedReceipt, MockLedger, PendingLiquidation,
    ProtocolReader, ReadError, SendError, SortedBy, TroveListingParams,
};
pub use selector::{expected_compensation, select_for_liquidation, LiquidationState};
pub use source::{BlockCoalescer, BlockPolledExtra, BlockPolledSource};
pub use config::{BotConfig, ConfigError};
