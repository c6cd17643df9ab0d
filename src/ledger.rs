// 5.0: ledger integration seam. the bot is agnostic to whether reads come from
// a JSON-RPC node, a subgraph, or a test double; these traits are the entire
// surface the core consumes. 5.3 has the receipt taxonomy for the write path,
// 5.5 an in-memory mock used by the sim binary and the integration tests.

use crate::fees::Fees;
use crate::trove::{Trove, TroveStatus, TroveWithPendingRedistribution, UserTrove};
use crate::types::{Address, Amount, Price, Timestamp, LIQUIDATION_RESERVE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Errors from the external read path. These propagate to the caller of the
/// current refresh cycle; the periodic self-refresh is the retry mechanism.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadError {
    #[error("ledger connection error: {0}")]
    Connection(String),

    #[error("malformed ledger response: {0}")]
    MalformedResponse(String),
}

// 5.1: paged trove listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortedBy {
    AscendingCollateralRatio,
    DescendingCollateralRatio,
}

#[derive(Debug, Clone)]
pub struct TroveListingParams {
    pub first: u32,
    pub sorted_by: SortedBy,
    pub starting_at: u32,
}

impl TroveListingParams {
    pub fn riskiest_first(first: u32) -> Self {
        Self {
            first,
            sorted_by: SortedBy::AscendingCollateralRatio,
            starting_at: 0,
        }
    }
}

// 5.2: read surface consumed by the state source and the driver.
pub trait ProtocolReader {
    fn price(&self) -> Result<Price, ReadError>;
    fn number_of_troves(&self) -> Result<u32, ReadError>;
    fn total(&self) -> Result<Trove, ReadError>;
    fn total_redistributed(&self) -> Result<Trove, ReadError>;
    fn stability_pool_balance(&self) -> Result<Amount, ReadError>;
    /// Fee parameters at the latest block, with recovery mode off; the store
    /// derives the recovery-mode variant itself.
    fn fees_in_normal_mode(&self) -> Result<Fees, ReadError>;
    fn block_timestamp(&self) -> Result<Timestamp, ReadError>;
    fn account_balance(&self, address: &Address) -> Result<Amount, ReadError>;

    /// Troves as last physically touched, with their redistribution snapshots.
    fn troves_before_redistribution(
        &self,
        params: &TroveListingParams,
    ) -> Result<Vec<TroveWithPendingRedistribution>, ReadError>;

    fn troves(&self, params: &TroveListingParams) -> Result<Vec<UserTrove>, ReadError>;
}

// 5.3: write surface. a mined-but-reverted transaction is a structured failed
// receipt, not an error; the convenience wait_for_success converts it into a
// typed error carrying the receipt. a transaction superseded by a same-slot
// replacement surfaces as Cancelled when the replacement dropped it, while
// "replaced"/"repriced" resolve with the replacement's own receipt.
#[derive(Debug, Clone)]
pub struct LiquidationDetails {
    pub liquidated_addresses: Vec<Address>,
    pub total_liquidated: Trove,
    pub debt_gas_compensation: Amount,
    pub collateral_gas_compensation: Amount,
}

#[derive(Debug, Clone)]
pub enum MinedReceipt<R> {
    Failed { raw_receipt: R },
    Succeeded { raw_receipt: R, details: LiquidationDetails },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError<R: std::fmt::Debug> {
    #[error("transaction reverted")]
    Failed { raw_receipt: R },

    #[error("transaction cancelled by a replacement")]
    Cancelled,

    #[error("transaction send error: {0}")]
    Connection(String),
}

pub trait PendingLiquidation {
    type Receipt: std::fmt::Debug;

    fn wait_for_receipt(&mut self) -> Result<MinedReceipt<Self::Receipt>, SendError<Self::Receipt>>;

    fn wait_for_success(&mut self) -> Result<LiquidationDetails, SendError<Self::Receipt>> {
        match self.wait_for_receipt()? {
            MinedReceipt::Failed { raw_receipt } => Err(SendError::Failed { raw_receipt }),
            MinedReceipt::Succeeded { details, .. } => Ok(details),
        }
    }
}

pub trait LiquidationSender {
    type Receipt: std::fmt::Debug;
    type Pending: PendingLiquidation<Receipt = Self::Receipt>;

    /// Submit a liquidation naming an explicit address list.
    fn liquidate(
        &mut self,
        addresses: &[Address],
    ) -> Result<Self::Pending, SendError<Self::Receipt>>;

    /// Submit a liquidation letting the ledger pick up to `maximum` troves.
    fn liquidate_up_to(
        &mut self,
        maximum: u32,
    ) -> Result<Self::Pending, SendError<Self::Receipt>>;
}

// 5.5: in-memory ledger double. settlement is deliberately simple: an address
// is cleared when its settled ratio is below minimum, the pool absorbs as much
// debt as it holds, and 0.5% of collateral plus the flat reserve is reported
// as gas compensation. Enough fidelity for the sim and the driver tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockReceipt {
    pub tx_id: u64,
    pub reverted: bool,
}

pub struct MockPendingLiquidation {
    outcome: Option<Result<MinedReceipt<MockReceipt>, SendError<MockReceipt>>>,
}

impl PendingLiquidation for MockPendingLiquidation {
    type Receipt = MockReceipt;

    fn wait_for_receipt(&mut self) -> Result<MinedReceipt<MockReceipt>, SendError<MockReceipt>> {
        self.outcome
            .take()
            .expect("wait_for_receipt called twice on the same transaction")
    }
}

#[derive(Clone)]
pub struct MockLedger {
    pub price: Price,
    pub total: Trove,
    pub total_redistributed: Trove,
    pub stability_pool_balance: Amount,
    pub fees: Fees,
    pub block_timestamp: Timestamp,
    pub balances: HashMap<Address, Amount>,
    troves: Vec<TroveWithPendingRedistribution>,
    next_tx_id: u64,
    /// When set, the next submission mines a reverted receipt.
    pub fail_next_send: bool,
    /// When set, the next submission is dropped by a cancelling replacement.
    pub cancel_next_send: bool,
    submissions: Vec<Vec<Address>>,
}

impl MockLedger {
    pub fn new(price: Price, fees: Fees) -> Self {
        Self {
            price,
            total: Trove::EMPTY,
            total_redistributed: Trove::EMPTY,
            stability_pool_balance: Amount::ZERO,
            fees,
            block_timestamp: Timestamp::from_millis(0),
            balances: HashMap::new(),
            troves: Vec::new(),
            next_tx_id: 1,
            fail_next_send: false,
            cancel_next_send: false,
            submissions: Vec::new(),
        }
    }

    pub fn open_trove(&mut self, owner: Address, collateral: Amount, debt: Amount) {
        self.troves.push(TroveWithPendingRedistribution::new(
            owner,
            TroveStatus::Open,
            Trove::new(collateral, debt),
            Amount::ZERO,
            self.total_redistributed,
        ));
        self.total = self.total.add(&Trove::new(collateral, debt));
    }

    pub fn submissions(&self) -> &[Vec<Address>] {
        &self.submissions
    }

    fn settled(&self, trove: &TroveWithPendingRedistribution) -> UserTrove {
        trove.apply_redistribution(&self.total_redistributed)
    }

    fn sorted_troves(&self, sorted_by: SortedBy) -> Vec<TroveWithPendingRedistribution> {
        let mut sorted = self.troves.clone();
        // zero-debt troves have no ratio; they sort as infinitely safe
        let ratio = |t: &TroveWithPendingRedistribution| {
            let settled = t.apply_redistribution(&self.total_redistributed);
            if settled.debt().is_zero() {
                None
            } else {
                Some(settled.trove.nominal_collateral_ratio())
            }
        };
        sorted.sort_by(|a, b| match (ratio(a), ratio(b)) {
            (Some(ra), Some(rb)) => ra.cmp(&rb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        if sorted_by == SortedBy::DescendingCollateralRatio {
            sorted.reverse();
        }
        sorted
    }

    fn page(
        &self,
        params: &TroveListingParams,
    ) -> Vec<TroveWithPendingRedistribution> {
        self.sorted_troves(params.sorted_by)
            .into_iter()
            .skip(params.starting_at as usize)
            .take(params.first as usize)
            .collect()
    }

    fn settle_liquidation(&mut self, addresses: &[Address]) -> LiquidationDetails {
        let mut cleared = Vec::new();
        let mut total_liquidated = Trove::EMPTY;
        let mut collateral_gas_compensation = Amount::ZERO;

        for address in addresses {
            let Some(index) = self
                .troves
                .iter()
                .position(|t| t.owner_address() == address)
            else {
                continue;
            };

            let settled = self.settled(&self.troves[index]);
            if settled.debt().is_zero()
                || !settled.trove.collateral_ratio_is_below_minimum(self.price)
            {
                // the contract clips ineligible addresses out of the batch
                continue;
            }

            self.troves.remove(index);

            let gas_compensation = settled.collateral().div(Amount::from(200u64));
            let absorbed = settled.debt().min(self.stability_pool_balance);
            self.stability_pool_balance = self.stability_pool_balance.sub(absorbed);
            self.total = self.total.subtract(&settled.trove);

            collateral_gas_compensation = collateral_gas_compensation.add(gas_compensation);
            total_liquidated = total_liquidated.add(&settled.trove);
            cleared.push(settled.owner_address.clone());
        }

        let debt_gas_compensation =
            LIQUIDATION_RESERVE.mul(Amount::from(cleared.len() as u64));

        LiquidationDetails {
            liquidated_addresses: cleared,
            total_liquidated,
            debt_gas_compensation,
            collateral_gas_compensation,
        }
    }

    fn submit(
        &mut self,
        addresses: Vec<Address>,
    ) -> Result<MockPendingLiquidation, SendError<MockReceipt>> {
        let tx_id = self.next_tx_id;
        self.next_tx_id += 1;
        self.submissions.push(addresses.clone());

        if self.cancel_next_send {
            self.cancel_next_send = false;
            return Ok(MockPendingLiquidation {
                outcome: Some(Err(SendError::Cancelled)),
            });
        }

        if self.fail_next_send {
            self.fail_next_send = false;
            return Ok(MockPendingLiquidation {
                outcome: Some(Ok(MinedReceipt::Failed {
                    raw_receipt: MockReceipt {
                        tx_id,
                        reverted: true,
                    },
                })),
            });
        }

        let details = self.settle_liquidation(&addresses);
        Ok(MockPendingLiquidation {
            outcome: Some(Ok(MinedReceipt::Succeeded {
                raw_receipt: MockReceipt {
                    tx_id,
                    reverted: false,
                },
                details,
            })),
        })
    }
}

impl ProtocolReader for MockLedger {
    fn price(&self) -> Result<Price, ReadError> {
        Ok(self.price)
    }

    fn number_of_troves(&self) -> Result<u32, ReadError> {
        Ok(self.troves.len() as u32)
    }

    fn total(&self) -> Result<Trove, ReadError> {
        Ok(self.total)
    }

    fn total_redistributed(&self) -> Result<Trove, ReadError> {
        Ok(self.total_redistributed)
    }

    fn stability_pool_balance(&self) -> Result<Amount, ReadError> {
        Ok(self.stability_pool_balance)
    }

    fn fees_in_normal_mode(&self) -> Result<Fees, ReadError> {
        Ok(self.fees.clone())
    }

    fn block_timestamp(&self) -> Result<Timestamp, ReadError> {
        Ok(self.block_timestamp)
    }

    fn account_balance(&self, address: &Address) -> Result<Amount, ReadError> {
        Ok(self.balances.get(address).copied().unwrap_or(Amount::ZERO))
    }

    fn troves_before_redistribution(
        &self,
        params: &TroveListingParams,
    ) -> Result<Vec<TroveWithPendingRedistribution>, ReadError> {
        Ok(self.page(params))
    }

    fn troves(&self, params: &TroveListingParams) -> Result<Vec<UserTrove>, ReadError> {
        Ok(self
            .page(params)
            .into_iter()
            .map(|t| self.settled(&t))
            .collect())
    }
}

impl LiquidationSender for MockLedger {
    type Receipt = MockReceipt;
    type Pending = MockPendingLiquidation;

    fn liquidate(
        &mut self,
        addresses: &[Address],
    ) -> Result<Self::Pending, SendError<MockReceipt>> {
        self.submit(addresses.to_vec())
    }

    fn liquidate_up_to(
        &mut self,
        maximum: u32,
    ) -> Result<Self::Pending, SendError<MockReceipt>> {
        let addresses: Vec<Address> = self
            .sorted_troves(SortedBy::AscendingCollateralRatio)
            .iter()
            .map(|t| self.settled(t))
            .filter(|t| {
                !t.debt().is_zero() && t.trove.collateral_ratio_is_below_minimum(self.price)
            })
            .take(maximum as usize)
            .map(|t| t.owner_address)
            .collect();

        self.submit(addresses)
    }
}
