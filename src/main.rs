//! Liquidation Bot Core Simulation.
//!
//! Demonstrates the full monitoring lifecycle against an in-memory ledger:
//! store loading, new-block debounce, fee decay, candidate selection and
//! liquidation submission through a price crash.

use liqbot_core::*;
use rust_decimal_macros::dec;

fn main() {
    env_logger::init();

    println!("Liquidation Bot Core Simulation");
    println!("In-Memory Ledger, Deterministic Time, Full Monitoring Lifecycle\n");

    scenario_1_quiet_market();
    scenario_2_price_drop();
    scenario_3_recovery_mode();
    scenario_4_read_only_observer();
    scenario_5_block_bursts_and_refresh();

    println!("\nAll simulations completed successfully.");
}

fn protocol_fees() -> Fees {
    Fees::new(
        Amount::new_unchecked(dec!(0.01)),
        Amount::new_unchecked(dec!(0.99)),
        Amount::new_unchecked(dec!(2)),
        Timestamp::from_millis(0),
        Timestamp::from_millis(0),
        false,
    )
}

/// A ledger with one large safe trove and a handful of smaller borrowers.
/// At price 0.001 the system ratio sits comfortably in normal mode.
fn populated_ledger() -> MockLedger {
    let mut ledger = MockLedger::new(Price::new_unchecked(dec!(0.001)), protocol_fees());
    ledger.stability_pool_balance = Amount::new_unchecked(dec!(60_000));

    ledger.open_trove(
        Address::new("0xwhale"),
        Amount::new_unchecked(dec!(900)),
        Amount::new_unchecked(dec!(300_000)),
    );
    ledger.open_trove(
        Address::new("0xalice"),
        Amount::new_unchecked(dec!(40)),
        Amount::new_unchecked(dec!(20_000)),
    );
    ledger.open_trove(
        Address::new("0xbob"),
        Amount::new_unchecked(dec!(28)),
        Amount::new_unchecked(dec!(16_000)),
    );
    ledger.open_trove(
        Address::new("0xcarol"),
        Amount::new_unchecked(dec!(17)),
        Amount::new_unchecked(dec!(10_000)),
    );

    ledger
}

/// Healthy system: the store loads, derives state, and the driver declines.
fn scenario_1_quiet_market() {
    println!("Scenario 1: Quiet Market\n");

    let mut source = BlockPolledSource::new(populated_ledger(), None);
    source.start(100, Timestamp::from_millis(0)).unwrap();

    let state = source.store().state();
    println!("  Troves: {}", state.base.number_of_troves);
    println!("  Total: {}", state.base.total);
    println!(
        "  System ratio: {}",
        state.base.total.collateral_ratio(state.base.price)
    );
    println!("  Borrowing rate: {}", state.derived.borrowing_rate);
    println!(
        "  Undercollateralized troves: {}",
        state.derived.have_undercollateralized_troves
    );

    let liquidator = Liquidator::new(10, false, Amount::ZERO);
    println!("  Attempt warranted: {}\n", liquidator.should_attempt(&state));
}

/// A price move pushes the smaller troves below minimum; the bot notices via
/// a state-change notification and liquidates them in one batch.
fn scenario_2_price_drop() {
    println!("Scenario 2: Price Drop and Liquidation\n");

    let mut source = BlockPolledSource::new(populated_ledger(), None);
    source.start(100, Timestamp::from_millis(0)).unwrap();

    let flag = std::rc::Rc::new(std::cell::Cell::new(false));
    let flag_clone = std::rc::Rc::clone(&flag);
    let _subscription = source.store().subscribe(move |change| {
        if change.changed_fields.contains(&StateField::HaveUndercollateralizedTroves) {
            flag_clone.set(change.new_state.derived.have_undercollateralized_troves);
        }
    });

    // debt token strengthens: every ratio shrinks
    source.reader_mut().price = Price::new_unchecked(dec!(0.0014));
    source.notice_block(101, Timestamp::from_millis(1_000));
    source.poll(Timestamp::from_millis(1_100)).unwrap();

    println!("  Price moved to 0.0014, notification fired: {}", flag.get());

    let state = source.store().state();
    let mut task = LiquidationTask::new();
    let liquidator = Liquidator::new(10, false, Amount::ZERO);

    if liquidator.should_attempt(&state) && task.request_run() {
        let outcome = liquidator.attempt(source.reader_mut(), &state).unwrap();
        task.finish();

        if let AttemptOutcome::Liquidated(details) = outcome {
            println!("  Liquidated: {:?}", details.liquidated_addresses);
            println!("  Total liquidated: {}", details.total_liquidated);
            println!(
                "  Compensation: {} collateral + {} debt tokens",
                details.collateral_gas_compensation, details.debt_gas_compensation
            );
        }
    }

    println!(
        "  Troves remaining: {}\n",
        source.reader().number_of_troves().unwrap()
    );
}

/// A crash drops the system ratio below critical. Recovery mode widens the
/// liquidatable set to troves riskier than the system average, pool capacity
/// permitting, and zeroes the borrowing rate.
fn scenario_3_recovery_mode() {
    println!("Scenario 3: Recovery Mode\n");

    let mut source = BlockPolledSource::new(populated_ledger(), None);
    source.start(100, Timestamp::from_millis(0)).unwrap();

    source.reader_mut().price = Price::new_unchecked(dec!(0.0018));
    source.notice_block(101, Timestamp::from_millis(1_000));
    source.poll(Timestamp::from_millis(1_100)).unwrap();

    let state = source.store().state();
    println!(
        "  System ratio: {}",
        state.base.total.collateral_ratio(state.base.price)
    );
    println!("  Recovery mode: {}", state.derived.fees.recovery_mode());
    println!("  Borrowing rate: {}", state.derived.borrowing_rate);

    let snapshot = LiquidationState {
        total: state.base.total,
        price: state.base.price,
        stability_pool_balance: state.base.stability_pool_balance,
    };
    let candidates = source
        .reader()
        .troves(&TroveListingParams::riskiest_first(10))
        .unwrap();
    let selected = select_for_liquidation(candidates, &snapshot, 10);

    println!("  Selected for liquidation:");
    for trove in &selected {
        println!(
            "    {} ratio {}",
            trove.owner_address,
            trove.trove.collateral_ratio(state.base.price)
        );
    }
    println!(
        "  Expected compensation: {}\n",
        expected_compensation(&selected, state.base.price, Amount::ZERO)
    );
}

/// Without a signing credential the bot reports opportunities but never
/// submits.
fn scenario_4_read_only_observer() {
    println!("Scenario 4: Read-Only Observer\n");

    let mut source = BlockPolledSource::new(populated_ledger(), None);
    source.start(100, Timestamp::from_millis(0)).unwrap();

    source.reader_mut().price = Price::new_unchecked(dec!(0.0014));
    source.notice_block(101, Timestamp::from_millis(1_000));
    source.poll(Timestamp::from_millis(1_100)).unwrap();

    let state = source.store().state();
    let liquidator = Liquidator::new(10, true, Amount::ZERO);
    let outcome = liquidator.attempt(source.reader_mut(), &state).unwrap();

    if let AttemptOutcome::ObservedOnly {
        addresses,
        expected_compensation,
    } = outcome
    {
        println!("  Would liquidate: {:?}", addresses);
        println!("  Expected compensation: {}", expected_compensation);
    }
    println!(
        "  Submissions made: {}\n",
        source.reader().submissions().len()
    );
}

/// A burst of new-block signals collapses into one read, and a quiet chain
/// still refreshes on the 30 second deadline.
fn scenario_5_block_bursts_and_refresh() {
    println!("Scenario 5: Block Bursts and Periodic Refresh\n");

    let mut source = BlockPolledSource::new(populated_ledger(), None);
    source.start(100, Timestamp::from_millis(0)).unwrap();

    let updates = std::rc::Rc::new(std::cell::Cell::new(0u32));
    let updates_clone = std::rc::Rc::clone(&updates);
    let _subscription = source.store().subscribe(move |_| {
        updates_clone.set(updates_clone.get() + 1);
    });

    // five signals inside one debounce window
    for (tag, at) in [(101, 0), (102, 10), (103, 20), (104, 30), (105, 40)] {
        source.notice_block(tag, Timestamp::from_millis(1_000 + at));
    }

    let mut reads = 0;
    for at in (1_000..1_200).step_by(10) {
        if source.poll(Timestamp::from_millis(at)).unwrap() {
            reads += 1;
        }
    }
    println!("  5 block signals, {} read cycle(s)", reads);
    println!(
        "  Store is at block {}",
        source.store().state().extra.block_tag
    );

    let refreshed = source.poll(Timestamp::from_millis(40_000)).unwrap();
    println!("  Quiet chain refresh at +30s: {}", refreshed);
    println!("  Notifications delivered: {}", updates.get());
}
