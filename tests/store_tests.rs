//! Scenario tests for the reactive store and its subscription semantics.

use liqbot_core::*;
use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::rc::Rc;

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

fn base_state() -> StoreBaseState {
    StoreBaseState {
        number_of_troves: 40,
        account_balance: amt(dec!(1)),
        // system ratio 1000 / (400000 * 0.001) = 2.5: normal mode
        price: Price::new_unchecked(dec!(0.001)),
        stability_pool_balance: amt(dec!(100_000)),
        total: Trove::new(amt(dec!(1000)), amt(dec!(400_000))),
        total_redistributed: Trove::new(amt(dec!(5)), amt(dec!(900))),
        fees_in_normal_mode: fees(),
        // stored at ratio 3 / 1.95 ~ 1.54: safe until redistribution moves
        riskiest_trove_before_redistribution: TroveWithPendingRedistribution::new(
            Address::new("0xriskiest"),
            TroveStatus::Open,
            Trove::new(amt(dec!(3)), amt(dec!(1_950))),
            amt(dec!(0.01)),
            Trove::new(amt(dec!(5)), amt(dec!(900))),
        ),
    }
}

#[test]
fn redistribution_alone_flips_the_unsafe_flag() {
    let mut store: ProtocolStore<()> = ProtocolStore::new();
    store.load(base_state(), (), Timestamp::from_millis(0));
    assert!(!store.state().derived.have_undercollateralized_troves);

    let changes: Rc<RefCell<Vec<StateChange<()>>>> = Rc::new(RefCell::new(Vec::new()));
    let changes_clone = Rc::clone(&changes);
    let _subscription = store.subscribe(move |change| {
        changes_clone.borrow_mut().push(change.clone());
    });

    // a redistribution elsewhere in the system grows the accumulator; the
    // riskiest trove's stored balance is untouched but its settled balance
    // slips below minimum: (3, 1950) + (10, 30000) * 0.01 = (3.1, 2250)
    let patch = StoreBaseStatePatch {
        total_redistributed: Some(Trove::new(amt(dec!(15)), amt(dec!(30_900)))),
        ..Default::default()
    };
    store.update(Some(patch), None, Timestamp::from_millis(1_000));

    let state = store.state();
    assert!(state.derived.have_undercollateralized_troves);

    let changes = changes.borrow();
    assert_eq!(changes.len(), 1);
    assert!(changes[0]
        .changed_fields
        .contains(&StateField::TotalRedistributed));
    assert!(changes[0]
        .changed_fields
        .contains(&StateField::HaveUndercollateralizedTroves));
}

#[test]
fn identical_patch_fires_no_notification() {
    let mut store: ProtocolStore<()> = ProtocolStore::new();
    store.load(base_state(), (), Timestamp::from_millis(0));

    let fired = Rc::new(RefCell::new(0u32));
    let fired_clone = Rc::clone(&fired);
    let _subscription = store.subscribe(move |_| {
        *fired_clone.borrow_mut() += 1;
    });

    // every field restated with its current value
    let state = store.state();
    let patch = StoreBaseStatePatch {
        number_of_troves: Some(state.base.number_of_troves),
        account_balance: Some(state.base.account_balance),
        price: Some(state.base.price),
        stability_pool_balance: Some(state.base.stability_pool_balance),
        total: Some(state.base.total),
        total_redistributed: Some(state.base.total_redistributed),
        fees_in_normal_mode: Some(state.base.fees_in_normal_mode.clone()),
        riskiest_trove_before_redistribution: Some(
            state.base.riskiest_trove_before_redistribution.clone(),
        ),
    };
    store.update(Some(patch), None, Timestamp::from_millis(1_000));

    assert_eq!(*fired.borrow(), 0);
    // the deadline still rearms on a no-op update
    assert!(!store.refresh_due(Timestamp::from_millis(30_999)));
    assert!(store.refresh_due(Timestamp::from_millis(31_000)));
}

#[test]
fn unsubscribed_listener_stops_receiving() {
    let mut store: ProtocolStore<()> = ProtocolStore::new();
    store.load(base_state(), (), Timestamp::from_millis(0));

    let fired = Rc::new(RefCell::new(0u32));
    let fired_clone = Rc::clone(&fired);
    let subscription = store.subscribe(move |_| {
        *fired_clone.borrow_mut() += 1;
    });

    let price_patch = |price| StoreBaseStatePatch {
        price: Some(Price::new_unchecked(price)),
        ..Default::default()
    };

    store.update(Some(price_patch(dec!(0.0011))), None, Timestamp::from_millis(1_000));
    assert_eq!(*fired.borrow(), 1);

    subscription.unsubscribe();
    store.update(Some(price_patch(dec!(0.0012))), None, Timestamp::from_millis(2_000));
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn listener_added_during_dispatch_waits_for_the_next_round() {
    let mut store: ProtocolStore<()> = ProtocolStore::new();
    store.load(base_state(), (), Timestamp::from_millis(0));

    let second_calls = Rc::new(RefCell::new(0u32));
    let second_calls_clone = Rc::clone(&second_calls);

    let listeners = store.listeners();
    let added = Rc::new(RefCell::new(None));
    let added_clone = Rc::clone(&added);
    let _first = store.subscribe(move |_| {
        if added_clone.borrow().is_none() {
            let counter = Rc::clone(&second_calls_clone);
            let subscription = listeners.subscribe(move |_| {
                *counter.borrow_mut() += 1;
            });
            *added_clone.borrow_mut() = Some(subscription);
        }
    });

    let price_patch = |price| StoreBaseStatePatch {
        price: Some(Price::new_unchecked(price)),
        ..Default::default()
    };

    // first dispatch subscribes the second listener but must not invoke it
    store.update(Some(price_patch(dec!(0.0011))), None, Timestamp::from_millis(1_000));
    assert_eq!(*second_calls.borrow(), 0);

    store.update(Some(price_patch(dec!(0.0012))), None, Timestamp::from_millis(2_000));
    assert_eq!(*second_calls.borrow(), 1);
}

#[test]
fn listener_removed_during_dispatch_is_skipped() {
    let mut store: ProtocolStore<()> = ProtocolStore::new();
    store.load(base_state(), (), Timestamp::from_millis(0));

    let victim_calls = Rc::new(RefCell::new(0u32));
    let victim_subscription: Rc<RefCell<Option<Subscription<()>>>> =
        Rc::new(RefCell::new(None));

    // the remover subscribes first, so it runs first in dispatch order
    let victim_subscription_clone = Rc::clone(&victim_subscription);
    let _remover = store.subscribe(move |_| {
        if let Some(subscription) = victim_subscription_clone.borrow_mut().take() {
            subscription.unsubscribe();
        }
    });

    let victim_calls_clone = Rc::clone(&victim_calls);
    let subscription = store.subscribe(move |_| {
        *victim_calls_clone.borrow_mut() += 1;
    });
    *victim_subscription.borrow_mut() = Some(subscription);

    let patch = StoreBaseStatePatch {
        price: Some(Price::new_unchecked(dec!(0.0011))),
        ..Default::default()
    };
    store.update(Some(patch), None, Timestamp::from_millis(1_000));

    // snapshotted for the dispatch, removed before its turn: never invoked
    assert_eq!(*victim_calls.borrow(), 0);
}

#[test]
fn extension_patch_replaces_extension_state() {
    let mut store: ProtocolStore<BlockPolledExtra> = ProtocolStore::new();
    store.load(
        base_state(),
        BlockPolledExtra {
            block_tag: 100,
            block_timestamp: Timestamp::from_millis(0),
        },
        Timestamp::from_millis(0),
    );

    let changed = Rc::new(RefCell::new(Vec::new()));
    let changed_clone = Rc::clone(&changed);
    let _subscription = store.subscribe(move |change: &StateChange<BlockPolledExtra>| {
        changed_clone
            .borrow_mut()
            .push(change.changed_fields.clone());
    });

    store.update(
        None,
        Some(BlockPolledExtra {
            block_tag: 101,
            block_timestamp: Timestamp::from_millis(12_000),
        }),
        Timestamp::from_millis(12_050),
    );

    assert_eq!(store.state().extra.block_tag, 101);
    let changed = changed.borrow();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].contains(&StateField::Extension));
}
