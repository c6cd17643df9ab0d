// 4.0: reactive state container. reconciles periodic, possibly-stale ledger
// reads into a consistent snapshot, re-derives time-dependent values on every
// tick, and notifies subscribers with a before/after/diff record.
//
// the store is generic over an opaque extension state owned by the concrete
// state source (6.x). time is explicit data, never an ambient runtime: the
// 30s self-refresh is a deadline the polling driver checks, which keeps the
// whole reconcile path deterministic and testable.

use crate::fees::Fees;
use crate::trove::{Trove, TroveWithPendingRedistribution};
use crate::types::{Amount, Price, Timestamp};
use log::info;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Quiet interval after which a fresh external read cycle is due.
pub const REFRESH_INTERVAL_MS: i64 = 30_000;

// 4.1: base state. raw ledger reads, reconciled field-by-field.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreBaseState {
    pub number_of_troves: u32,
    /// Balance of the configured wallet; zero in read-only mode.
    pub account_balance: Amount,
    pub price: Price,
    pub stability_pool_balance: Amount,
    pub total: Trove,
    pub total_redistributed: Trove,
    pub fees_in_normal_mode: Fees,
    pub riskiest_trove_before_redistribution: TroveWithPendingRedistribution,
}

/// Partial base-state update: unspecified fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct StoreBaseStatePatch {
    pub number_of_troves: Option<u32>,
    pub account_balance: Option<Amount>,
    pub price: Option<Price>,
    pub stability_pool_balance: Option<Amount>,
    pub total: Option<Trove>,
    pub total_redistributed: Option<Trove>,
    pub fees_in_normal_mode: Option<Fees>,
    pub riskiest_trove_before_redistribution: Option<TroveWithPendingRedistribution>,
}

// 4.2: derived state. always recomputed from base state, even when no new
// ledger read arrived, because fee decay is a function of wall-clock time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDerivedState {
    pub fees: Fees,
    pub borrowing_rate: Amount,
    pub redemption_rate: Amount,
    pub have_undercollateralized_troves: bool,
}

/// Opaque extension state owned by the concrete state source, merged through
/// its own reducer.
pub trait ExtensionState: Clone + PartialEq {
    type Patch;

    fn reduce(self, patch: Self::Patch) -> Self;
}

impl ExtensionState for () {
    type Patch = ();

    fn reduce(self, _patch: ()) -> Self {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreState<X> {
    pub base: StoreBaseState,
    pub derived: StoreDerivedState,
    pub extra: X,
}

// 4.3: top-level fields of the snapshot, for the change diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateField {
    NumberOfTroves,
    AccountBalance,
    Price,
    StabilityPoolBalance,
    Total,
    TotalRedistributed,
    FeesInNormalMode,
    RiskiestTroveBeforeRedistribution,
    Fees,
    BorrowingRate,
    RedemptionRate,
    HaveUndercollateralizedTroves,
    Extension,
}

#[derive(Debug, Clone)]
pub struct StateChange<X> {
    pub new_state: StoreState<X>,
    pub old_state: StoreState<X>,
    pub changed_fields: BTreeSet<StateField>,
}

type Listener<X> = Rc<RefCell<dyn FnMut(&StateChange<X>)>>;

// 4.4: subscriber registry. cheap to clone, so listeners can hold a handle and
// subscribe/unsubscribe others from inside a dispatch without touching the
// store itself.
pub struct ListenerSet<X> {
    inner: Rc<RefCell<ListenerSetInner<X>>>,
}

struct ListenerSetInner<X> {
    listeners: BTreeMap<u64, Listener<X>>,
    next_id: u64,
}

impl<X> Clone for ListenerSet<X> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<X> Default for ListenerSet<X> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ListenerSetInner {
                listeners: BTreeMap::new(),
                next_id: 1,
            })),
        }
    }
}

impl<X> ListenerSet<X> {
    pub fn subscribe(&self, listener: impl FnMut(&StateChange<X>) + 'static) -> Subscription<X> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, Rc::new(RefCell::new(listener)));

        Subscription {
            set: Rc::downgrade(&self.inner),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch over a frozen snapshot of the current listener set. A listener
    /// added during dispatch is not invoked this round; a listener removed
    /// during dispatch is skipped even though it was snapshotted.
    fn dispatch(&self, change: &StateChange<X>) {
        let snapshot: Vec<(u64, Listener<X>)> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(id, listener)| (*id, Rc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            let still_subscribed = self.inner.borrow().listeners.contains_key(&id);
            if still_subscribed {
                (listener.borrow_mut())(change);
            }
        }
    }
}

/// Handle returned by `subscribe`; dropping it does not unsubscribe.
pub struct Subscription<X> {
    set: std::rc::Weak<RefCell<ListenerSetInner<X>>>,
    id: u64,
}

impl<X> Subscription<X> {
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.set.upgrade() {
            inner.borrow_mut().listeners.remove(&self.id);
        }
    }
}

// 4.5: the store itself. two stable states (unloaded, loaded) plus continuous
// loaded -> loaded self-transitions.
pub struct ProtocolStore<X: ExtensionState> {
    base: Option<StoreBaseState>,
    derived: Option<StoreDerivedState>,
    extra: Option<X>,
    loaded: bool,
    refresh_due_at: Option<Timestamp>,
    on_loaded: Option<Box<dyn FnOnce(&StoreState<X>)>>,
    listeners: ListenerSet<X>,
}

impl<X: ExtensionState> Default for ProtocolStore<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: ExtensionState> ProtocolStore<X> {
    pub fn new() -> Self {
        Self {
            base: None,
            derived: None,
            extra: None,
            loaded: false,
            refresh_due_at: None,
            on_loaded: None,
            listeners: ListenerSet::default(),
        }
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// One-shot hook fired when the store first loads.
    pub fn set_on_loaded(&mut self, hook: impl FnOnce(&StoreState<X>) + 'static) {
        self.on_loaded = Some(Box::new(hook));
    }

    pub fn subscribe(&self, listener: impl FnMut(&StateChange<X>) + 'static) -> Subscription<X> {
        self.listeners.subscribe(listener)
    }

    /// Cloneable handle to the subscriber registry, for listeners that need to
    /// subscribe or unsubscribe others from inside a notification.
    pub fn listeners(&self) -> ListenerSet<X> {
        self.listeners.clone()
    }

    /// Current consistent snapshot, by value.
    pub fn state(&self) -> StoreState<X> {
        StoreState {
            base: self.base.clone().expect("state read before load"),
            derived: self.derived.clone().expect("state read before load"),
            extra: self.extra.clone().expect("state read before load"),
        }
    }

    /// Seeds base and derived state, marks the store loaded, arms the periodic
    /// refresh and fires the one-shot `on_loaded` hook. Callable exactly once.
    pub fn load(&mut self, base: StoreBaseState, extra: X, now: Timestamp) {
        assert!(!self.loaded, "store loaded twice");

        self.derived = Some(derive(&base));
        self.base = Some(base);
        self.extra = Some(extra);
        self.loaded = true;
        self.refresh_due_at = Some(now.plus_millis(REFRESH_INTERVAL_MS));

        if let Some(hook) = self.on_loaded.take() {
            hook(&self.state());
        }
    }

    /// Reconciles a partial update. Derived state is always recomputed, even
    /// with an empty patch, so time-decayed values advance on every tick.
    pub fn update(
        &mut self,
        base_patch: Option<StoreBaseStatePatch>,
        extra_patch: Option<X::Patch>,
        now: Timestamp,
    ) {
        assert!(self.loaded, "store updated before load");

        let old_state = self.state();

        if let Some(patch) = base_patch {
            let base = self.base.take().expect("store updated before load");
            self.base = Some(reduce_base(base, patch));
        }

        let derived_next = derive(self.base.as_ref().expect("store updated before load"));
        let derived = self.derived.take().expect("store updated before load");
        self.derived = Some(reduce_derived(derived, derived_next));

        if let Some(patch) = extra_patch {
            let extra = self.extra.take().expect("store updated before load");
            self.extra = Some(extra.reduce(patch));
        }

        self.refresh_due_at = Some(now.plus_millis(REFRESH_INTERVAL_MS));

        let new_state = self.state();
        let changed_fields = diff(&old_state, &new_state);

        if !changed_fields.is_empty() {
            self.listeners.dispatch(&StateChange {
                new_state,
                old_state,
                changed_fields,
            });
        }
    }

    /// True when the quiet interval has elapsed and the polling driver should
    /// run a fresh read cycle.
    pub fn refresh_due(&self, now: Timestamp) -> bool {
        self.refresh_due_at.is_some_and(|due| now >= due)
    }

    /// Cancels the pending refresh deadline; no refresh fires after stop.
    pub fn stop(&mut self) {
        self.refresh_due_at = None;
    }
}

// 4.6: derived-state formula. the unsafe-troves flag is recomputed from the
// single riskiest known trove, never by scanning all troves.
fn derive(base: &StoreBaseState) -> StoreDerivedState {
    let recovery_mode = !base.total.debt.is_zero()
        && base.total.collateral_ratio_is_below_critical(base.price);
    let fees = base.fees_in_normal_mode.set_recovery_mode(recovery_mode);

    let riskiest = base
        .riskiest_trove_before_redistribution
        .apply_redistribution(&base.total_redistributed);
    // an empty trove has no ratio; an empty system is trivially safe
    let have_undercollateralized_troves = !riskiest.debt().is_zero()
        && riskiest.trove.collateral_ratio_is_below_minimum(base.price);

    StoreDerivedState {
        borrowing_rate: fees.borrowing_rate(None),
        redemption_rate: fees.redemption_rate(Amount::ZERO, None),
        have_undercollateralized_troves,
        fees,
    }
}

fn update_if_changed<T: PartialEq + fmt::Display>(name: &str, prev: T, next: Option<T>) -> T {
    match next {
        Some(next) if next != prev => {
            info!("{} updated to {}", name, next);
            next
        }
        _ => prev,
    }
}

fn silently_update_if_changed<T: PartialEq>(prev: T, next: Option<T>) -> T {
    match next {
        Some(next) if next != prev => next,
        _ => prev,
    }
}

fn reduce_base(base: StoreBaseState, patch: StoreBaseStatePatch) -> StoreBaseState {
    StoreBaseState {
        number_of_troves: update_if_changed(
            "number_of_troves",
            base.number_of_troves,
            patch.number_of_troves,
        ),
        account_balance: update_if_changed(
            "account_balance",
            base.account_balance,
            patch.account_balance,
        ),
        price: update_if_changed("price", base.price, patch.price),
        stability_pool_balance: update_if_changed(
            "stability_pool_balance",
            base.stability_pool_balance,
            patch.stability_pool_balance,
        ),
        total: update_if_changed("total", base.total, patch.total),
        total_redistributed: update_if_changed(
            "total_redistributed",
            base.total_redistributed,
            patch.total_redistributed,
        ),
        fees_in_normal_mode: silently_update_if_changed(
            base.fees_in_normal_mode,
            patch.fees_in_normal_mode,
        ),
        riskiest_trove_before_redistribution: silently_update_if_changed(
            base.riskiest_trove_before_redistribution,
            patch.riskiest_trove_before_redistribution,
        ),
    }
}

// Fee instances differ structurally on every new block (timestamps move), but
// the rendered rate rarely does. Only a changed rendering is worth a log line.
fn update_fees(prev: Fees, next: Fees) -> Fees {
    if next != prev {
        if next.to_string() != prev.to_string() {
            info!("fees updated to {}", next);
        }
        next
    } else {
        prev
    }
}

fn reduce_derived(derived: StoreDerivedState, next: StoreDerivedState) -> StoreDerivedState {
    StoreDerivedState {
        fees: update_fees(derived.fees, next.fees),
        borrowing_rate: silently_update_if_changed(derived.borrowing_rate, Some(next.borrowing_rate)),
        redemption_rate: silently_update_if_changed(
            derived.redemption_rate,
            Some(next.redemption_rate),
        ),
        have_undercollateralized_troves: update_if_changed(
            "have_undercollateralized_troves",
            derived.have_undercollateralized_troves,
            Some(next.have_undercollateralized_troves),
        ),
    }
}

fn diff<X: PartialEq>(old: &StoreState<X>, new: &StoreState<X>) -> BTreeSet<StateField> {
    let mut changed = BTreeSet::new();

    let mut check = |field: StateField, differs: bool| {
        if differs {
            changed.insert(field);
        }
    };

    check(
        StateField::NumberOfTroves,
        old.base.number_of_troves != new.base.number_of_troves,
    );
    check(
        StateField::AccountBalance,
        old.base.account_balance != new.base.account_balance,
    );
    check(StateField::Price, old.base.price != new.base.price);
    check(
        StateField::StabilityPoolBalance,
        old.base.stability_pool_balance != new.base.stability_pool_balance,
    );
    check(StateField::Total, old.base.total != new.base.total);
    check(
        StateField::TotalRedistributed,
        old.base.total_redistributed != new.base.total_redistributed,
    );
    check(
        StateField::FeesInNormalMode,
        old.base.fees_in_normal_mode != new.base.fees_in_normal_mode,
    );
    check(
        StateField::RiskiestTroveBeforeRedistribution,
        old.base.riskiest_trove_before_redistribution
            != new.base.riskiest_trove_before_redistribution,
    );
    check(StateField::Fees, old.derived.fees != new.derived.fees);
    check(
        StateField::BorrowingRate,
        old.derived.borrowing_rate != new.derived.borrowing_rate,
    );
    check(
        StateField::RedemptionRate,
        old.derived.redemption_rate != new.derived.redemption_rate,
    );
    check(
        StateField::HaveUndercollateralizedTroves,
        old.derived.have_undercollateralized_troves
            != new.derived.have_undercollateralized_troves,
    );
    check(StateField::Extension, old.extra != new.extra);

    changed
}
