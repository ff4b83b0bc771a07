//! The state machine behind a single wait.
//!
//! An operation starts in the `Waiting` state and leaves it exactly once, either to `Resolved`
//! (a qualifying event arrived) or to `Cancelled` (the cancellation signal fired). Both listeners
//! are removed before the outcome is stored, so neither can change the outcome afterwards.
//!
//! The operation is owned by the [`AwaitEvent`][crate::AwaitEvent] future. Listeners only hold a
//! weak reference, so a registration that outlives the future cannot keep the operation alive.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{self, AtomicU64};
use std::task::Waker;

use tracing::{debug, trace};

use crate::{
    AwaitOptions, BoxedFilter, Cancelled, CancellationSignal, EventSource, FilterContext,
    Filtered, Listener,
};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one wait started via [`await_event()`][crate::await_event].
///
/// Unique within the process.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, atomic::Ordering::Relaxed))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a wait is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a wait can only ever be waiting or settled one of two ways"
)]
pub enum OperationState {
    /// No qualifying event and no cancellation yet.
    Waiting,

    /// A qualifying event arrived.
    Resolved,

    /// The cancellation signal fired first.
    Cancelled,
}

/// The cancellation signal together with the listener registered on it.
struct CancelBinding {
    signal: Rc<dyn CancellationSignal>,
    listener: Listener<()>,
    attached: Cell<bool>,
}

pub(crate) struct Operation<S, T>
where
    S: EventSource,
{
    id: OperationId,

    source: S,
    event_id: S::EventId,
    event_listener: Listener<S::Event>,

    // Set while the event listener is registered with the source.
    event_attached: Cell<bool>,

    cancel: Option<CancelBinding>,

    // `None` means the first delivery settles the wait.
    filter: Option<RefCell<BoxedFilter<S, T>>>,
    supplemental: Option<Rc<dyn Any>>,

    // Events delivered while the filter is running, offered to it once it returns.
    queued: RefCell<VecDeque<S::Event>>,

    state: Cell<OperationState>,
    deliveries: Cell<usize>,

    // Set on settlement, taken by the first poll that observes it.
    outcome: RefCell<Option<Result<T, Cancelled>>>,
    awaiter: RefCell<Option<Waker>>,
}

impl<S, T> Operation<S, T>
where
    S: EventSource + 'static,
    S::Event: Clone + 'static,
    T: From<S::Event> + 'static,
{
    /// Creates the operation and registers its listeners.
    ///
    /// If the source refuses the event listener, nothing stays registered and the error
    /// is returned as-is.
    pub(crate) fn start(
        source: S,
        event_id: S::EventId,
        options: AwaitOptions<S, T>,
    ) -> Result<Rc<Self>, S::Error> {
        let policy = options.registration_policy();
        let event_options = options.event_listener_options();
        let cancel_options = options.cancel_listener_options();

        let AwaitOptions {
            filter,
            state: supplemental,
            signal,
            ..
        } = options;

        let operation = Rc::new_cyclic(|weak: &Weak<Self>| Self {
            id: OperationId::next(),
            source,
            event_id,
            event_listener: Self::new_event_listener(weak.clone()),
            event_attached: Cell::new(false),
            cancel: signal.map(|signal| CancelBinding {
                signal,
                listener: Self::new_cancel_listener(weak.clone()),
                attached: Cell::new(false),
            }),
            filter: filter.map(RefCell::new),
            supplemental,
            queued: RefCell::new(VecDeque::new()),
            state: Cell::new(OperationState::Waiting),
            deliveries: Cell::new(0),
            outcome: RefCell::new(None),
            awaiter: RefCell::new(None),
        });

        trace!(operation = %operation.id, ?policy, "subscribing event listener");

        // Marked before subscribing in case the source delivers from inside `subscribe()`.
        operation.event_attached.set(true);

        if let Err(error) = operation.source.subscribe(
            &operation.event_id,
            operation.event_listener.clone(),
            event_options,
        ) {
            operation.event_attached.set(false);
            debug!(operation = %operation.id, "event source refused the event listener");
            return Err(error);
        }

        if let Some(cancel) = &operation.cancel {
            if operation.state.get() == OperationState::Waiting {
                trace!(operation = %operation.id, "subscribing cancel listener");

                cancel.attached.set(true);
                cancel
                    .signal
                    .subscribe_cancel(cancel.listener.clone(), cancel_options);
            }
        }

        Ok(operation)
    }

    fn new_event_listener(weak: Weak<Self>) -> Listener<S::Event> {
        Listener::new(move |event: &S::Event| {
            if let Some(operation) = weak.upgrade() {
                operation.on_event(event);
            }
        })
    }

    fn new_cancel_listener(weak: Weak<Self>) -> Listener<()> {
        Listener::new(move |(): &()| {
            if let Some(operation) = weak.upgrade() {
                operation.on_cancel();
            }
        })
    }

    fn on_event(&self, event: &S::Event) {
        if self.state.get() != OperationState::Waiting {
            trace!(operation = %self.id, "ignoring event delivered after settlement");
            return;
        }

        let Some(filter) = &self.filter else {
            self.next_delivery();
            self.settle(OperationState::Resolved, Ok(T::from(event.clone())));
            return;
        };

        let Ok(mut filter) = filter.try_borrow_mut() else {
            trace!(operation = %self.id, "queueing event delivered while the filter is running");
            self.queued.borrow_mut().push_back(event.clone());
            return;
        };

        // Events queued before this one are only left over if the filter panicked.
        let mut value = if self.queued.borrow().is_empty() {
            self.apply_filter(&mut filter, event)
        } else {
            self.queued.borrow_mut().push_back(event.clone());
            None
        };

        // Stops early if the filter triggered cancellation itself.
        while value.is_none() && self.state.get() == OperationState::Waiting {
            let Some(queued) = self.queued.borrow_mut().pop_front() else {
                break;
            };

            value = self.apply_filter(&mut filter, &queued);
        }

        drop(filter);
        self.queued.borrow_mut().clear();

        if self.state.get() != OperationState::Waiting {
            return;
        }

        if let Some(value) = value {
            self.settle(OperationState::Resolved, Ok(value));
        }
    }

    /// Offers one event to the filter. Returns the value to settle with, if the event qualifies.
    fn apply_filter(&self, filter: &mut BoxedFilter<S, T>, event: &S::Event) -> Option<T> {
        let delivery = self.next_delivery();

        let context = FilterContext {
            source: &self.source,
            event_id: &self.event_id,
            operation: self.id,
            state: self.supplemental.as_deref(),
            delivery,
        };

        match (&mut **filter)(event, &context) {
            Ok(Filtered::Accept(value)) => Some(value),
            Ok(Filtered::Skip) => {
                trace!(operation = %self.id, delivery, "filter skipped event");
                None
            }
            Err(error) => {
                debug!(
                    operation = %self.id,
                    delivery,
                    %error,
                    "filter failed; settling with the original event"
                );
                Some(T::from(event.clone()))
            }
        }
    }

    fn next_delivery(&self) -> usize {
        let delivery = self.deliveries.get().saturating_add(1);
        self.deliveries.set(delivery);
        delivery
    }

    fn on_cancel(&self) {
        if self.state.get() != OperationState::Waiting {
            return;
        }

        self.settle(OperationState::Cancelled, Err(Cancelled::from_installed_type()));
    }
}

impl<S, T> Operation<S, T>
where
    S: EventSource,
{
    pub(crate) fn id(&self) -> OperationId {
        self.id
    }

    pub(crate) fn state(&self) -> OperationState {
        self.state.get()
    }

    /// Takes the outcome if the operation has settled, otherwise remembers who to wake up.
    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Option<Result<T, Cancelled>> {
        let outcome = self.outcome.borrow_mut().take();

        if outcome.is_none() {
            let mut awaiter = self.awaiter.borrow_mut();

            match awaiter.as_ref() {
                Some(existing) if existing.will_wake(waker) => {}
                _ => *awaiter = Some(waker.clone()),
            }
        }

        outcome
    }

    /// Removes both listeners without settling. Used when nobody is waiting for the outcome.
    pub(crate) fn abandon(&self) {
        if self.state.get() == OperationState::Waiting {
            debug!(operation = %self.id, "wait dropped before settling; removing listeners");
            self.detach();
        }
    }

    fn settle(&self, state: OperationState, outcome: Result<T, Cancelled>) {
        self.detach();

        self.state.set(state);
        *self.outcome.borrow_mut() = Some(outcome);

        debug!(operation = %self.id, ?state, deliveries = self.deliveries.get(), "settled");

        let awaiter = self.awaiter.borrow_mut().take();

        if let Some(waker) = awaiter {
            waker.wake();
        }
    }

    fn detach(&self) {
        if self.event_attached.replace(false) {
            self.source.unsubscribe(&self.event_id, &self.event_listener);
        }

        if let Some(cancel) = &self.cancel {
            if cancel.attached.replace(false) {
                cancel.signal.unsubscribe_cancel(&cancel.listener);
            }
        }
    }
}

impl<S, T> fmt::Debug for Operation<S, T>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("deliveries", &self.deliveries.get())
            .field("has_filter", &self.filter.is_some())
            .field("has_signal", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::task::Wake;

    use futures::task::noop_waker_ref;

    use super::*;
    use crate::AbortError;
    use crate::test_utils::{FakeSignal, FakeTarget};

    #[derive(Default)]
    struct CountingWaker {
        wakes: AtomicUsize,
    }

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.wakes.fetch_add(1, atomic::Ordering::Relaxed);
        }
    }

    #[test]
    fn operation_ids_are_unique() {
        let first = OperationId::next();
        let second = OperationId::next();

        assert_ne!(first, second);
    }

    #[test]
    fn starts_waiting_with_listener_attached() {
        let target = FakeTarget::new();

        let operation = Operation::start(target.clone(), "msg", AwaitOptions::new()).unwrap();

        assert_eq!(operation.state(), OperationState::Waiting);
        assert_eq!(target.listener_count("msg"), 1);
        assert!(operation.poll_outcome(noop_waker_ref()).is_none());
    }

    #[test]
    fn settlement_wakes_awaiter_once() {
        let target = FakeTarget::new();
        let counter = Arc::new(CountingWaker::default());
        let waker = Waker::from(Arc::clone(&counter));

        let operation = Operation::start(target.clone(), "msg", AwaitOptions::new()).unwrap();
        assert!(operation.poll_outcome(&waker).is_none());
        assert!(operation.poll_outcome(&waker).is_none());

        target.dispatch("msg", "hello");
        target.dispatch("msg", "again");

        assert_eq!(counter.wakes.load(atomic::Ordering::Relaxed), 1);
        assert_eq!(
            operation.poll_outcome(&waker).unwrap().unwrap(),
            "hello".to_string()
        );
    }

    #[test]
    fn outcome_is_taken_once() {
        let target = FakeTarget::new();

        let operation = Operation::start(target.clone(), "msg", AwaitOptions::new()).unwrap();
        target.dispatch("msg", "hello");

        assert!(operation.poll_outcome(noop_waker_ref()).is_some());
        assert!(operation.poll_outcome(noop_waker_ref()).is_none());
        assert_eq!(operation.state(), OperationState::Resolved);
    }

    #[test]
    fn abandon_detaches_both_listeners() {
        let target = FakeTarget::new();
        let signal = FakeSignal::new();

        let operation = Operation::start(
            target.clone(),
            "msg",
            AwaitOptions::new().signal(signal.clone()),
        )
        .unwrap();

        assert_eq!(target.listener_count("msg"), 1);
        assert_eq!(signal.listener_count(), 1);

        operation.abandon();

        assert_eq!(target.listener_count("msg"), 0);
        assert_eq!(signal.listener_count(), 0);
        assert_eq!(operation.state(), OperationState::Waiting);
    }

    #[test]
    fn abandon_after_settlement_does_nothing() {
        let target = FakeTarget::new();

        let operation = Operation::start(target.clone(), "msg", AwaitOptions::new()).unwrap();
        target.dispatch("msg", "hello");
        let unsubscribes = target.unsubscribe_calls();

        operation.abandon();

        assert_eq!(target.unsubscribe_calls(), unsubscribes);
    }

    #[test]
    fn listeners_do_not_keep_operation_alive() {
        let target = FakeTarget::new();

        let operation = Operation::start(target.clone(), "msg", AwaitOptions::new()).unwrap();
        let weak = Rc::downgrade(&operation);
        drop(operation);

        assert!(weak.upgrade().is_none());

        // The stale registration is still there but has nothing left to drive.
        target.dispatch("msg", "hello");
    }

    #[test]
    fn nested_delivery_from_filter_is_offered_after_it_returns() {
        let target = FakeTarget::new();
        let inner_target = target.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let options = AwaitOptions::<FakeTarget>::new().filter({
            let seen = Rc::clone(&seen);

            move |event: &String, context| {
                seen.borrow_mut().push((event.clone(), context.delivery()));

                if event == "a" {
                    inner_target.dispatch("msg", "b");
                    assert_eq!(seen.borrow().len(), 1);
                }

                Ok(if event == "b" {
                    Filtered::Accept(event.to_uppercase())
                } else {
                    Filtered::Skip
                })
            }
        });

        let operation = Operation::start(target.clone(), "msg", options).unwrap();
        target.dispatch("msg", "a");

        let outcome = operation.poll_outcome(noop_waker_ref()).unwrap();
        assert_eq!(outcome.unwrap(), "B");
        assert_eq!(
            *seen.borrow(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
        assert_eq!(target.listener_count("msg"), 0);
    }

    #[test]
    fn nested_delivery_is_dropped_once_outer_event_qualifies() {
        let target = FakeTarget::new();
        let inner_target = target.clone();
        let calls = Rc::new(Cell::new(0));

        let options = AwaitOptions::<FakeTarget>::new().filter({
            let calls = Rc::clone(&calls);

            move |event: &String, _| {
                calls.set(calls.get() + 1);

                if event == "outer" {
                    inner_target.dispatch("msg", "nested");
                }

                Ok(Filtered::Accept(event.clone()))
            }
        });

        let operation = Operation::start(target.clone(), "msg", options).unwrap();
        target.dispatch("msg", "outer");

        let outcome = operation.poll_outcome(noop_waker_ref()).unwrap();
        assert_eq!(outcome.unwrap(), "outer");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancellation_from_filter_stops_nested_deliveries() {
        let target = FakeTarget::new();
        let signal = FakeSignal::new();
        let inner_target = target.clone();
        let calls = Rc::new(Cell::new(0));

        let options = AwaitOptions::<FakeTarget>::new()
            .signal(signal.clone())
            .filter({
                let calls = Rc::clone(&calls);
                let signal = signal.clone();

                move |_: &String, _| {
                    calls.set(calls.get() + 1);

                    inner_target.dispatch("msg", "nested");
                    signal.cancel();

                    Ok(Filtered::<String>::Skip)
                }
            });

        let operation = Operation::start(target.clone(), "msg", options).unwrap();
        target.dispatch("msg", "outer");

        let outcome = operation.poll_outcome(noop_waker_ref()).unwrap();
        assert!(outcome.unwrap_err().is::<AbortError>());
        assert_eq!(calls.get(), 1);
        assert_eq!(operation.state(), OperationState::Cancelled);
    }
}
