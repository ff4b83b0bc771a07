//! Testing utilities for the `events_await` crate.
//!
//! Recording fakes of the collaborators, behaving like DOM event targets and abort signals:
//! dispatch goes to a snapshot of the registrations taken when dispatch starts, registrations
//! removed during dispatch are skipped and `once` registrations are removed before their
//! listener is called.

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use crate::{CancellationSignal, EventSource, Listener, ListenerOptions};

struct Registration<E> {
    event_id: &'static str,
    listener: Listener<E>,
    options: ListenerOptions,
}

/// Takes the registration of `listener` for a delivery, if it is still registered.
///
/// `once` registrations are removed as part of taking them.
fn take_for_delivery<E>(
    registrations: &RefCell<Vec<Registration<E>>>,
    event_id: &'static str,
    listener: &Listener<E>,
) -> bool {
    let mut registrations = registrations.borrow_mut();

    let Some(position) = registrations
        .iter()
        .position(|r| r.event_id == event_id && r.listener == *listener)
    else {
        return false;
    };

    if registrations
        .get(position)
        .is_some_and(|registration| registration.options.once())
    {
        registrations.remove(position);
    }

    true
}

#[derive(Default)]
struct FakeTargetInner {
    registrations: RefCell<Vec<Registration<String>>>,
    last_options: Cell<Option<ListenerOptions>>,
    subscribe_calls: Cell<usize>,
    unsubscribe_calls: Cell<usize>,
    refuse_subscriptions: Cell<bool>,
}

/// An event source that delivers `String` events identified by static strings.
#[derive(Clone, Default)]
pub(crate) struct FakeTarget {
    inner: Rc<FakeTargetInner>,
}

impl FakeTarget {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn dispatch(&self, event_id: &'static str, event: &str) {
        let event = event.to_string();

        let snapshot: Vec<_> = self
            .inner
            .registrations
            .borrow()
            .iter()
            .filter(|r| r.event_id == event_id)
            .map(|r| r.listener.clone())
            .collect();

        for listener in snapshot {
            if take_for_delivery(&self.inner.registrations, event_id, &listener) {
                listener.call(&event);
            }
        }
    }

    /// Makes every following `subscribe()` fail.
    pub(crate) fn refuse_subscriptions(&self) {
        self.inner.refuse_subscriptions.set(true);
    }

    pub(crate) fn listener_count(&self, event_id: &'static str) -> usize {
        self.inner
            .registrations
            .borrow()
            .iter()
            .filter(|r| r.event_id == event_id)
            .count()
    }

    pub(crate) fn last_options(&self) -> Option<ListenerOptions> {
        self.inner.last_options.get()
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.get()
    }

    pub(crate) fn unsubscribe_calls(&self) -> usize {
        self.inner.unsubscribe_calls.get()
    }

    pub(crate) fn same_target(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl EventSource for FakeTarget {
    type EventId = &'static str;
    type Event = String;
    type Error = io::Error;

    fn subscribe(
        &self,
        event_id: &&'static str,
        listener: Listener<String>,
        options: ListenerOptions,
    ) -> Result<(), io::Error> {
        self.inner
            .subscribe_calls
            .set(self.inner.subscribe_calls.get() + 1);

        if self.inner.refuse_subscriptions.get() {
            return Err(io::Error::other("subscription refused"));
        }

        self.inner.last_options.set(Some(options));
        self.inner.registrations.borrow_mut().push(Registration {
            event_id,
            listener,
            options,
        });

        Ok(())
    }

    fn unsubscribe(&self, event_id: &&'static str, listener: &Listener<String>) {
        self.inner
            .unsubscribe_calls
            .set(self.inner.unsubscribe_calls.get() + 1);

        self.inner
            .registrations
            .borrow_mut()
            .retain(|r| !(r.event_id == *event_id && r.listener == *listener));
    }
}

#[derive(Default)]
struct FakeSignalInner {
    cancelled: Cell<bool>,
    registrations: RefCell<Vec<Registration<()>>>,
    last_options: Cell<Option<ListenerOptions>>,
    subscribe_calls: Cell<usize>,
    unsubscribe_calls: Cell<usize>,
}

/// A cancellation signal that is cancelled on demand.
#[derive(Clone, Default)]
pub(crate) struct FakeSignal {
    inner: Rc<FakeSignalInner>,
}

impl FakeSignal {
    const CANCEL: &'static str = "cancel";

    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as cancelled and notifies listeners. Does nothing the second time.
    pub(crate) fn cancel(&self) {
        if self.inner.cancelled.replace(true) {
            return;
        }

        let snapshot: Vec<_> = self
            .inner
            .registrations
            .borrow()
            .iter()
            .map(|r| r.listener.clone())
            .collect();

        for listener in snapshot {
            if take_for_delivery(&self.inner.registrations, Self::CANCEL, &listener) {
                listener.call(&());
            }
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.inner.registrations.borrow().len()
    }

    pub(crate) fn last_options(&self) -> Option<ListenerOptions> {
        self.inner.last_options.get()
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.get()
    }

    pub(crate) fn unsubscribe_calls(&self) -> usize {
        self.inner.unsubscribe_calls.get()
    }
}

impl CancellationSignal for FakeSignal {
    fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    fn subscribe_cancel(&self, listener: Listener<()>, options: ListenerOptions) {
        self.inner
            .subscribe_calls
            .set(self.inner.subscribe_calls.get() + 1);

        self.inner.last_options.set(Some(options));
        self.inner.registrations.borrow_mut().push(Registration {
            event_id: Self::CANCEL,
            listener,
            options,
        });
    }

    fn unsubscribe_cancel(&self, listener: &Listener<()>) {
        self.inner
            .unsubscribe_calls
            .set(self.inner.unsubscribe_calls.get() + 1);

        self.inner
            .registrations
            .borrow_mut()
            .retain(|r| r.listener != *listener);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn recording_listener(seen: &Rc<RefCell<Vec<String>>>) -> Listener<String> {
        let seen = Rc::clone(seen);
        Listener::new(move |event: &String| seen.borrow_mut().push(event.clone()))
    }

    #[test]
    fn once_registration_fires_once() {
        let target = FakeTarget::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        target
            .subscribe(
                &"msg",
                recording_listener(&seen),
                ListenerOptions::new(false, true, true),
            )
            .unwrap();

        target.dispatch("msg", "a");
        target.dispatch("msg", "b");

        assert_eq!(*seen.borrow(), vec!["a".to_string()]);
        assert_eq!(target.listener_count("msg"), 0);
    }

    #[test]
    fn persistent_registration_fires_until_removed() {
        let target = FakeTarget::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let listener = recording_listener(&seen);

        target
            .subscribe(&"msg", listener.clone(), ListenerOptions::new(false, true, false))
            .unwrap();

        target.dispatch("msg", "a");
        target.dispatch("msg", "b");
        target.unsubscribe(&"msg", &listener);
        target.dispatch("msg", "c");

        assert_eq!(*seen.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn signal_cancels_once() {
        let signal = FakeSignal::new();
        let calls = Rc::new(Cell::new(0));

        signal.subscribe_cancel(
            Listener::new({
                let calls = Rc::clone(&calls);
                move |(): &()| calls.set(calls.get() + 1)
            }),
            ListenerOptions::new(false, true, true),
        );

        signal.cancel();
        signal.cancel();

        assert!(signal.is_cancelled());
        assert_eq!(calls.get(), 1);
        assert_eq!(signal.listener_count(), 0);
    }
}
