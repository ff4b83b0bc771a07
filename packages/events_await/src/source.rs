use std::rc::Rc;

use crate::Listener;

/// Options that accompany a listener registration.
///
/// These mirror the registration flags commonly found on DOM-style event targets. The
/// awaited-event machinery resolves them once per operation and passes them to the event
/// source (or cancellation signal) verbatim; what they mean beyond that is up to the source.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ListenerOptions {
    capture: bool,
    passive: bool,
    once: bool,
}

impl ListenerOptions {
    #[must_use]
    pub(crate) const fn new(capture: bool, passive: bool, once: bool) -> Self {
        Self {
            capture,
            passive,
            once,
        }
    }

    /// Whether the listener should be invoked during the capture phase of dispatch.
    #[must_use]
    #[inline]
    pub const fn capture(&self) -> bool {
        self.capture
    }

    /// Whether the listener promises not to interfere with the default handling of the event.
    #[must_use]
    #[inline]
    pub const fn passive(&self) -> bool {
        self.passive
    }

    /// Whether the source should remove the listener on its own after the first delivery.
    #[must_use]
    #[inline]
    pub const fn once(&self) -> bool {
        self.once
    }
}

/// Something that can register and unregister listeners for identified events.
///
/// This is the capability the awaited-event bridge consumes; implement it as an adapter over
/// whatever publish/subscribe mechanism your platform offers. Implementations are expected to:
///
/// * Deliver events to listeners in registration order.
/// * Tolerate `subscribe()` and `unsubscribe()` calls made from inside a listener callback.
/// * Identify listeners by [`Listener`] equality when unsubscribing. Unsubscribing a listener
///   that is not registered is a no-op.
///
/// Sources are typically cheap handles (an `Rc` around the shared state). A forwarding
/// implementation is provided for `Rc<S>`, so any source can be shared that way.
#[cfg_attr(test, mockall::automock(
    type EventId = &'static str;
    type Event = String;
    type Error = std::io::Error;
))]
pub trait EventSource {
    /// Identifies a kind of event within the namespace of the source.
    type EventId;

    /// The payload delivered to listeners.
    type Event;

    /// Returned by [`subscribe()`][Self::subscribe] if a registration is refused.
    type Error;

    /// Registers `listener` to be called for every `event_id` event the source emits.
    ///
    /// # Errors
    ///
    /// Returns an error if the source refuses the registration. The listener is not
    /// registered in that case.
    fn subscribe(
        &self,
        event_id: &Self::EventId,
        listener: Listener<Self::Event>,
        options: ListenerOptions,
    ) -> Result<(), Self::Error>;

    /// Removes a registration previously made via [`subscribe()`][Self::subscribe].
    fn unsubscribe(&self, event_id: &Self::EventId, listener: &Listener<Self::Event>);
}

impl<S> EventSource for Rc<S>
where
    S: EventSource + ?Sized,
{
    type EventId = S::EventId;
    type Event = S::Event;
    type Error = S::Error;

    #[inline]
    fn subscribe(
        &self,
        event_id: &Self::EventId,
        listener: Listener<Self::Event>,
        options: ListenerOptions,
    ) -> Result<(), Self::Error> {
        (**self).subscribe(event_id, listener, options)
    }

    #[inline]
    fn unsubscribe(&self, event_id: &Self::EventId, listener: &Listener<Self::Event>) {
        (**self).unsubscribe(event_id, listener);
    }
}
