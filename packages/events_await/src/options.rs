use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

use crate::{BoxError, CancellationSignal, EventSource, ListenerOptions, OperationId};

/// What a filter decided about one delivered event.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "accepting or skipping are the only decisions a filter can make"
)]
pub enum Filtered<T> {
    /// The event qualifies. The wait settles with this value.
    ///
    /// Any value counts, including empty strings, zero and other "empty" values.
    Accept(T),

    /// The event does not qualify. The wait continues with the next delivery.
    Skip,
}

impl<T> From<Option<T>> for Filtered<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Skip, Self::Accept)
    }
}

pub(crate) type BoxedFilter<S, T> = Box<
    dyn FnMut(&<S as EventSource>::Event, &FilterContext<'_, S>) -> Result<Filtered<T>, BoxError>,
>;

/// Describes the wait that a filter is being called for.
pub struct FilterContext<'a, S>
where
    S: EventSource,
{
    pub(crate) source: &'a S,
    pub(crate) event_id: &'a S::EventId,
    pub(crate) operation: OperationId,
    pub(crate) state: Option<&'a (dyn Any + 'static)>,
    pub(crate) delivery: usize,
}

impl<'a, S> FilterContext<'a, S>
where
    S: EventSource,
{
    /// The event source being listened to.
    #[must_use]
    pub fn source(&self) -> &'a S {
        self.source
    }

    /// The event being listened for.
    #[must_use]
    pub fn event_id(&self) -> &'a S::EventId {
        self.event_id
    }

    /// Identifies the wait; matches [`AwaitEvent::id()`][crate::AwaitEvent::id].
    #[must_use]
    pub fn operation(&self) -> OperationId {
        self.operation
    }

    /// The supplemental state given via [`AwaitOptions::state()`], if any.
    #[must_use]
    pub fn state(&self) -> Option<&'a (dyn Any + 'static)> {
        self.state
    }

    /// The supplemental state given via [`AwaitOptions::state()`], if any and if it is a `V`.
    #[must_use]
    pub fn state_as<V>(&self) -> Option<&'a V>
    where
        V: Any,
    {
        self.state.and_then(<dyn Any>::downcast_ref::<V>)
    }

    /// How many events have been offered to the filter of this wait so far, including the
    /// current one.
    #[must_use]
    pub fn delivery(&self) -> usize {
        self.delivery
    }
}

impl<S> fmt::Debug for FilterContext<'_, S>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("operation", &self.operation)
            .field("has_state", &self.state.is_some())
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

/// How the event listener is registered, decided once when the wait starts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RegistrationPolicy {
    /// Without a filter the first delivery always settles the wait,
    /// so the source may drop the listener on its own.
    SingleFire,

    /// With a filter any number of deliveries may be skipped before one qualifies.
    MultiFire,
}

impl RegistrationPolicy {
    pub(crate) fn once(self) -> bool {
        matches!(self, Self::SingleFire)
    }
}

/// Configures a wait started by [`await_event()`][crate::await_event].
///
/// `T` is the type the wait settles with. It is the event type of the source unless a filter
/// that transforms events is set.
///
/// # Example
///
/// ```rust
/// # use std::convert::Infallible;
/// # use events_await::{EventSource, Listener, ListenerOptions};
/// # #[derive(Clone)]
/// # struct Socket;
/// # impl EventSource for Socket {
/// #     type EventId = &'static str;
/// #     type Event = String;
/// #     type Error = Infallible;
/// #     fn subscribe(&self, _: &&'static str, _: Listener<String>, _: ListenerOptions) -> Result<(), Infallible> { Ok(()) }
/// #     fn unsubscribe(&self, _: &&'static str, _: &Listener<String>) {}
/// # }
/// use events_await::{AwaitOptions, Filtered};
///
/// let options = AwaitOptions::<Socket>::new()
///     .passive(false)
///     .filter(|message, _| {
///         Ok(match message.strip_prefix("json:") {
///             Some(body) => Filtered::Accept(body.trim().to_string()),
///             None => Filtered::Skip,
///         })
///     });
/// # drop(options);
/// ```
pub struct AwaitOptions<S, T = <S as EventSource>::Event>
where
    S: EventSource,
{
    pub(crate) filter: Option<BoxedFilter<S, T>>,
    pub(crate) state: Option<Rc<dyn Any>>,
    pub(crate) signal: Option<Rc<dyn CancellationSignal>>,
    pub(crate) capture: bool,
    pub(crate) passive: bool,
    pub(crate) cancel_passive: Option<bool>,
}

impl<S> AwaitOptions<S>
where
    S: EventSource,
{
    /// Options for settling with the first event, without cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filter: None,
            state: None,
            signal: None,
            capture: false,
            passive: true,
            cancel_passive: None,
        }
    }
}

impl<S> Default for AwaitOptions<S>
where
    S: EventSource,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T> AwaitOptions<S, T>
where
    S: EventSource,
{
    /// Decides, for every delivered event, whether the wait settles and with what value.
    ///
    /// If the filter returns an error, the error is discarded and the wait settles with the
    /// original event, converted via `From`. This is why [`await_event()`][crate::await_event]
    /// requires `U: From<Event>`.
    ///
    /// Replaces any previously set filter.
    ///
    /// # Panics
    ///
    /// A panic inside the filter is not treated as a failed filter. It unwinds through the
    /// delivery, out of whatever call on the event source is dispatching the event. The wait
    /// stays registered and can still settle with a later event.
    #[must_use]
    pub fn filter<U, F>(self, filter: F) -> AwaitOptions<S, U>
    where
        F: FnMut(&S::Event, &FilterContext<'_, S>) -> Result<Filtered<U>, BoxError> + 'static,
    {
        AwaitOptions {
            filter: Some(Box::new(filter)),
            state: self.state,
            signal: self.signal,
            capture: self.capture,
            passive: self.passive,
            cancel_passive: self.cancel_passive,
        }
    }

    /// Opaque value handed to the filter via [`FilterContext::state()`].
    #[must_use]
    pub fn state<V>(mut self, state: V) -> Self
    where
        V: Any,
    {
        self.state = Some(Rc::new(state));
        self
    }

    /// Abandons the wait with a [`Cancelled`][crate::Cancelled] error when the signal fires.
    #[must_use]
    pub fn signal<C>(mut self, signal: C) -> Self
    where
        C: CancellationSignal + 'static,
    {
        self.signal = Some(Rc::new(signal));
        self
    }

    /// Whether listeners are registered for the capture phase. Defaults to `false`.
    #[must_use]
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Whether the event listener is registered as passive. Defaults to `true`.
    #[must_use]
    pub fn passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    /// Whether the cancel listener is registered as passive.
    ///
    /// Defaults to whatever [`passive()`][Self::passive] resolves to.
    #[must_use]
    pub fn cancel_passive(mut self, cancel_passive: bool) -> Self {
        self.cancel_passive = Some(cancel_passive);
        self
    }

    pub(crate) fn registration_policy(&self) -> RegistrationPolicy {
        if self.filter.is_some() {
            RegistrationPolicy::MultiFire
        } else {
            RegistrationPolicy::SingleFire
        }
    }

    pub(crate) fn event_listener_options(&self) -> ListenerOptions {
        ListenerOptions::new(
            self.capture,
            self.passive,
            self.registration_policy().once(),
        )
    }

    /// Cancellation only needs to be observed once.
    pub(crate) fn cancel_listener_options(&self) -> ListenerOptions {
        ListenerOptions::new(
            self.capture,
            self.cancel_passive.unwrap_or(self.passive),
            true,
        )
    }
}

impl<S, T> fmt::Debug for AwaitOptions<S, T>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("has_filter", &self.filter.is_some())
            .field("has_state", &self.state.is_some())
            .field("has_signal", &self.signal.is_some())
            .field("capture", &self.capture)
            .field("passive", &self.passive)
            .field("cancel_passive", &self.cancel_passive)
            .finish()
    }
}
