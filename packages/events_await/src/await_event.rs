use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{self, Poll};

use futures::future::FusedFuture;
use tracing::debug;

use crate::{AwaitOptions, Cancelled, EventSource, Operation, OperationId, OperationState};

/// Waits for the next `event_id` event from `source` that qualifies, as a future.
///
/// Without a filter, the first delivered event qualifies. With a filter (see
/// [`AwaitOptions::filter()`]), events are offered to the filter one by one until it accepts
/// one, and the wait settles with whatever value the filter produced.
///
/// If a cancellation signal is configured (see [`AwaitOptions::signal()`]) and it fires before a
/// qualifying event arrives, the wait settles with a [`Cancelled`] error. If the signal is already
/// cancelled when this is called, the returned future is already settled and no listener is
/// registered anywhere.
///
/// Every listener this registers is removed again before the future settles, whichever way it
/// settles. Dropping the future before it settles also removes them.
///
/// The returned future does nothing on its own. It settles when the source or the signal
/// delivers to the registered listeners, on whatever task drives them.
///
/// # Errors
///
/// Returns the error of the source if it refuses to register the event listener.
/// Nothing is left registered in that case.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::convert::Infallible;
/// use std::rc::Rc;
///
/// use events_await::{AwaitOptions, EventSource, Filtered, Listener, ListenerOptions, await_event};
///
/// #[derive(Clone, Default)]
/// struct Doorbell {
///     listeners: Rc<RefCell<Vec<Listener<u32>>>>,
/// }
///
/// impl Doorbell {
///     fn ring(&self, visitor: u32) {
///         let listeners = self.listeners.borrow().clone();
///
///         for listener in listeners {
///             listener.call(&visitor);
///         }
///     }
/// }
///
/// impl EventSource for Doorbell {
///     type EventId = &'static str;
///     type Event = u32;
///     type Error = Infallible;
///
///     fn subscribe(
///         &self,
///         _event_id: &&'static str,
///         listener: Listener<u32>,
///         _options: ListenerOptions,
///     ) -> Result<(), Infallible> {
///         self.listeners.borrow_mut().push(listener);
///         Ok(())
///     }
///
///     fn unsubscribe(&self, _event_id: &&'static str, listener: &Listener<u32>) {
///         self.listeners.borrow_mut().retain(|registered| registered != listener);
///     }
/// }
///
/// let doorbell = Doorbell::default();
///
/// let options = AwaitOptions::<Doorbell>::new().filter(|visitor, _| {
///     Ok(if *visitor > 1 {
///         Filtered::Accept(*visitor * 10)
///     } else {
///         Filtered::Skip
///     })
/// });
///
/// let second_visitor = await_event(&doorbell, "ring", options).unwrap();
///
/// doorbell.ring(1);
/// doorbell.ring(2);
///
/// let value = futures::executor::block_on(second_visitor).unwrap();
/// assert_eq!(value, 20);
/// ```
pub fn await_event<S, T>(
    source: &S,
    event_id: S::EventId,
    options: AwaitOptions<S, T>,
) -> Result<AwaitEvent<S, T>, S::Error>
where
    S: EventSource + Clone + 'static,
    S::Event: Clone + 'static,
    T: From<S::Event> + 'static,
{
    if let Some(signal) = &options.signal {
        if signal.is_cancelled() {
            let error = Cancelled::from_installed_type();
            let id = OperationId::next();

            debug!(operation = %id, "signal already cancelled; not subscribing");

            return Ok(AwaitEvent {
                id,
                progress: Progress::Rejected(error),
            });
        }
    }

    let operation = Operation::start(source.clone(), event_id, options)?;

    Ok(AwaitEvent {
        id: operation.id(),
        progress: Progress::Registered(operation),
    })
}

/// Method-style access to [`await_event()`], with the event source as the receiver.
///
/// Implemented for every [`EventSource`].
///
/// # Example
///
/// ```rust
/// # use std::convert::Infallible;
/// # use events_await::{EventSource, Listener, ListenerOptions};
/// # #[derive(Clone)]
/// # struct Window;
/// # impl EventSource for Window {
/// #     type EventId = &'static str;
/// #     type Event = (u32, u32);
/// #     type Error = Infallible;
/// #     fn subscribe(&self, _: &&'static str, _: Listener<(u32, u32)>, _: ListenerOptions) -> Result<(), Infallible> { Ok(()) }
/// #     fn unsubscribe(&self, _: &&'static str, _: &Listener<(u32, u32)>) {}
/// # }
/// use events_await::{AwaitOnce, AwaitOptions};
///
/// let window = Window;
/// let resized = window.await_once("resize", AwaitOptions::new()).unwrap();
/// # drop(resized);
/// ```
pub trait AwaitOnce: EventSource + Sized {
    /// Equivalent to `await_event(self, event_id, options)`.
    ///
    /// # Errors
    ///
    /// Returns the error of the source if it refuses to register the event listener.
    fn await_once<T>(
        &self,
        event_id: Self::EventId,
        options: AwaitOptions<Self, T>,
    ) -> Result<AwaitEvent<Self, T>, Self::Error>
    where
        Self: Clone + 'static,
        Self::Event: Clone + 'static,
        T: From<Self::Event> + 'static;
}

impl<S> AwaitOnce for S
where
    S: EventSource,
{
    #[inline]
    fn await_once<T>(
        &self,
        event_id: Self::EventId,
        options: AwaitOptions<Self, T>,
    ) -> Result<AwaitEvent<Self, T>, Self::Error>
    where
        Self: Clone + 'static,
        Self::Event: Clone + 'static,
        T: From<Self::Event> + 'static,
    {
        await_event(self, event_id, options)
    }
}

enum Progress<S, T>
where
    S: EventSource,
{
    /// The signal was already cancelled when the wait was requested.
    Rejected(Cancelled),

    /// Listeners are (or were, if already settled) registered.
    Registered(Rc<Operation<S, T>>),

    /// The outcome has been handed out by `poll()`.
    Completed(OperationState),
}

/// A wait for a qualifying event, created by [`await_event()`] or [`AwaitOnce::await_once()`].
///
/// Resolves to `Ok` with the value of the qualifying event or to `Err` with a [`Cancelled`] error
/// if the cancellation signal fired first.
///
/// Dropping the future before it settles removes all listeners it registered.
///
/// The future is single-threaded.
pub struct AwaitEvent<S, T = <S as EventSource>::Event>
where
    S: EventSource,
{
    id: OperationId,
    progress: Progress<S, T>,
}

impl<S, T> AwaitEvent<S, T>
where
    S: EventSource,
{
    /// Identifies the wait; matches what a filter sees in
    /// [`FilterContext::operation()`][crate::FilterContext::operation].
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Where the wait is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> OperationState {
        match &self.progress {
            Progress::Rejected(_) => OperationState::Cancelled,
            Progress::Registered(operation) => operation.state(),
            Progress::Completed(state) => *state,
        }
    }

    /// Whether the next poll will return `Ready`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match &self.progress {
            Progress::Rejected(_) => true,
            Progress::Registered(operation) => operation.state() != OperationState::Waiting,
            Progress::Completed(_) => false,
        }
    }
}

impl<S, T> Future for AwaitEvent<S, T>
where
    S: EventSource,
{
    type Output = Result<T, Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let progress = mem::replace(
            &mut this.progress,
            Progress::Completed(OperationState::Cancelled),
        );

        match progress {
            Progress::Rejected(error) => Poll::Ready(Err(error)),
            Progress::Registered(operation) => {
                if let Some(outcome) = operation.poll_outcome(cx.waker()) {
                    this.progress = Progress::Completed(operation.state());
                    Poll::Ready(outcome)
                } else {
                    this.progress = Progress::Registered(operation);
                    Poll::Pending
                }
            }
            Progress::Completed(_) => panic!("AwaitEvent polled after completion"),
        }
    }
}

impl<S, T> FusedFuture for AwaitEvent<S, T>
where
    S: EventSource,
{
    fn is_terminated(&self) -> bool {
        matches!(self.progress, Progress::Completed(_))
    }
}

impl<S, T> Drop for AwaitEvent<S, T>
where
    S: EventSource,
{
    fn drop(&mut self) {
        if let Progress::Registered(operation) = &self.progress {
            operation.abandon();
        }
    }
}

impl<S, T> fmt::Debug for AwaitEvent<S, T>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwaitEvent")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
