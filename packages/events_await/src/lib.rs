#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Await the next qualifying event from an event source as a future.
//!
//! [`await_event()`] registers a listener with an [`EventSource`] and returns an [`AwaitEvent`]
//! future that settles with the first event that qualifies. Which events qualify, and what value
//! the future settles with, can be decided by a filter set via [`AwaitOptions::filter()`].
//!
//! A wait can be tied to a [`CancellationSignal`]. If the signal fires before a qualifying event
//! arrives, the future settles with a [`Cancelled`] error instead. The error carried inside
//! [`Cancelled`] is constructed by the process-wide [`CancellationErrorType`], which defaults to
//! [`AbortError`] and can be replaced via [`set_cancellation_error_type()`].
//!
//! Whichever way a wait settles, every listener it registered is removed before the outcome
//! becomes observable. Dropping a wait that has not settled removes them as well.
//!
//! The types in this crate are single-threaded. Events are delivered by whatever drives the
//! source, on the thread that owns it.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::convert::Infallible;
//! use std::rc::Rc;
//!
//! use events_await::{AwaitOnce, AwaitOptions, EventSource, Filtered, Listener, ListenerOptions};
//! use futures::executor::block_on;
//!
//! #[derive(Clone, Default)]
//! struct Chat {
//!     listeners: Rc<RefCell<Vec<Listener<String>>>>,
//! }
//!
//! impl Chat {
//!     fn post(&self, message: &str) {
//!         let listeners = self.listeners.borrow().clone();
//!
//!         for listener in listeners {
//!             listener.call(&message.to_string());
//!         }
//!     }
//! }
//!
//! impl EventSource for Chat {
//!     type EventId = &'static str;
//!     type Event = String;
//!     type Error = Infallible;
//!
//!     fn subscribe(
//!         &self,
//!         _event_id: &&'static str,
//!         listener: Listener<String>,
//!         _options: ListenerOptions,
//!     ) -> Result<(), Infallible> {
//!         self.listeners.borrow_mut().push(listener);
//!         Ok(())
//!     }
//!
//!     fn unsubscribe(&self, _event_id: &&'static str, listener: &Listener<String>) {
//!         self.listeners.borrow_mut().retain(|registered| registered != listener);
//!     }
//! }
//!
//! let chat = Chat::default();
//!
//! let command = chat
//!     .await_once(
//!         "message",
//!         AwaitOptions::<Chat>::new().filter(|message, _| {
//!             Ok(Filtered::from(message.strip_prefix('/').map(str::to_string)))
//!         }),
//!     )
//!     .unwrap();
//!
//! chat.post("hello everyone");
//! chat.post("/quit");
//!
//! assert_eq!(block_on(command).unwrap(), "quit");
//! assert!(chat.listeners.borrow().is_empty());
//! ```

mod await_event;
mod cancelled;
mod listener;
mod operation;
mod options;
mod registry;
mod signal;
mod source;

#[cfg(test)]
mod test_utils;

pub use await_event::{AwaitEvent, AwaitOnce, await_event};
pub use cancelled::{AbortError, BoxError, Cancelled};
pub use listener::Listener;
pub(crate) use operation::Operation;
pub use operation::{OperationId, OperationState};
pub(crate) use options::BoxedFilter;
pub use options::{AwaitOptions, FilterContext, Filtered};
pub use registry::{
    CancellationErrorType, cancellation_error_type, reset_cancellation_error_type,
    set_cancellation_error_type,
};
#[cfg(test)]
pub(crate) use signal::MockCancellationSignal;
pub use signal::CancellationSignal;
#[cfg(test)]
pub(crate) use source::MockEventSource;
pub use source::{EventSource, ListenerOptions};
