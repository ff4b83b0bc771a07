use std::rc::Rc;

use crate::{Listener, ListenerOptions};

/// An external request to abandon a wait.
///
/// A signal has a readable "already cancelled" state and emits a one-time cancel event to its
/// listeners when cancellation is requested. This is the shape of a DOM `AbortSignal`; implement
/// it as an adapter over whatever cancellation primitive your platform offers.
///
/// The same listener identity rules as for [`EventSource`][crate::EventSource] apply.
#[cfg_attr(test, mockall::automock)]
pub trait CancellationSignal {
    /// Whether cancellation has already been requested.
    fn is_cancelled(&self) -> bool;

    /// Registers `listener` to be called when cancellation is requested.
    fn subscribe_cancel(&self, listener: Listener<()>, options: ListenerOptions);

    /// Removes a registration previously made via
    /// [`subscribe_cancel()`][Self::subscribe_cancel].
    fn unsubscribe_cancel(&self, listener: &Listener<()>);
}

impl<C> CancellationSignal for Rc<C>
where
    C: CancellationSignal + ?Sized,
{
    #[inline]
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }

    #[inline]
    fn subscribe_cancel(&self, listener: Listener<()>, options: ListenerOptions) {
        (**self).subscribe_cancel(listener, options);
    }

    #[inline]
    fn unsubscribe_cancel(&self, listener: &Listener<()>) {
        (**self).unsubscribe_cancel(listener);
    }
}
