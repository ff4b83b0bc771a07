use std::any::type_name;
use std::fmt;
use std::ptr;
use std::rc::Rc;

/// A callback registered with an [`EventSource`][crate::EventSource] or a
/// [`CancellationSignal`][crate::CancellationSignal].
///
/// Cloning a listener is cheap and produces a handle to the same callback. Two listeners compare
/// equal if and only if they are handles to the same callback, which is how an event source
/// finds the registration to remove when asked to unsubscribe a listener.
///
/// Listeners are single-threaded.
///
/// # Example
///
/// ```rust
/// use events_await::Listener;
///
/// let listener = Listener::new(|message: &String| println!("received {message}"));
/// let same = listener.clone();
/// let other = Listener::new(|_: &String| {});
///
/// assert_eq!(listener, same);
/// assert_ne!(listener, other);
///
/// listener.call(&"hello".to_string());
/// ```
pub struct Listener<E> {
    callback: Rc<dyn Fn(&E)>,
}

impl<E> Listener<E> {
    /// Wraps a callback into a listener.
    #[must_use]
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&E) + 'static,
    {
        Self {
            callback: Rc::new(callback),
        }
    }

    /// Delivers an event to the listener.
    #[inline]
    pub fn call(&self, event: &E) {
        (self.callback)(event);
    }

    /// Whether both handles refer to the same callback.
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        // Only the data address matters; vtable pointers for the same closure
        // may differ between codegen units.
        ptr::addr_eq(Rc::as_ptr(&self.callback), Rc::as_ptr(&other.callback))
    }
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<E> PartialEq for Listener<E> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<E> Eq for Listener<E> {}

impl<E> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("callback", &Rc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}
