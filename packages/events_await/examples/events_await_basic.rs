//! Basic usage of `events_await`: waiting for a filtered event and cancelling a wait.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use events_await::{
    AwaitOptions, CancellationSignal, EventSource, Filtered, Listener, ListenerOptions,
    await_event,
};
use futures::executor::block_on;

/// Delivers key presses to whoever listens for `"keydown"`.
#[derive(Clone, Debug, Default)]
struct Keyboard {
    listeners: Rc<RefCell<Vec<(&'static str, Listener<char>)>>>,
}

impl Keyboard {
    fn press(&self, key: char) {
        let listeners: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(event_id, _)| *event_id == "keydown")
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.call(&key);
        }
    }
}

impl EventSource for Keyboard {
    type EventId = &'static str;
    type Event = char;
    type Error = Infallible;

    fn subscribe(
        &self,
        event_id: &&'static str,
        listener: Listener<char>,
        _options: ListenerOptions,
    ) -> Result<(), Self::Error> {
        self.listeners.borrow_mut().push((*event_id, listener));
        Ok(())
    }

    fn unsubscribe(&self, event_id: &&'static str, listener: &Listener<char>) {
        self.listeners
            .borrow_mut()
            .retain(|(id, registered)| !(id == event_id && registered == listener));
    }
}

/// A cancellation signal that fires when the user gives up.
#[derive(Clone, Debug, Default)]
struct GiveUp {
    fired: Rc<Cell<bool>>,
    listeners: Rc<RefCell<Vec<Listener<()>>>>,
}

impl GiveUp {
    fn fire(&self) {
        self.fired.set(true);

        let listeners = self.listeners.borrow().clone();

        for listener in listeners {
            listener.call(&());
        }
    }
}

impl CancellationSignal for GiveUp {
    fn is_cancelled(&self) -> bool {
        self.fired.get()
    }

    fn subscribe_cancel(&self, listener: Listener<()>, _options: ListenerOptions) {
        self.listeners.borrow_mut().push(listener);
    }

    fn unsubscribe_cancel(&self, listener: &Listener<()>) {
        self.listeners
            .borrow_mut()
            .retain(|registered| registered != listener);
    }
}

fn main() {
    println!("=== events_await basic example ===");

    let keyboard = Keyboard::default();

    // Settle with the first digit typed, as a number.
    let digit = await_event(
        &keyboard,
        "keydown",
        AwaitOptions::<Keyboard>::new().filter(|key, _| {
            Ok(Filtered::from(key.to_digit(10).map(|value| Digit { value })))
        }),
    )
    .unwrap();

    keyboard.press('x');
    keyboard.press('7');

    let digit = block_on(digit).unwrap();
    println!("First digit typed: {}", digit.value);

    // A wait that is given up on before anything is typed.
    let give_up = GiveUp::default();
    let any_key = await_event(
        &keyboard,
        "keydown",
        AwaitOptions::new().signal(give_up.clone()),
    )
    .unwrap();

    give_up.fire();
    keyboard.press('q');

    match block_on(any_key) {
        Ok(key) => println!("Unexpectedly got key {key}"),
        Err(cancelled) => println!("Wait was cancelled: {cancelled}"),
    }

    println!("Listeners left registered: {}", keyboard.listeners.borrow().len());
}

/// A digit typed on the keyboard.
#[derive(Debug)]
struct Digit {
    value: u32,
}

// Used if the filter fails, which this one never does.
impl From<char> for Digit {
    fn from(key: char) -> Self {
        Self {
            value: key.to_digit(10).unwrap_or_default(),
        }
    }
}
