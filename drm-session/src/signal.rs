use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Single value mailbox posted from a CDM callback and awaited with a
/// timeout by the session thread.
pub(crate) struct Signal<T> {
    state: Mutex<SignalState<T>>,
    cond: Condvar,
}

struct SignalState<T> {
    value: Option<T>,
    closed: bool,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Wait<T> {
    Value(T),
    Timeout,
    Closed,
}

impl<T> Signal<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SignalState {
                value: None,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Store `value`, replacing an unconsumed one. Ignored once closed.
    pub(crate) fn post(&self, value: T) {
        let mut state = self.state.lock();

        if !state.closed {
            state.value = Some(value);
            self.cond.notify_all();
        }
    }

    /// Take the posted value, blocking up to `timeout` for one to arrive.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Wait<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Wait::Closed;
            }

            if let Some(value) = state.value.take() {
                return Wait::Value(value);
            }

            if self.cond.wait_until(&mut state, deadline).timed_out() {
                if state.closed {
                    return Wait::Closed;
                }

                return state.value.take().map_or(Wait::Timeout, Wait::Value);
            }
        }
    }

    /// Wake every waiter with [`Wait::Closed`] and drop any pending value.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.value = None;
        self.cond.notify_all();
    }
}
