//! Closable credit counter backing per-stream send windows.
//!
//! Writers park in [`Window::acquire`] until credit or a close arrives.
//! Closing is sticky and carries a reason, so a sender blocked mid-transfer
//! observes why the window went away (reset, flow-control kill, teardown).

use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::Error;

struct State {
    credit: i32,
    closed: Option<Error>,
}

pub(crate) struct Window {
    state: Mutex<State>,
    notify: Notify,
}

impl Window {
    pub fn new(initial: i32) -> Self {
        Self {
            state: Mutex::new(State {
                credit: initial,
                closed: None,
            }),
            notify: Notify::new(),
        }
    }

    /// Take up to `want` bytes of credit, waiting for the window to open.
    ///
    /// Returns the granted amount, `min(credit, want)`. A closed window
    /// yields its close reason, even if credit remains.
    pub async fn acquire(&self, want: usize) -> Result<usize, Error> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                if let Some(reason) = &state.closed {
                    return Err(reason.clone());
                }
                if state.credit >= 1 {
                    let grant = (state.credit as usize).min(want);
                    state.credit -= grant as i32;
                    return Ok(grant);
                }
            }
            notified.await;
        }
    }

    /// Return `delta` bytes of credit and wake waiters.
    ///
    /// The credit is applied even when the call fails, mirroring the wire
    /// rule: a non-positive delta or a wrap past 2^31-1 is reported as
    /// [`Error::BadIncrement`] for the caller to escalate.
    pub fn release(&self, delta: i32) -> Result<(), Error> {
        let result = {
            let mut state = self.state.lock().unwrap();
            if let Some(reason) = &state.closed {
                return Err(reason.clone());
            }
            let prev = state.credit;
            state.credit = state.credit.wrapping_add(delta);
            let wrapped = prev > 0 && state.credit < 0;
            if delta < 1 || wrapped {
                Err(Error::BadIncrement)
            } else {
                Ok(())
            }
        };
        self.notify.notify_waiters();
        result
    }

    /// Close the window with `reason`. Sticky; the first reason wins and
    /// every parked waiter wakes with it.
    pub fn close(&self, reason: Error) {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed.is_none() {
                state.closed = Some(reason);
            }
        }
        self.notify.notify_waiters();
    }
}
