//! Cooperative cancellation.
//!
//! A [`StopSignal`] is a one-way flag: once raised it stays raised for the rest of the run. It's
//! raised by the interrupt handler, or by anything else holding a clone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::Result;

#[derive(Debug, Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    raised: AtomicBool,
    // dropped on raise; sleepers in `wait_timeout` wake on the disconnect
    close: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> StopSignal {
        let (close, closed) = bounded(0);

        StopSignal {
            inner: Arc::new(Inner {
                raised: AtomicBool::new(false),
                close: Mutex::new(Some(close)),
                closed,
            }),
        }
    }

    /// Raise the signal. Only the first call does anything; it's the one that returns true.
    pub fn raise(&self) -> bool {
        if self.inner.raised.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.inner.close.lock().take();
        true
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.inner.raised.load(Ordering::Acquire)
    }

    /// Sleep for up to `timeout`, waking early if the signal is raised. Returns whether the signal
    /// is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.closed.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_set(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        StopSignal::new()
    }
}

/// Raise `stop` on ctrl-c. Can only be installed once per process.
pub fn install_interrupt_handler(stop: StopSignal) -> Result<()> {
    ctrlc::set_handler(move || {
        stop.raise();
        println!("\nStopping workers...");
    })?;

    Ok(())
}
