//! Rendezvous handoff between pipeline stages.
//!
//! Stages are connected by zero-capacity crossbeam channels: a send only
//! completes once a receiver has taken the value, so a slow consumer blocks
//! its producers all the way back to the socket. Blocking calls wake up every
//! [`POLL_INTERVAL`] to check the [`Shutdown`] flag.

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often blocked workers re-check the shutdown flag
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Process-wide stop flag shared by every worker.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Creates an unbuffered rendezvous channel.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    crossbeam_channel::bounded(0)
}

/// Blocks until a receiver takes `value`.
///
/// Returns false if shutdown was triggered first or every receiver is gone;
/// the value is dropped in that case.
pub fn send<T>(tx: &Sender<T>, mut value: T, shutdown: &Shutdown) -> bool {
    loop {
        match tx.send_timeout(value, POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(v)) => {
                if shutdown.is_triggered() {
                    return false;
                }
                value = v;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Blocks until a sender hands over a value.
///
/// Returns `None` once shutdown is triggered or every sender is gone.
pub fn recv<T>(rx: &Receiver<T>, shutdown: &Shutdown) -> Option<T> {
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(value) => return Some(value),
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.is_triggered() {
                    return None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}
