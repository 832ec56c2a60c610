//! Cooperative cancellation shared between the caller, the producer and the workers

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex};

/// A cloneable flag that can be waited on.
///
/// Once [`cancel`](CancelToken::cancel) is called, every clone reports
/// `is_cancelled() == true`, and [`receiver`](CancelToken::receiver) becomes
/// ready (disconnected), so it can be used as an arm of `crossbeam_channel::select!`.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    // Dropping the sender is what wakes the receivers up
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Can be called any number of times, from any thread.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, SeqCst);
        // a poisoned lock still holds the sender
        let mut sender = match self.inner.sender.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        sender.take();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(SeqCst)
    }

    /// Never receives a message. Becomes disconnected when cancelled.
    #[inline]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.receiver
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}
