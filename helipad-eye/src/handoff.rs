//! Single-slot, overwrite-on-full channel between pipeline stages

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Create a hand-off pair. The slot holds at most one item; sending into a
/// full slot evicts the unread item, so the sender never blocks and the
/// receiver always sees the newest value.
pub fn handoff<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = bounded(1);
    (
        HandoffSender {
            tx,
            evict: rx.clone(),
        },
        HandoffReceiver { rx },
    )
}

pub struct HandoffSender<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
}

impl<T> HandoffSender<T> {
    /// Place `item` in the slot; returns true if a stale item was dropped
    pub fn send(&self, item: T) -> bool {
        let mut item = item;
        let mut evicted = false;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    if self.evict.try_recv().is_ok() {
                        evicted = true;
                    }
                    item = back;
                }
                // Unreachable while `evict` is alive
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }
}

pub struct HandoffReceiver<T> {
    rx: Receiver<T>,
}

impl<T> HandoffReceiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for an item
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
