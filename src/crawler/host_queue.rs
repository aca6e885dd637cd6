//! Per-host work mailbox
//!
//! The crawler pushes whole batches without ever blocking; the host worker
//! pops one context at a time. A push onto an unconsumed batch stacks the new
//! entries behind the old ones, so nothing is lost or reordered.

use crate::url::UrlContext;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct Slot {
    items: VecDeque<UrlContext>,
    closed: bool,
}

/// Single-slot stacking mailbox between the crawler and one host worker
#[derive(Default)]
pub struct HostQueue {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl HostQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        // A poisoned lock means a push or pop panicked; keep the data.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a batch behind any unconsumed entries
    ///
    /// Never blocks. An empty batch is accepted and ignored. If the queue is
    /// closed the batch is handed back untouched.
    pub fn push(&self, batch: Vec<UrlContext>) -> Result<(), Vec<UrlContext>> {
        {
            let mut slot = self.lock();
            if slot.closed {
                return Err(batch);
            }
            if batch.is_empty() {
                return Ok(());
            }
            slot.items.extend(batch);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Takes the next context, waiting for one to arrive
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<UrlContext> {
        loop {
            let notified = self.notify.notified();
            {
                let mut slot = self.lock();
                if let Some(ctx) = slot.items.pop_front() {
                    return Some(ctx);
                }
                if slot.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the queue only if nothing is waiting in it
    ///
    /// Returns whether the queue is now closed.
    pub fn close_if_empty(&self) -> bool {
        let mut slot = self.lock();
        if slot.items.is_empty() {
            slot.closed = true;
        }
        slot.closed
    }

    /// Closes the queue; entries still queued can be popped
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
