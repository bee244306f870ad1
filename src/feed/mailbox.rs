/*!
 * Hint Mailboxes
 * Publish-subscribe fan-out of priority hints to per-carrier subscribers
 *
 * Each subscriber owns a single-slot mailbox. Publishing overwrites any hint
 * the subscriber has not consumed yet, so at most one hint is ever pending
 * and no backlog builds up behind a slow slot loop.
 */

use super::traits::PriorityReceiver;
use crate::core::SchedResult;
use ahash::AHashMap;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

type SubscriberId = u64;

#[derive(Default)]
struct Mailbox {
    slot: ArcSwapOption<Bytes>,
}

#[derive(Default)]
struct BroadcastInner {
    subscribers: Mutex<AHashMap<SubscriberId, Weak<Mailbox>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    overwritten: AtomicU64,
}

/// Fans each hint out to every live subscriber
#[derive(Clone, Default)]
pub struct HintBroadcaster {
    inner: Arc<BroadcastInner>,
}

impl HintBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber; it only sees hints published after this call
    pub fn subscribe(&self) -> HintSubscriber {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::default());
        self.inner
            .subscribers
            .lock()
            .insert(id, Arc::downgrade(&mailbox));
        debug!(subscriber = id, "hint subscriber registered");
        HintSubscriber { id, mailbox }
    }

    /// Deliver `payload` to all live subscribers, returning how many got it
    pub fn publish(&self, payload: Bytes) -> usize {
        let payload = Arc::new(payload);
        let mut subscribers = self.inner.subscribers.lock();
        let mut delivered = 0;

        subscribers.retain(|id, weak| match weak.upgrade() {
            Some(mailbox) => {
                if mailbox.slot.swap(Some(Arc::clone(&payload))).is_some() {
                    self.inner.overwritten.fetch_add(1, Ordering::Relaxed);
                }
                delivered += 1;
                true
            }
            None => {
                debug!(subscriber = *id, "hint subscriber dropped");
                false
            }
        });

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Hints replaced before their subscriber consumed them
    pub fn overwritten(&self) -> u64 {
        self.inner.overwritten.load(Ordering::Relaxed)
    }
}

/// Receiving end of one hint mailbox
pub struct HintSubscriber {
    id: SubscriberId,
    mailbox: Arc<Mailbox>,
}

impl HintSubscriber {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a hint is waiting
    pub fn has_pending(&self) -> bool {
        self.mailbox.slot.load().is_some()
    }
}

impl PriorityReceiver for HintSubscriber {
    #[inline]
    fn try_recv(&mut self) -> SchedResult<Option<Bytes>> {
        Ok(self
            .mailbox
            .slot
            .swap(None)
            .map(|payload| Bytes::clone(&payload)))
    }
}
