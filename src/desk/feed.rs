//! Change feed for the ticket collection.
//!
//! Events are opaque "something changed" triggers; subscribers resync
//! rather than apply them.

use brodesk_common::ChangeEvent;
use tokio::sync::broadcast;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 256;

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Event(ChangeEvent),
    /// The subscriber fell behind and `n` events were dropped.
    Lagged(u64),
}

pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> Subscription;
    fn publish(&self, event: ChangeEvent);
}

/// One live subscription. Dropping it (or calling [`Subscription::unsubscribe`])
/// releases it.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Next item, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<FeedItem> {
        match self.rx.recv().await {
            Ok(event) => Some(FeedItem::Event(event)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(FeedItem::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Next already-queued item, without waiting.
    pub fn try_recv(&mut self) -> Option<FeedItem> {
        match self.rx.try_recv() {
            Ok(event) => Some(FeedItem::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(FeedItem::Lagged(n)),
            Err(_) => None,
        }
    }

    pub fn unsubscribe(self) {}
}

/// In-process feed over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl BroadcastFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed for BroadcastFeed {
    fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(kind = ?event.kind, ticket = %event.ticket_id, delivered, "change published");
    }
}
