//! # Channel Gateway
//!
//! The single transport abstraction. Producers, the authorization gate and
//! Core all hold an `Arc<dyn ChannelGateway>`; only one concrete channel is
//! wired at composition time, and nothing else can reach the gate's
//! decision path.

use crate::events::{EventFilter, GatewayEvent};
use crate::subscriber::{ChannelId, Sequenced, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Publish/consume surface shared by every participant.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Publish an event.
    ///
    /// # Returns
    ///
    /// The number of subscribers whose filter matched and that received the
    /// event.
    async fn publish(&self, event: GatewayEvent) -> usize;

    /// Subscribe to events matching a filter.
    fn subscribe(&self, filter: EventFilter) -> Subscription;

    /// Identity stamped onto every delivered event.
    fn channel_id(&self) -> ChannelId;

    /// Total events published.
    fn events_published(&self) -> u64;
}

struct Subscriber {
    filter: EventFilter,
    sender: mpsc::Sender<Sequenced>,
}

/// In-memory channel.
///
/// Each subscriber owns a bounded queue and only matching events are pushed
/// into it. A full queue makes `publish` wait for the consumer, so a burst on
/// one topic never evicts events of another and nothing is dropped while the
/// subscriber is alive.
pub struct InMemoryChannel {
    subscribers: Mutex<Vec<Subscriber>>,
    id: ChannelId,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            id: ChannelId::new(),
            events_published: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.sender.is_closed());
        subscribers.len()
    }

    /// Per-subscriber queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelGateway for InMemoryChannel {
    async fn publish(&self, event: GatewayEvent) -> usize {
        let topic = event.topic();
        let sequence = self.events_published.fetch_add(1, Ordering::SeqCst);

        // Lock is released before any send is awaited.
        let targets: Vec<mpsc::Sender<Sequenced>> = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|s| !s.sender.is_closed());
            subscribers
                .iter()
                .filter(|s| s.filter.matches(&event))
                .map(|s| s.sender.clone())
                .collect()
        };

        let mut receivers = 0;
        for sender in targets {
            let item = Sequenced {
                sequence,
                event: event.clone(),
            };
            if sender.send(item).await.is_ok() {
                receivers += 1;
            }
        }

        if receivers == 0 {
            warn!(?topic, sequence, "Event dropped (no receivers)");
        } else {
            debug!(?topic, sequence, receivers, "Event published");
        }
        receivers
    }

    fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, channel = %self.id, "New subscription created");
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers.lock().push(Subscriber {
            filter: filter.clone(),
            sender,
        });
        Subscription::new(receiver, filter, self.id)
    }

    fn channel_id(&self) -> ChannelId {
        self.id
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::SeqCst)
    }
}
