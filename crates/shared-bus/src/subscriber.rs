//! # Channel Subscriber
//!
//! The receive side of the channel. Every delivered event carries a
//! [`ChannelStamp`] that only the channel can mint; downstream components
//! accept input only when it arrives with a stamp from the channel they were
//! wired to.

use crate::events::{EventFilter, GatewayEvent};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Errors from channel operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No matching event before the deadline.
    #[error("no message within {0:?}")]
    Timeout(Duration),

    /// The channel was dropped.
    #[error("channel closed")]
    Closed,
}

/// Identity of one channel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Proof that an event travelled through a specific channel.
///
/// Not constructible outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStamp {
    channel: ChannelId,
    sequence: u64,
}

impl ChannelStamp {
    pub(crate) fn new(channel: ChannelId, sequence: u64) -> Self {
        Self { channel, sequence }
    }

    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel
    }

    /// Publish sequence number within the channel.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn issued_by(&self, channel: ChannelId) -> bool {
        self.channel == channel
    }
}

/// An event as delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub stamp: ChannelStamp,
    pub event: GatewayEvent,
}

/// Item carried on a subscriber queue.
#[derive(Debug, Clone)]
pub(crate) struct Sequenced {
    pub(crate) sequence: u64,
    pub(crate) event: GatewayEvent,
}

/// A subscription handle for receiving events.
pub struct Subscription {
    receiver: mpsc::Receiver<Sequenced>,
    filter: EventFilter,
    channel: ChannelId,
}

impl Subscription {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Sequenced>,
        filter: EventFilter,
        channel: ChannelId,
    ) -> Self {
        Self {
            receiver,
            filter,
            channel,
        }
    }

    fn deliver(&self, item: Sequenced) -> Delivered {
        Delivered {
            stamp: ChannelStamp::new(self.channel, item.sequence),
            event: item.event,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Delivered> {
        loop {
            let item = self.receiver.recv().await?;

            if self.filter.matches(&item.event) {
                return Some(self.deliver(item));
            }
        }
    }

    /// Receive the next matching event, suspending at most `deadline`.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Timeout` - nothing matched before the deadline
    /// - `ChannelError::Closed` - the channel was dropped
    pub async fn receive(&mut self, deadline: Duration) -> Result<Delivered, ChannelError> {
        match tokio::time::timeout(deadline, self.recv()).await {
            Ok(Some(delivered)) => Ok(delivered),
            Ok(None) => Err(ChannelError::Closed),
            Err(_) => {
                debug!(?deadline, "Receive timed out");
                Err(ChannelError::Timeout(deadline))
            }
        }
    }

    /// Try to receive the next matching event without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was available and matched
    /// - `Ok(None)` - No event available
    /// - `Err(ChannelError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<Delivered>, ChannelError> {
        loop {
            let item = match self.receiver.try_recv() {
                Ok(item) => item,
                Err(mpsc::error::TryRecvError::Empty) => return Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => return Err(ChannelError::Closed),
            };

            if self.filter.matches(&item.event) {
                return Ok(Some(self.deliver(item)));
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel
    }
}
