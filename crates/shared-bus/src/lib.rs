//! # Shared Bus - The Single Channel
//!
//! All traffic between producers, the gateway and Core passes through one
//! [`ChannelGateway`]. The replay cache lives here too, since it is the only
//! other piece of shared mutable state.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐  subscribe()  ┌──────────────┐
//! │  Producers   │ ────────────→ │   Channel    │ ────────────→ │  Core / Gate │
//! └──────────────┘               └──────────────┘               └──────────────┘
//! ```
//!
//! ## Security
//!
//! - **Structural exclusivity:** decisions reach the gate only with a
//!   [`ChannelStamp`] minted by the wired channel.
//! - **Transport vs integrity:** the channel delivers at least once;
//!   duplicates are filtered by the [`ReplayCache`], not here.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod replay_cache;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, GatewayEvent, WireEvent};
pub use publisher::{ChannelGateway, InMemoryChannel};
pub use replay_cache::{ReplayCache, ReplayError};
pub use subscriber::{ChannelError, ChannelId, ChannelStamp, Delivered, Subscription};

/// Events buffered per subscriber before publishers wait for it.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
