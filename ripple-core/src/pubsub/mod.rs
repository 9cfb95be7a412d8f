//! Publish / Subscribe
//!
//! Sessions can talk to each other through topics. The engine only
//! consumes the contract defined here; delivery mechanics belong to the
//! backend.
//!
//! # Concepts
//!
//! ## Backend
//!
//! A [`PubSub`] implementation moves bytes from publishers to every active
//! subscriber of a topic. [`MemoryPubSub`] is an in-process backend; a
//! message broker can be plugged in through the same trait.
//!
//! ## Bridge
//!
//! Sessions publish and subscribe through the bridge in `bridge.rs`. Every
//! subscription a session creates is tracked by that session and
//! force-unsubscribed when it is disposed, so no subscription outlives its
//! owner.
//!
//! ## Typed messages
//!
//! [`publish_typed`] and [`subscribe_typed`] encode and decode messages with
//! a [`Codec`]. A payload that does not decode into the expected shape is a
//! foreign message and is dropped silently.

mod bridge;
mod memory;

pub use bridge::{publish_typed, subscribe_typed, SubscriptionHandle};
pub use memory::MemoryPubSub;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Pub/sub failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PubSubError {
    #[error("pubsub not configured")]
    NotConfigured,

    #[error("pubsub backend closed")]
    Closed,

    #[error("pubsub backend error: {0}")]
    Backend(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Callback invoked with each message's payload.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// A publish/subscribe backend.
pub trait PubSub: Send + Sync {
    /// Deliver `data` to every active subscriber of `topic`.
    fn publish(&self, topic: &str, data: &[u8]) -> Result<(), PubSubError>;

    /// Register `handler` for messages on `topic`.
    fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Subscription>, PubSubError>;

    /// Shut the backend down.
    fn close(&self) -> Result<(), PubSubError>;
}

/// An active subscription.
pub trait Subscription: Send + Sync {
    /// Stop delivery. Calling this more than once is harmless.
    fn unsubscribe(&self) -> Result<(), PubSubError>;
}

/// Wire encoding for typed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Json,
    MessagePack,
}

impl Codec {
    pub fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, PubSubError> {
        match self {
            Self::Json => serde_json::to_vec(msg).map_err(|e| PubSubError::Encode(e.to_string())),
            Self::MessagePack => {
                rmp_serde::to_vec_named(msg).map_err(|e| PubSubError::Encode(e.to_string()))
            }
        }
    }

    /// Decode a payload, or `None` if it does not have the expected shape.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Option<T> {
        match self {
            Self::Json => serde_json::from_slice(data).ok(),
            Self::MessagePack => rmp_serde::from_slice(data).ok(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Event {
        name: String,
        count: i32,
    }

    #[test]
    fn codecs_decode_what_they_encode() {
        let event = Event { name: "click".into(), count: 42 };
        for codec in [Codec::Json, Codec::MessagePack] {
            let bytes = codec.encode(&event).unwrap();
            assert_eq!(codec.decode::<Event>(&bytes), Some(Event { name: "click".into(), count: 42 }));
        }
    }

    #[test]
    fn foreign_payloads_decode_to_none() {
        assert_eq!(Codec::Json.decode::<Event>(b"not json"), None);
        assert_eq!(Codec::MessagePack.decode::<Event>(b"\xc1"), None);
    }
}
