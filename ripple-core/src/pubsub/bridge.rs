//! Session side of pub/sub.
//!
//! Handlers receive the subscribing session as an argument and hold only a
//! weak reference to it, so a backend never keeps a session alive. Every
//! subscription is recorded on the page and detached on disposal.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::panic_message;
use crate::session::{PageState, Session};

use super::{Codec, MessageHandler, PubSubError, Subscription};

/// A session-owned subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<dyn Subscription>,
    page: Weak<PageState>,
}

impl SubscriptionHandle {
    /// Stop delivery to this subscription only. The page stops tracking it.
    pub fn unsubscribe(&self) -> Result<(), PubSubError> {
        if let Some(page) = self.page.upgrade() {
            page.subscriptions
                .lock()
                .retain(|tracked| !same_subscription(tracked, &self.inner));
        }
        self.inner.unsubscribe()
    }
}

fn same_subscription(a: &Arc<dyn Subscription>, b: &Arc<dyn Subscription>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl Session {
    /// Publish raw bytes on `topic`.
    ///
    /// During a dry construction pass this succeeds without publishing.
    pub fn publish(&self, topic: &str, data: &[u8]) -> Result<(), PubSubError> {
        if self.is_dry() {
            return Ok(());
        }
        let backend = self
            .page()
            .runtime
            .pubsub()
            .ok_or(PubSubError::NotConfigured)?;
        backend.publish(topic, data)
    }

    /// Subscribe to `topic` for the lifetime of this session.
    ///
    /// Returns `Ok(None)` during a dry construction pass.
    pub fn subscribe<F>(
        &self,
        topic: &str,
        handler: F,
    ) -> Result<Option<SubscriptionHandle>, PubSubError>
    where
        F: Fn(&Session, &[u8]) + Send + Sync + 'static,
    {
        if self.is_dry() {
            return Ok(None);
        }
        let backend = self
            .page()
            .runtime
            .pubsub()
            .ok_or(PubSubError::NotConfigured)?;
        if self.is_disposed() {
            return Err(PubSubError::Closed);
        }

        let owner = Arc::downgrade(&self.0);
        let topic_name = topic.to_string();
        let deliver: MessageHandler = Arc::new(move |data: &[u8]| {
            let Some(node) = owner.upgrade() else {
                return;
            };
            let session = Session(node);
            if session.is_disposed() {
                return;
            }
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&session, data))) {
                tracing::error!(
                    session = %session.id(),
                    topic = %topic_name,
                    panic = %panic_message(payload.as_ref()),
                    "subscription handler panicked"
                );
            }
        });

        let subscription = backend.subscribe(topic, deliver)?;
        self.page()
            .subscriptions
            .lock()
            .push(Arc::clone(&subscription));

        // Disposal may have drained the list before the push above.
        if self.is_disposed() {
            subscription.unsubscribe()?;
        }

        tracing::debug!(session = %self.id(), topic, "subscribed");
        Ok(Some(SubscriptionHandle {
            inner: subscription,
            page: Arc::downgrade(&self.0.page),
        }))
    }
}

/// Encode `msg` with `codec` and publish it.
pub fn publish_typed<T: Serialize>(
    session: &Session,
    topic: &str,
    msg: &T,
    codec: Codec,
) -> Result<(), PubSubError> {
    let data = codec.encode(msg)?;
    session.publish(topic, &data)
}

/// Subscribe with messages decoded as `T`. Payloads that do not decode are
/// dropped.
pub fn subscribe_typed<T, F>(
    session: &Session,
    topic: &str,
    codec: Codec,
    handler: F,
) -> Result<Option<SubscriptionHandle>, PubSubError>
where
    T: DeserializeOwned + 'static,
    F: Fn(&Session, T) + Send + Sync + 'static,
{
    session.subscribe(topic, move |session, data| match codec.decode::<T>(data) {
        Some(msg) => handler(session, msg),
        None => tracing::trace!(session = %session.id(), "dropping undecodable message"),
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
