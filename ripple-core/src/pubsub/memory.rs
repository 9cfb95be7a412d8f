//! In-process pub/sub backend.
//!
//! Topics map to lists of handlers in a concurrent table. Publishing
//! snapshots a topic's handlers and calls each one on the publisher's
//! thread, after the table entry is released, so a handler may publish or
//! subscribe without deadlocking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::{MessageHandler, PubSub, PubSubError, Subscription};

struct Subscriber {
    id: u64,
    handler: MessageHandler,
    active: AtomicBool,
}

#[derive(Default)]
struct Topics {
    table: DashMap<String, Vec<Arc<Subscriber>>>,
    closed: AtomicBool,
}

/// Fan-out backend living inside the process.
#[derive(Clone, Default)]
pub struct MemoryPubSub {
    topics: Arc<Topics>,
    next_id: Arc<AtomicU64>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .table
            .get(topic)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    fn ensure_open(&self) -> Result<(), PubSubError> {
        if self.topics.closed.load(Ordering::SeqCst) {
            Err(PubSubError::Closed)
        } else {
            Ok(())
        }
    }
}

impl PubSub for MemoryPubSub {
    fn publish(&self, topic: &str, data: &[u8]) -> Result<(), PubSubError> {
        self.ensure_open()?;

        let handlers: Vec<Arc<Subscriber>> = match self.topics.table.get(topic) {
            Some(subs) => subs.clone(),
            None => return Ok(()),
        };

        for sub in handlers {
            if sub.active.load(Ordering::SeqCst) {
                (sub.handler)(data);
            }
        }
        Ok(())
    }

    fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Subscription>, PubSubError> {
        self.ensure_open()?;

        let subscriber = Arc::new(Subscriber {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            handler,
            active: AtomicBool::new(true),
        });
        self.topics
            .table
            .entry(topic.to_string())
            .or_default()
            .push(Arc::clone(&subscriber));

        Ok(Arc::new(MemorySubscription {
            topic: topic.to_string(),
            subscriber,
            topics: Arc::downgrade(&self.topics),
        }))
    }

    fn close(&self) -> Result<(), PubSubError> {
        self.topics.closed.store(true, Ordering::SeqCst);
        for entry in self.topics.table.iter() {
            for sub in entry.value() {
                sub.active.store(false, Ordering::SeqCst);
            }
        }
        self.topics.table.clear();
        Ok(())
    }
}

struct MemorySubscription {
    topic: String,
    subscriber: Arc<Subscriber>,
    topics: Weak<Topics>,
}

impl Subscription for MemorySubscription {
    fn unsubscribe(&self) -> Result<(), PubSubError> {
        if !self.subscriber.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(topics) = self.topics.upgrade() {
            let id = self.subscriber.id;
            topics
                .table
                .remove_if_mut(&self.topic, |_, subs| {
                    subs.retain(|s| s.id != id);
                    subs.is_empty()
                });
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<Vec<u8>>>>, MessageHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: MessageHandler = Arc::new(move |data: &[u8]| sink.lock().push(data.to_vec()));
        (seen, handler)
    }

    #[test]
    fn publish_reaches_every_subscriber() {
        let ps = MemoryPubSub::new();
        let (a, ha) = recorder();
        let (b, hb) = recorder();

        let _sa = ps.subscribe("room", ha).unwrap();
        let _sb = ps.subscribe("room", hb).unwrap();
        ps.publish("room", b"hello").unwrap();

        assert_eq!(a.lock().as_slice(), &[b"hello".to_vec()]);
        assert_eq!(b.lock().as_slice(), &[b"hello".to_vec()]);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_idempotent() {
        let ps = MemoryPubSub::new();
        let (seen, handler) = recorder();

        let sub = ps.subscribe("t", handler).unwrap();
        sub.unsubscribe().unwrap();
        sub.unsubscribe().unwrap();

        ps.publish("t", b"ignored").unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(ps.subscriber_count("t"), 0);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let ps = MemoryPubSub::new();
        let (seen, handler) = recorder();
        let _echo_sink = ps.subscribe("echo", handler).unwrap();

        let inner = ps.clone();
        let _forward = ps
            .subscribe(
                "in",
                Arc::new(move |data: &[u8]| {
                    inner.publish("echo", data).unwrap();
                }),
            )
            .unwrap();

        ps.publish("in", b"x").unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn closed_backend_rejects_use() {
        let ps = MemoryPubSub::new();
        ps.close().unwrap();

        assert_eq!(ps.publish("t", b"x"), Err(PubSubError::Closed));
        assert!(matches!(
            ps.subscribe("t", Arc::new(|_: &[u8]| {})),
            Err(PubSubError::Closed)
        ));
    }
}
