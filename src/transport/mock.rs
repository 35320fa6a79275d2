//! In-memory stand-in for SQS.
//!
//! Mock queues and the outbox live in a [`MockRegistry`] owned by an
//! [`SqsContext`](crate::binding::SqsContext), so every context is isolated.
//! Nothing is cleared automatically: call
//! [`SqsContext::reset`](crate::binding::SqsContext::reset) between test
//! scenarios that share a context.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

use super::{QueueTransport, ReceiveRequest};
use crate::codec::{self, MessageBody, RawMessage};
use crate::errors::QueueFetcherError;

/// Messages "sent" while offline, keyed by queue name.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    messages: Arc<DashMap<String, Vec<Value>>>,
}

impl Outbox {
    /// Messages sent to `queue`, oldest first.
    pub fn get(&self, queue: &str) -> Vec<Value> {
        self.messages
            .get(queue)
            .map(|messages| messages.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.messages.get(queue).map_or(0, |messages| messages.len())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.iter().all(|entry| entry.value().is_empty())
    }

    pub fn clear(&self) {
        self.messages.clear();
    }

    fn push(&self, queue: &str, message: Value) {
        self.messages
            .entry(queue.to_string())
            .or_default()
            .push(message);
    }
}

#[derive(Debug, Default)]
struct MockState {
    inbox: Vec<RawMessage>,
    deleted: Vec<RawMessage>,
    last_request: Option<ReceiveRequest>,
}

/// A named in-memory queue.
///
/// Clones share the same inbox, so a fixture can add messages to a queue
/// before the fetcher under test binds to it.
#[derive(Debug, Clone)]
pub struct MockQueue {
    name: Arc<str>,
    state: Arc<Mutex<MockState>>,
    outbox: Outbox,
}

impl MockQueue {
    fn new(name: &str, outbox: Outbox) -> Self {
        MockQueue {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(MockState::default())),
            outbox,
        }
    }

    /// Buffers a message for the next receive.
    pub fn add_message(&self, body: impl Into<MessageBody>) {
        self.state.lock().inbox.push(RawMessage::new(body));
    }

    /// Number of messages waiting in the inbox.
    pub fn pending(&self) -> usize {
        self.state.lock().inbox.len()
    }

    /// Messages deleted after successful processing, in deletion order.
    pub fn deleted(&self) -> Vec<RawMessage> {
        self.state.lock().deleted.clone()
    }

    /// The arguments of the most recent receive call.
    pub fn last_request(&self) -> Option<ReceiveRequest> {
        self.state.lock().last_request
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.inbox.clear();
        state.deleted.clear();
        state.last_request = None;
    }
}

#[async_trait]
impl QueueTransport for MockQueue {
    fn name(&self) -> &str {
        &self.name
    }

    /// Takes up to `max_number_of_messages` from the front of the inbox. The
    /// wait and visibility settings are only recorded.
    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<RawMessage>, QueueFetcherError> {
        let batch = {
            let mut state = self.state.lock();
            state.last_request = Some(*request);
            let count = usize::try_from(request.max_number_of_messages)
                .unwrap_or(0)
                .min(state.inbox.len());
            state.inbox.drain(..count).collect::<Vec<_>>()
        };

        // An empty receive returns at once, so give other tasks a turn.
        if batch.is_empty() {
            tokio::task::yield_now().await;
        }
        Ok(batch)
    }

    async fn delete(&self, message: &RawMessage) -> Result<(), QueueFetcherError> {
        self.state.lock().deleted.push(message.clone());
        Ok(())
    }

    async fn send(&self, body: MessageBody) -> Result<(), QueueFetcherError> {
        let message = codec::decode(&body)?;
        info!(queue = %self.name, message = %message, "New message on queue");
        self.outbox.push(&self.name, message);
        Ok(())
    }
}

/// Process-local registry of mock queues plus their shared outbox.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    queues: Arc<DashMap<String, MockQueue>>,
    outbox: Outbox,
}

impl MockRegistry {
    /// Returns the queue called `name`, creating it on first use.
    pub fn queue(&self, name: &str) -> MockQueue {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| MockQueue::new(name, self.outbox.clone()))
            .value()
            .clone()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Empties the outbox and every mock inbox.
    pub fn reset(&self) {
        self.outbox.clear();
        for queue in self.queues.iter() {
            queue.value().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ReceiveRequest {
        ReceiveRequest {
            max_number_of_messages: 10,
            wait_time_seconds: 20,
            visibility_timeout: None,
        }
    }

    #[tokio::test]
    async fn same_name_yields_the_same_queue() {
        let registry = MockRegistry::default();
        registry.queue("test").add_message(json!({"message_type": "sample"}));

        let queue = registry.queue("test");
        assert_eq!(queue.pending(), 1);

        let batch = queue.receive_batch(&request()).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(registry.queue("test").pending(), 0);
        assert!(queue.receive_batch(&request()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn receive_takes_at_most_the_requested_count() {
        let queue = MockRegistry::default().queue("test");
        for n in 0..11 {
            queue.add_message(json!({"message_type": "sample", "n": n}));
        }

        let first = queue.receive_batch(&request()).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(queue.pending(), 1);
        assert_eq!(
            first[0].body,
            MessageBody::from(json!({"message_type": "sample", "n": 0}))
        );

        let second = queue.receive_batch(&request()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(
            second[0].body,
            MessageBody::from(json!({"message_type": "sample", "n": 10}))
        );
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn send_stores_decoded_values() {
        let registry = MockRegistry::default();
        let queue = registry.queue("test");

        queue
            .send(MessageBody::from(r#"{"message_type":"demo"}"#))
            .await
            .unwrap();
        queue
            .send(MessageBody::from(br#"[{"message_type":"demo"}]"#.to_vec()))
            .await
            .unwrap();

        assert_eq!(
            registry.outbox().get("test"),
            vec![json!({"message_type": "demo"}), json!([{"message_type": "demo"}])]
        );
        assert!(matches!(
            queue.send(MessageBody::from("not json")).await,
            Err(QueueFetcherError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn reset_clears_inboxes_and_outbox() {
        let registry = MockRegistry::default();
        let queue = registry.queue("test");
        queue.add_message("{}");
        queue.send(MessageBody::from(json!({"a": 1}))).await.unwrap();

        registry.reset();

        assert_eq!(queue.pending(), 0);
        assert!(registry.outbox().is_empty());
        assert_eq!(registry.outbox().len("test"), 0);
    }

    #[test]
    fn registries_are_isolated() {
        let first = MockRegistry::default();
        let second = MockRegistry::default();
        first.queue("test").add_message("{}");
        assert_eq!(second.queue("test").pending(), 0);
    }
}
