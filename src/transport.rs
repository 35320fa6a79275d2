use async_trait::async_trait;

use crate::codec::{MessageBody, RawMessage};
use crate::errors::QueueFetcherError;

pub mod live;
pub mod mock;

use live::LiveQueue;
use mock::MockQueue;

/// Parameters of one receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Maximum number of messages to receive, never more than 10.
    pub max_number_of_messages: i32,

    /// Long-poll wait, in seconds.
    pub wait_time_seconds: i32,

    /// Overrides the queue's visibility timeout for the received messages.
    pub visibility_timeout: Option<i32>,
}

/// The capability set a queue exposes to the fetcher.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Bare queue name.
    fn name(&self) -> &str;

    /// Receives up to `request.max_number_of_messages` messages.
    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<RawMessage>, QueueFetcherError>;

    /// Removes a successfully processed message from the queue.
    async fn delete(&self, message: &RawMessage) -> Result<(), QueueFetcherError>;

    /// Puts a message body on the queue.
    async fn send(&self, body: MessageBody) -> Result<(), QueueFetcherError>;
}

/// A queue bound to either the live transport or the in-memory mock.
#[derive(Debug, Clone)]
pub enum QueueHandle {
    Live(LiveQueue),
    Mock(MockQueue),
}

impl QueueHandle {
    pub fn is_mock(&self) -> bool {
        matches!(self, QueueHandle::Mock(_))
    }

    pub fn as_mock(&self) -> Option<&MockQueue> {
        match self {
            QueueHandle::Mock(queue) => Some(queue),
            QueueHandle::Live(_) => None,
        }
    }
}

#[async_trait]
impl QueueTransport for QueueHandle {
    fn name(&self) -> &str {
        match self {
            QueueHandle::Live(queue) => queue.name(),
            QueueHandle::Mock(queue) => queue.name(),
        }
    }

    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<RawMessage>, QueueFetcherError> {
        match self {
            QueueHandle::Live(queue) => queue.receive_batch(request).await,
            QueueHandle::Mock(queue) => queue.receive_batch(request).await,
        }
    }

    async fn delete(&self, message: &RawMessage) -> Result<(), QueueFetcherError> {
        match self {
            QueueHandle::Live(queue) => queue.delete(message).await,
            QueueHandle::Mock(queue) => queue.delete(message).await,
        }
    }

    async fn send(&self, body: MessageBody) -> Result<(), QueueFetcherError> {
        match self {
            QueueHandle::Live(queue) => queue.send(body).await,
            QueueHandle::Mock(queue) => queue.send(body).await,
        }
    }
}
