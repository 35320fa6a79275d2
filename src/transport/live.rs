use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use tracing::debug;

use super::{QueueTransport, ReceiveRequest};
use crate::codec::{self, MessageBody, RawMessage};
use crate::errors::QueueFetcherError;

/// A queue on the real SQS transport, addressed by its URL.
#[derive(Debug, Clone)]
pub struct LiveQueue {
    name: String,
    queue_url: String,
    sqs_client: aws_sdk_sqs::Client,
}

impl LiveQueue {
    /// Binds to an already known queue URL.
    pub fn new(sqs_client: aws_sdk_sqs::Client, name: &str, queue_url: &str) -> Self {
        LiveQueue {
            name: name.to_string(),
            queue_url: queue_url.to_string(),
            sqs_client,
        }
    }

    /// Looks up a queue URL by name, optionally in another account.
    pub async fn resolve(
        sqs_client: aws_sdk_sqs::Client,
        name: &str,
        account: Option<&str>,
    ) -> Result<Self, QueueFetcherError> {
        let output = sqs_client
            .get_queue_url()
            .queue_name(name)
            .set_queue_owner_aws_account_id(account.map(str::to_string))
            .send()
            .await
            .map_err(|e| QueueFetcherError::QueueNotFound {
                queue: name.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let queue_url = output
            .queue_url()
            .ok_or_else(|| QueueFetcherError::QueueNotFound {
                queue: name.to_string(),
                message: "no queue URL returned".to_string(),
            })?;

        debug!(queue = %name, url = %queue_url, "Resolved queue URL");
        Ok(LiveQueue::new(sqs_client, name, queue_url))
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    fn transport_error(&self, message: String) -> QueueFetcherError {
        QueueFetcherError::Transport {
            queue: self.name.clone(),
            message,
        }
    }
}

#[async_trait]
impl QueueTransport for LiveQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<RawMessage>, QueueFetcherError> {
        let output = self
            .sqs_client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(request.max_number_of_messages)
            .wait_time_seconds(request.wait_time_seconds)
            .set_visibility_timeout(request.visibility_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .messages()
            .iter()
            .map(|message| RawMessage {
                body: MessageBody::Text(message.body().unwrap_or_default().to_string()),
                message_id: message.message_id().map(str::to_string),
                receipt_handle: message.receipt_handle().map(str::to_string),
            })
            .collect())
    }

    async fn delete(&self, message: &RawMessage) -> Result<(), QueueFetcherError> {
        let receipt_handle = message
            .receipt_handle
            .as_deref()
            .ok_or_else(|| self.transport_error("message has no receipt handle".to_string()))?;

        self.sqs_client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| self.transport_error(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn send(&self, body: MessageBody) -> Result<(), QueueFetcherError> {
        let message_body = codec::encode(&body)?;

        self.sqs_client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(&message_body)
            .send()
            .await
            .map_err(|e| QueueFetcherError::SendFailed {
                queue: self.name.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}
