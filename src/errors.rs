use thiserror::Error;

/// Boxed error returned by message handlers and transaction managers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for queue fetcher operations.
///
/// Configuration errors are raised before any network activity and are never
/// retried. Decode and processing errors only fail the message they belong to;
/// the poll loop logs them and moves on to the next message in the batch.
#[derive(Debug, Error)]
pub enum QueueFetcherError {
    /// The fetcher or transport binding is missing required settings.
    #[error("improperly configured: {0}")]
    Configuration(String),

    /// A named or ARN-addressed queue could not be found on the transport.
    #[error("error getting queue for {queue}: {message}")]
    QueueNotFound { queue: String, message: String },

    /// A message could not be sent over a live queue.
    #[error("could not send message over queue {queue}: {message}")]
    SendFailed { queue: String, message: String },

    /// Receiving from or deleting on the transport failed.
    #[error("transport error on queue {queue}: {message}")]
    Transport { queue: String, message: String },

    /// Beginning or committing a scoped transaction failed.
    #[error("transaction failed: {0}")]
    Transaction(#[source] BoxError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Processing(#[from] MessageProcessingError),

    /// A handler failed with an error that is not a [`MessageProcessingError`].
    ///
    /// The message is kept on the queue. The rest of the batch is still
    /// handled, then the error is returned from the cycle.
    #[error("handler for message type {message_type} failed: {source}")]
    Handler {
        message_type: String,
        #[source]
        source: BoxError,
    },
}

impl QueueFetcherError {
    /// Returns `true` for errors that only fail the current message.
    pub fn is_message_failure(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Processing(_))
    }
}

/// A raw queue payload could not be turned into a message value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("message body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message must be a mapping or a sequence of mappings, got {0}")]
    NotAMessage(&'static str),
}

/// A message could not be processed.
///
/// Handlers return this (boxed) to reject a message without failing the
/// cycle: the transaction is rolled back and the message stays queued.
#[derive(Debug, Error)]
pub enum MessageProcessingError {
    #[error("Message did not have a message_type {0}")]
    MissingMessageType(String),

    #[error("Message type {0} not handled")]
    UnhandledType(String),

    #[error("{0}")]
    Rejected(String),
}

impl MessageProcessingError {
    /// Creates a rejection with the provided reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        MessageProcessingError::Rejected(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_failures_are_distinguished_from_fatal_errors() {
        let missing = QueueFetcherError::from(MessageProcessingError::MissingMessageType(
            "{}".to_string(),
        ));
        assert!(missing.is_message_failure());

        let decode = QueueFetcherError::from(DecodeError::NotAMessage("a number"));
        assert!(decode.is_message_failure());

        let handler = QueueFetcherError::Handler {
            message_type: "sample".to_string(),
            source: "boom".into(),
        };
        assert!(!handler.is_message_failure());

        let config = QueueFetcherError::Configuration("queue is not set".to_string());
        assert!(!config.is_message_failure());
    }

    #[test]
    fn processing_errors_name_the_type() {
        let err = MessageProcessingError::UnhandledType("nonsample".to_string());
        assert_eq!(err.to_string(), "Message type nonsample not handled");
    }
}
