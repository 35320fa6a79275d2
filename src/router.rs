use std::collections::HashMap;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use crate::errors::{BoxError, MessageProcessingError, QueueFetcherError};
use crate::settings::DEFAULT_REGION;

/// Result returned by a message handler.
pub type HandlerResult = Result<(), BoxError>;

type Handler<T> =
    Box<dyn for<'a> Fn(&'a T, &'a Value) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// A queue consumer: names its queue and registers one handler per message type.
///
/// # Example
///
/// ```rust
/// use queue_fetcher::router::{HandlerResult, HandlerTable, QueueTask};
/// use serde_json::Value;
///
/// struct SampleQueueTask;
///
/// impl SampleQueueTask {
///     async fn process_sample(&self, msg: &Value) -> HandlerResult {
///         println!("sample: {}", msg["test"]);
///         Ok(())
///     }
/// }
///
/// impl QueueTask for SampleQueueTask {
///     fn queue(&self) -> Option<&str> {
///         Some("test")
///     }
///
///     fn register(handlers: &mut HandlerTable<Self>) {
///         handlers.on("sample", |task, msg| Box::pin(task.process_sample(msg)));
///     }
/// }
/// ```
pub trait QueueTask: Send + Sync + Sized + 'static {
    /// Logical queue identifier, looked up in the queue naming table.
    fn queue(&self) -> Option<&str>;

    fn region(&self) -> &str {
        DEFAULT_REGION
    }

    /// Visibility timeout (seconds) passed through to every receive call.
    fn visibility_timeout(&self) -> Option<i32> {
        None
    }

    /// Registers the `message_type` handlers of this task type.
    fn register(handlers: &mut HandlerTable<Self>);
}

/// Maps a `message_type` tag to the handler that processes it.
pub struct HandlerTable<T> {
    handlers: HashMap<String, Handler<T>>,
}

impl<T> Default for HandlerTable<T> {
    fn default() -> Self {
        HandlerTable {
            handlers: HashMap::new(),
        }
    }
}

impl<T: QueueTask> HandlerTable<T> {
    /// Builds the table for a task type from its [`QueueTask::register`].
    pub fn for_task() -> Self {
        let mut table = HandlerTable::default();
        T::register(&mut table);
        table
    }
}

impl<T> HandlerTable<T> {
    /// Registers an async handler for `message_type`, replacing any previous one.
    pub fn on<F>(&mut self, message_type: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a T, &'a Value) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.handlers
            .insert(message_type.to_string(), Box::new(handler));
        self
    }

    /// Registers a handler that completes without awaiting anything.
    pub fn on_sync<F>(&mut self, message_type: &str, handler: F) -> &mut Self
    where
        F: Fn(&T, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(message_type, move |task, msg| {
            let result = handler(task, msg);
            Box::pin(async move { result })
        })
    }

    pub fn handles(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Processes a decoded message.
    ///
    /// Sequences are processed element by element, left to right, stopping at
    /// the first failure. Mappings are routed on their `message_type`.
    pub fn dispatch<'a>(
        &'a self,
        task: &'a T,
        message: &'a Value,
    ) -> BoxFuture<'a, Result<(), QueueFetcherError>>
    where
        T: Sync,
    {
        async move {
            match message {
                Value::Array(items) => {
                    for item in items {
                        self.dispatch(task, item).await?;
                    }
                    Ok(())
                }
                _ => self.dispatch_one(task, message).await,
            }
        }
        .boxed()
    }

    async fn dispatch_one(&self, task: &T, message: &Value) -> Result<(), QueueFetcherError> {
        let Some(message_type) = message.get("message_type").and_then(Value::as_str) else {
            warn!(message = %message, "Message did not have a message_type");
            return Err(MessageProcessingError::MissingMessageType(message.to_string()).into());
        };

        let Some(handler) = self.handlers.get(message_type) else {
            warn!(
                message_type,
                "Message type {} not handled. You may need to register process_{}.",
                message_type,
                message_type
            );
            return Err(MessageProcessingError::UnhandledType(message_type.to_string()).into());
        };

        handler(task, message).await.map_err(|source| {
            match source.downcast::<MessageProcessingError>() {
                Ok(processing) => QueueFetcherError::Processing(*processing),
                Err(source) => QueueFetcherError::Handler {
                    message_type: message_type.to_string(),
                    source,
                },
            }
        })
    }
}
