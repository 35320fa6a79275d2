use std::future::Future;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::binding::SqsContext;
use crate::codec::{self, MessageBody, RawMessage};
use crate::errors::QueueFetcherError;
use crate::router::{HandlerTable, QueueTask};
use crate::transport::{QueueHandle, QueueTransport};

pub mod config;
pub mod transaction;

use config::FetcherConfig;
use transaction::{NoTransactions, TransactionManager, with_transaction};

/// Lifecycle of a [`QueueFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherState {
    /// The task's queue has not been resolved yet.
    Uninitialized,
    /// A queue handle is bound; no cycle is running.
    Bound,
    /// Inside the receive loop.
    Polling,
    /// A bounded run finished or a shutdown was requested.
    Stopped,
    /// Binding failed, or a single cycle hit an error that is not a message
    /// processing failure.
    Fatal,
}

/// What one receive cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub received: usize,
    pub deleted: usize,
    /// Messages left on the queue for redelivery.
    pub retained: usize,
}

/// Polls the queue of a [`QueueTask`] and dispatches every message to the
/// task's handlers.
///
/// Each message is decoded and processed inside its own transaction. A
/// message is deleted only after its transaction commits; when processing
/// fails the transaction is rolled back and the message stays on the queue
/// until its visibility timeout expires.
///
/// # Example
///
/// ```rust,no_run
/// use queue_fetcher::binding::SqsContext;
/// use queue_fetcher::fetcher::QueueFetcher;
/// use queue_fetcher::router::{HandlerTable, QueueTask};
/// use queue_fetcher::settings::Settings;
///
/// struct AuditTask;
///
/// impl QueueTask for AuditTask {
///     fn queue(&self) -> Option<&str> {
///         Some("audit")
///     }
///
///     fn register(handlers: &mut HandlerTable<Self>) {
///         handlers.on_sync("login", |_, msg| {
///             println!("login by {}", msg["user"]);
///             Ok(())
///         });
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let context = SqsContext::new(Settings::from_env()?);
///     QueueFetcher::new(AuditTask, context).run().await?;
///     Ok(())
/// }
/// ```
pub struct QueueFetcher<T: QueueTask, M: TransactionManager = NoTransactions> {
    task: T,
    handlers: HandlerTable<T>,
    context: SqsContext,
    transactions: M,
    config: FetcherConfig,
    queue: Option<QueueHandle>,
    state: FetcherState,
}

impl<T: QueueTask> QueueFetcher<T> {
    pub fn new(task: T, context: SqsContext) -> Self {
        QueueFetcher {
            task,
            handlers: HandlerTable::for_task(),
            context,
            transactions: NoTransactions,
            config: FetcherConfig::default(),
            queue: None,
            state: FetcherState::Uninitialized,
        }
    }
}

impl<T: QueueTask, M: TransactionManager> QueueFetcher<T, M> {
    /// Processes messages inside transactions opened by `transactions`.
    pub fn with_transactions<N: TransactionManager>(self, transactions: N) -> QueueFetcher<T, N> {
        QueueFetcher {
            task: self.task,
            handlers: self.handlers,
            context: self.context,
            transactions,
            config: self.config,
            queue: self.queue,
            state: self.state,
        }
    }

    pub fn with_config(mut self, config: FetcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn state(&self) -> FetcherState {
        self.state
    }

    /// The bound queue, once [`run`](Self::run) or [`run_once`](Self::run_once) has started.
    pub fn queue(&self) -> Option<&QueueHandle> {
        self.queue.as_ref()
    }

    /// Polls the queue forever.
    ///
    /// Only returns when the queue cannot be bound. Failed receives and
    /// handler failures that are not message processing errors are logged,
    /// and polling carries on with the next cycle.
    pub async fn run(&mut self) -> Result<(), QueueFetcherError> {
        self.run_until(std::future::pending()).await
    }

    /// Polls the queue until `shutdown` completes.
    ///
    /// Shutdown is checked while waiting for messages, so a batch that has
    /// already been received is always processed to the end.
    pub async fn run_until<S>(&mut self, shutdown: S) -> Result<(), QueueFetcherError>
    where
        S: Future<Output = ()>,
    {
        let queue = self.bind().await?;
        let request = self.config.receive_request(self.task.visibility_timeout());
        self.state = FetcherState::Polling;
        tokio::pin!(shutdown);

        loop {
            let received = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!(queue = %queue.name(), "Shutdown requested, stopping");
                    self.state = FetcherState::Stopped;
                    return Ok(());
                }
                received = queue.receive_batch(&request) => received,
            };

            match received {
                Ok(messages) => {
                    // Already logged per message; the failed ones stay queued.
                    let _ = self.handle_batch(&queue, messages).await;
                }
                Err(e) => {
                    error!(queue = %queue.name(), error = %e, "Error receiving messages");
                }
            }
        }
    }

    /// Runs exactly one receive cycle.
    ///
    /// Every received message is handled even when an earlier one fails. If
    /// a handler failed with an error that is not a message processing error,
    /// or a transaction could not be committed, the first such error is
    /// returned once the batch is done and the fetcher is left `Fatal`.
    pub async fn run_once(&mut self) -> Result<CycleSummary, QueueFetcherError> {
        let queue = self.bind().await?;
        let request = self.config.receive_request(self.task.visibility_timeout());
        self.state = FetcherState::Polling;

        let result = match queue.receive_batch(&request).await {
            Ok(messages) => self.handle_batch(&queue, messages).await,
            Err(e) => Err(e),
        };

        self.state = if result.is_ok() {
            FetcherState::Stopped
        } else {
            FetcherState::Fatal
        };
        result
    }

    /// Decodes and processes one raw message body inside a transaction.
    ///
    /// Returns `Ok(true)` when the message may be deleted and `Ok(false)` when
    /// it could not be decoded or processed (logged, transaction rolled
    /// back). Any other error is returned.
    pub async fn read(&self, body: &MessageBody) -> Result<bool, QueueFetcherError> {
        let result = with_transaction(&self.transactions, || async {
            let message = codec::decode(body)?;
            self.process(&message).await
        })
        .await;

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_message_failure() => {
                error!(error = %e, "Message could not be processed");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Dispatches an already decoded message, bypassing the queue.
    pub async fn process(&self, message: &Value) -> Result<(), QueueFetcherError> {
        self.handlers.dispatch(&self.task, message).await
    }

    async fn bind(&mut self) -> Result<QueueHandle, QueueFetcherError> {
        match self.resolve_queue().await {
            Ok(queue) => {
                info!(queue = %queue.name(), "Polling {} for messages", queue.name());
                self.queue = Some(queue.clone());
                self.state = FetcherState::Bound;
                Ok(queue)
            }
            Err(e) => {
                error!(error = %e, "Could not bind queue fetcher");
                self.state = FetcherState::Fatal;
                Err(e)
            }
        }
    }

    async fn resolve_queue(&self) -> Result<QueueHandle, QueueFetcherError> {
        let key = self.task.queue().ok_or_else(|| {
            QueueFetcherError::Configuration("QueueFetcher.queue is not set".to_string())
        })?;
        let name = self.context.settings().queue_name(key)?;

        self.context
            .get_queue(name, Some(self.task.region()), None, true)
            .await?
            .ok_or_else(|| QueueFetcherError::QueueNotFound {
                queue: name.to_string(),
                message: "no queue returned".to_string(),
            })
    }

    async fn handle_batch(
        &self,
        queue: &QueueHandle,
        messages: Vec<RawMessage>,
    ) -> Result<CycleSummary, QueueFetcherError> {
        let mut summary = CycleSummary {
            received: messages.len(),
            ..CycleSummary::default()
        };

        if messages.is_empty() {
            debug!(queue = %queue.name(), "No messages received");
            return Ok(summary);
        }

        info!(queue = %queue.name(), count = messages.len(), "Received messages");

        let mut first_error = None;

        for message in &messages {
            match self.read(&message.body).await {
                Ok(true) => {}
                Ok(false) => {
                    summary.retained += 1;
                    continue;
                }
                Err(e) => {
                    error!(queue = %queue.name(), error = %e, "Error handling message");
                    summary.retained += 1;
                    first_error.get_or_insert(e);
                    continue;
                }
            }

            match queue.delete(message).await {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    error!(queue = %queue.name(), error = %e, "Error deleting message");
                    summary.retained += 1;
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
