//! # Queue Fetcher
//!
//! An asynchronous AWS SQS consumer framework: a fetcher long-polls a queue,
//! decodes each message as JSON and routes it on its `message_type` to a
//! handler registered by the consuming task.
//!
//! ## Features
//!
//! - Long polling in batches of up to 10 messages, with an optional
//!   visibility timeout override per task
//! - Type-tagged dispatch with recursive handling of message lists
//! - Per-message scoped transactions: a message is deleted only after its
//!   processing committed, otherwise it stays queued for redelivery
//! - Queues addressed by name or ARN, resolved through a naming table
//! - An in-memory mock transport with an outbox for offline runs and tests
//!
//! ## Quick Start
//!
//! ```rust
//! use queue_fetcher::binding::SqsContext;
//! use queue_fetcher::fetcher::QueueFetcher;
//! use queue_fetcher::router::{HandlerResult, HandlerTable, QueueTask};
//! use queue_fetcher::settings::Settings;
//! use serde_json::{Value, json};
//!
//! struct SampleQueueTask;
//!
//! impl SampleQueueTask {
//!     async fn process_sample(&self, msg: &Value) -> HandlerResult {
//!         println!("Processing message: {}", msg["test"]);
//!         Ok(())
//!     }
//! }
//!
//! impl QueueTask for SampleQueueTask {
//!     fn queue(&self) -> Option<&str> {
//!         Some("test")
//!     }
//!
//!     fn register(handlers: &mut HandlerTable<Self>) {
//!         handlers.on("sample", |task, msg| Box::pin(task.process_sample(msg)));
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = SqsContext::new(Settings::offline([("test", "test")]));
//!     context
//!         .mock_queue("test")
//!         .add_message(json!({"message_type": "sample", "test": "hi"}));
//!
//!     let mut fetcher = QueueFetcher::new(SampleQueueTask, context);
//!     let summary = fetcher.run_once().await?;
//!     assert_eq!(summary.deleted, 1);
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod client;
pub mod codec;
pub mod errors;
pub mod fetcher;
pub mod router;
pub mod settings;
pub mod transport;
