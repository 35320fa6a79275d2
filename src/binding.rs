//! Resolves queue names and ARNs to live or mock queue handles.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::client;
use crate::codec::MessageBody;
use crate::errors::QueueFetcherError;
use crate::settings::Settings;
use crate::transport::live::LiveQueue;
use crate::transport::mock::{MockQueue, MockRegistry, Outbox};
use crate::transport::{QueueHandle, QueueTransport};

const ARN_PREFIX: &str = "arn:aws:sqs:";

/// A queue named by plain name or ARN, with the region and owning account
/// it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub name: String,
    pub arn: Option<String>,
    pub region: String,
    pub account: Option<String>,
}

impl QueueDescriptor {
    /// Builds a descriptor. An ARN overrides `region` and `account`.
    pub fn parse(
        name: &str,
        region: &str,
        account: Option<&str>,
    ) -> Result<Self, QueueFetcherError> {
        if !is_arn(name) {
            return Ok(QueueDescriptor {
                name: name.to_string(),
                arn: None,
                region: region.to_string(),
                account: account.map(str::to_string),
            });
        }

        match name[ARN_PREFIX.len()..].split(':').collect::<Vec<_>>()[..] {
            [region, account, queue]
                if !region.is_empty() && !account.is_empty() && !queue.is_empty() =>
            {
                Ok(QueueDescriptor {
                    name: queue.to_string(),
                    arn: Some(name.to_string()),
                    region: region.to_string(),
                    account: Some(account.to_string()),
                })
            }
            _ => Err(QueueFetcherError::Configuration(format!(
                "{name} is not a valid SQS queue ARN"
            ))),
        }
    }
}

/// Returns whether `name` is an SQS ARN.
pub fn is_arn(name: &str) -> bool {
    name.starts_with(ARN_PREFIX)
}

/// Everything needed to bind and talk to queues: settings, the mock
/// registry used in offline mode and the SQS clients built so far, one per
/// region.
///
/// Cheap to clone; clones share the same mock queues, outbox and clients.
#[derive(Debug, Clone)]
pub struct SqsContext {
    settings: Arc<Settings>,
    mocks: MockRegistry,
    clients: Arc<DashMap<String, aws_sdk_sqs::Client>>,
}

impl SqsContext {
    pub fn new(settings: Settings) -> Self {
        SqsContext {
            settings: Arc::new(settings),
            mocks: MockRegistry::default(),
            clients: Arc::new(DashMap::new()),
        }
    }

    /// Uses `sqs_client` for queues in the client's region. Queues in any
    /// other region still get a client of their own.
    ///
    /// A client without a region serves the settings' default region.
    pub fn with_client(self, sqs_client: aws_sdk_sqs::Client) -> Self {
        let region = match sqs_client.config().region() {
            Some(region) => region.to_string(),
            None => self.settings.default_region.clone(),
        };
        self.clients.insert(region, sqs_client);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Messages sent while offline.
    pub fn outbox(&self) -> &Outbox {
        self.mocks.outbox()
    }

    /// The mock queue called `name`, created on first use.
    pub fn mock_queue(&self, name: &str) -> MockQueue {
        self.mocks.queue(name)
    }

    pub fn clear_outbox(&self) {
        self.mocks.outbox().clear();
    }

    /// Clears the outbox and all mock inboxes.
    pub fn reset(&self) {
        self.mocks.reset();
    }

    /// Returns the queue referenced by `name`, which may be an ARN.
    ///
    /// Offline, this is the mock queue for the bare queue name. Live, the
    /// queue is looked up on SQS; when that fails a strict lookup returns
    /// [`QueueFetcherError::QueueNotFound`] and a lenient one logs a warning
    /// and returns `None`.
    pub async fn get_queue(
        &self,
        name: &str,
        region: Option<&str>,
        account: Option<&str>,
        strict: bool,
    ) -> Result<Option<QueueHandle>, QueueFetcherError> {
        let offline = self.settings.is_offline()?;
        let region = region.unwrap_or(&self.settings.default_region);
        let descriptor = QueueDescriptor::parse(name, region, account)?;

        if offline {
            return Ok(Some(QueueHandle::Mock(self.mocks.queue(&descriptor.name))));
        }

        let sqs_client = self.client_for(&descriptor.region).await;

        match LiveQueue::resolve(sqs_client, &descriptor.name, descriptor.account.as_deref()).await
        {
            Ok(queue) => Ok(Some(QueueHandle::Live(queue))),
            Err(e) if strict => Err(e),
            Err(e) => {
                warn!(queue = %descriptor.name, error = %e, "Error getting queue");
                Ok(None)
            }
        }
    }

    /// The client for `region`, built from the environment on first use.
    async fn client_for(&self, region: &str) -> aws_sdk_sqs::Client {
        if let Some(sqs_client) = self.clients.get(region) {
            return sqs_client.clone();
        }

        let sqs_client = client::create_sqs_client_for_region(region).await;
        self.clients
            .entry(region.to_string())
            .or_insert(sqs_client)
            .value()
            .clone()
    }

    /// Sends `body` on `queue`.
    ///
    /// Offline, the decoded message is appended to the outbox instead. A
    /// failed live send is returned when `strict`, otherwise logged.
    pub async fn send_message(
        &self,
        queue: &QueueHandle,
        body: impl Into<MessageBody>,
        strict: bool,
    ) -> Result<(), QueueFetcherError> {
        match queue.send(body.into()).await {
            Ok(()) => Ok(()),
            Err(e @ QueueFetcherError::SendFailed { .. }) if !strict => {
                warn!(queue = %queue.name(), error = %e, "Could not send message");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves a logical queue through the naming table and sends `body` on it.
    pub async fn queue_send(
        &self,
        queue: &str,
        body: impl Into<MessageBody>,
        strict: bool,
    ) -> Result<(), QueueFetcherError> {
        let name = self.settings.queue_name(queue)?;
        match self.get_queue(name, None, None, strict).await? {
            Some(handle) => self.send_message(&handle, body, strict).await,
            None => {
                info!(queue = %name, "Queue unavailable, message dropped");
                Ok(())
            }
        }
    }

    /// Puts a message back on a logical queue, wrapped in a one-element list.
    pub async fn requeue(
        &self,
        queue: &str,
        message: Value,
        strict: bool,
    ) -> Result<(), QueueFetcherError> {
        self.queue_send(queue, Value::Array(vec![message]), strict)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sqs::config::{BehaviorVersion, Region};
    use serde_json::json;

    fn client_in(region: &'static str) -> aws_sdk_sqs::Client {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::from_static(region))
            .build();
        aws_sdk_sqs::Client::from_conf(config)
    }

    fn region_of(sqs_client: &aws_sdk_sqs::Client) -> Option<String> {
        sqs_client.config().region().map(ToString::to_string)
    }

    #[test]
    fn parses_region_account_and_name_from_an_arn() {
        let descriptor = QueueDescriptor::parse(
            "arn:aws:sqs:nowhere:444400001111:queuenamehere",
            "eu-west-1",
            Some("999999999999"),
        )
        .unwrap();

        assert_eq!(descriptor.region, "nowhere");
        assert_eq!(descriptor.account.as_deref(), Some("444400001111"));
        assert_eq!(descriptor.name, "queuenamehere");
        assert!(descriptor.arn.is_some());
    }

    #[test]
    fn plain_names_keep_the_given_region_and_account() {
        let descriptor = QueueDescriptor::parse("test", "eu-west-1", None).unwrap();
        assert_eq!(descriptor.name, "test");
        assert_eq!(descriptor.region, "eu-west-1");
        assert_eq!(descriptor.account, None);
        assert_eq!(descriptor.arn, None);
    }

    #[test]
    fn malformed_arns_are_rejected() {
        assert!(QueueDescriptor::parse("arn:aws:sqs:nowhere:queuenamehere", "eu-west-1", None)
            .is_err());
        assert!(QueueDescriptor::parse("arn:aws:sqs:a:b:c:d", "eu-west-1", None).is_err());
    }

    #[tokio::test]
    async fn missing_offline_flag_fails_before_any_lookup() {
        let context = SqsContext::new(Settings {
            queues: Some([("test".to_string(), "test".to_string())].into()),
            ..Settings::default()
        });

        let err = context.get_queue("test", None, None, true).await.unwrap_err();
        assert!(matches!(err, QueueFetcherError::Configuration(_)));
    }

    #[tokio::test]
    async fn offline_queues_are_keyed_by_bare_name() {
        let context = SqsContext::new(Settings::offline([("test", "test")]));
        context
            .mock_queue("queuenamehere")
            .add_message(json!({"message_type": "sample"}));

        let handle = context
            .get_queue("arn:aws:sqs:nowhere:444400001111:queuenamehere", None, None, true)
            .await
            .unwrap()
            .unwrap();

        assert!(handle.is_mock());
        assert_eq!(handle.name(), "queuenamehere");
        assert_eq!(handle.as_mock().unwrap().pending(), 1);
    }

    #[tokio::test]
    async fn requeue_wraps_the_message_in_a_list() {
        let context = SqsContext::new(Settings::offline([("test", "test-queue")]));

        context
            .requeue("test", json!({"message_type": "demo"}), true)
            .await
            .unwrap();

        assert_eq!(
            context.outbox().get("test-queue"),
            vec![json!([{"message_type": "demo"}])]
        );

        context.clear_outbox();
        assert!(context.outbox().is_empty());
    }

    #[tokio::test]
    async fn injected_clients_only_serve_their_own_region() {
        let context = SqsContext::new(Settings::default())
            .with_client(client_in("us-east-1"))
            .with_client(client_in("ap-southeast-2"));

        let us = context.client_for("us-east-1").await;
        let sydney = context.client_for("ap-southeast-2").await;

        assert_eq!(region_of(&us).as_deref(), Some("us-east-1"));
        assert_eq!(region_of(&sydney).as_deref(), Some("ap-southeast-2"));
        assert!(!context.clients.contains_key("eu-west-1"));
    }

    #[tokio::test]
    async fn clients_are_built_once_per_region() {
        let context = SqsContext::new(Settings::default()).with_client(client_in("us-east-1"));

        let built = context.client_for("eu-west-1").await;
        assert_eq!(region_of(&built).as_deref(), Some("eu-west-1"));
        assert_eq!(context.clients.len(), 2);

        context.client_for("eu-west-1").await;
        context.clone().client_for("eu-west-1").await;
        assert_eq!(context.clients.len(), 2);
    }
}
