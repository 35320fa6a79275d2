use std::collections::HashMap;

use serde::Deserialize;

use crate::errors::QueueFetcherError;

/// Region used when neither a task nor a queue ARN names one.
pub const DEFAULT_REGION: &str = "eu-west-1";

const QUEUES_NOT_SETUP: &str = "the queue naming table is not set. \
     This needs to map `internal name` to `name on SQS` (a queue name or ARN).";

const OFFLINE_NOT_SETUP: &str = "the offline flag is not set. \
     Set it explicitly to `false` for live SQS or `true` for the in-memory mock.";

/// Application-level queue settings.
///
/// Can be deserialized from the host application's configuration or read
/// from the environment with [`Settings::from_env`].
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Maps logical queue identifiers to SQS queue names or ARNs.
    #[serde(default)]
    pub queues: Option<HashMap<String, String>>,

    /// Selects the in-memory mock (`true`) or live SQS (`false`).
    ///
    /// Deliberately has no default: leaving it unset is a configuration error.
    #[serde(default)]
    pub offline: Option<bool>,

    #[serde(default = "default_region")]
    pub default_region: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            queues: None,
            offline: None,
            default_region: default_region(),
        }
    }
}

impl Settings {
    /// Settings for the in-memory mock with the given naming table.
    pub fn offline<I, K, V>(queues: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Settings {
            queues: Some(
                queues
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            offline: Some(true),
            ..Settings::default()
        }
    }

    /// Reads `QUEUE_FETCHER_OFFLINE`, `QUEUE_FETCHER_QUEUES` and
    /// `QUEUE_FETCHER_REGION` from the process environment.
    pub fn from_env() -> Result<Self, QueueFetcherError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Settings::from_env`], with a custom variable lookup.
    ///
    /// `QUEUE_FETCHER_QUEUES` is a comma separated list of `key=name` pairs.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QueueFetcherError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let offline = lookup("QUEUE_FETCHER_OFFLINE")
            .map(|value| parse_flag(&value))
            .transpose()?;

        let queues = lookup("QUEUE_FETCHER_QUEUES")
            .map(|value| parse_queue_table(&value))
            .transpose()?;

        Ok(Settings {
            queues,
            offline,
            default_region: lookup("QUEUE_FETCHER_REGION").unwrap_or_else(default_region),
        })
    }

    /// Returns the offline flag, failing when it was never set.
    pub fn is_offline(&self) -> Result<bool, QueueFetcherError> {
        self.offline
            .ok_or_else(|| QueueFetcherError::Configuration(OFFLINE_NOT_SETUP.to_string()))
    }

    /// Looks up the SQS name configured for a logical queue.
    pub fn queue_name(&self, key: &str) -> Result<&str, QueueFetcherError> {
        let queues = self
            .queues
            .as_ref()
            .ok_or_else(|| QueueFetcherError::Configuration(QUEUES_NOT_SETUP.to_string()))?;

        queues.get(key).map(String::as_str).ok_or_else(|| {
            QueueFetcherError::Configuration(format!("no queue is configured for {key}"))
        })
    }
}

fn parse_flag(value: &str) -> Result<bool, QueueFetcherError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(QueueFetcherError::Configuration(format!(
            "QUEUE_FETCHER_OFFLINE must be true or false, got {other:?}"
        ))),
    }
}

fn parse_queue_table(value: &str) -> Result<HashMap<String, String>, QueueFetcherError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, name) = pair.split_once('=').ok_or_else(|| {
                QueueFetcherError::Configuration(format!(
                    "QUEUE_FETCHER_QUEUES entry {pair:?} is not key=name"
                ))
            })?;
            Ok((key.trim().to_string(), name.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn missing_table_flag_and_key_are_configuration_errors() {
        let settings = Settings::default();
        assert!(matches!(
            settings.queue_name("test"),
            Err(QueueFetcherError::Configuration(_))
        ));
        assert!(matches!(
            settings.is_offline(),
            Err(QueueFetcherError::Configuration(_))
        ));

        let settings = Settings::offline([("test", "test")]);
        assert_eq!(settings.queue_name("test").unwrap(), "test");
        assert!(matches!(
            settings.queue_name("other"),
            Err(QueueFetcherError::Configuration(_))
        ));
        assert!(settings.is_offline().unwrap());
    }

    #[test]
    fn reads_settings_from_a_lookup() {
        let settings = Settings::from_lookup(lookup(&[
            ("QUEUE_FETCHER_OFFLINE", "False"),
            (
                "QUEUE_FETCHER_QUEUES",
                "test=test-queue, remote=arn:aws:sqs:nowhere:444400001111:queuenamehere",
            ),
        ]))
        .unwrap();

        assert!(!settings.is_offline().unwrap());
        assert_eq!(settings.queue_name("test").unwrap(), "test-queue");
        assert_eq!(
            settings.queue_name("remote").unwrap(),
            "arn:aws:sqs:nowhere:444400001111:queuenamehere"
        );
        assert_eq!(settings.default_region, DEFAULT_REGION);
    }

    #[test]
    fn rejects_malformed_environment_values() {
        assert!(Settings::from_lookup(lookup(&[("QUEUE_FETCHER_OFFLINE", "maybe")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("QUEUE_FETCHER_QUEUES", "novalue")])).is_err());
        assert!(Settings::from_lookup(lookup(&[])).unwrap().offline.is_none());
    }

    #[test]
    fn deserializes_without_defaulting_the_offline_flag() {
        let settings: Settings =
            serde_json::from_str(r#"{"queues": {"test": "test"}}"#).unwrap();
        assert!(settings.offline.is_none());
        assert_eq!(settings.default_region, DEFAULT_REGION);
    }
}
