//! Service configuration and its loading pipeline.

use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use url::Url;

/// Region used when the configuration leaves `region` empty.
pub const DEFAULT_REGION: &str = "sa-east-1";

/// Prefix of environment variables read by [`ServiceConfiguration::load`].
pub const ENV_PREFIX: &str = "QF";

/// Configuration for the [`QueueService`](crate::QueueService)
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfiguration {
    /// Full URL of the queue every request targets unless it names its own
    #[serde(alias = "q_url")]
    pub queue_url: String,

    /// AWS region; [`DEFAULT_REGION`] when empty
    pub region: String,

    /// Endpoint override, e.g. a local ElasticMQ instance
    pub endpoint: String,

    /// Access key ID used to sign requests
    #[serde(alias = "key")]
    pub access_key: String,

    /// Secret access key used to sign requests
    pub secret: String,

    /// Prefix prepended to every exported metric name
    pub metric_prefix: String,
}

impl ServiceConfiguration {
    /// Create a configuration targeting `queue_url` with everything else defaulted
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials(mut self, access_key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.access_key = access_key.into();
        self.secret = secret.into();
        self
    }

    pub fn with_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = prefix.into();
        self
    }

    /// Load configuration from an optional YAML file overlaid with
    /// `QF__`-prefixed environment variables.
    ///
    /// Environment variables win over the file, e.g. `QF__QUEUE_URL` sets
    /// `queue_url`. The loaded value is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, QueueError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .required(true)
                    .format(::config::FileFormat::Yaml),
            );
        }

        let configuration: Self = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| QueueError::invalid_configuration(e.to_string()))?;

        configuration.validate()?;
        Ok(configuration)
    }

    /// Check that the configuration can be applied to a service.
    ///
    /// The queue URL itself is only parsed on start so that a service can be
    /// configured before the target queue is known.
    pub fn validate(&self) -> Result<(), QueueError> {
        if !is_valid_metric_prefix(&self.metric_prefix) {
            return Err(QueueError::invalid_configuration(format!(
                "metric prefix '{}' is not a valid metric name fragment",
                self.metric_prefix
            )));
        }

        if self.access_key.is_empty() != self.secret.is_empty() {
            return Err(QueueError::invalid_configuration(
                "access key and secret must be provided together",
            ));
        }

        if !self.endpoint.is_empty() {
            let endpoint = Url::parse(&self.endpoint).map_err(|e| {
                QueueError::invalid_configuration(format!(
                    "could not parse endpoint '{}': {}",
                    self.endpoint, e
                ))
            })?;
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(QueueError::invalid_configuration(format!(
                    "endpoint '{}' must use http or https",
                    self.endpoint
                )));
            }
        }

        Ok(())
    }

    /// Region requests are signed for
    pub fn effective_region(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.region
        }
    }

    /// Endpoint requests are sent to
    pub fn effective_endpoint(&self) -> String {
        if self.endpoint.is_empty() {
            format!("https://sqs.{}.amazonaws.com", self.effective_region())
        } else {
            self.endpoint.trim_end_matches('/').to_string()
        }
    }

    /// Whether requests should be signed
    pub fn has_credentials(&self) -> bool {
        !self.access_key.is_empty() && !self.secret.is_empty()
    }

    /// Metric prefix ending in exactly one `_`, or empty when unset
    pub fn normalized_metric_prefix(&self) -> String {
        let trimmed = self.metric_prefix.trim_end_matches('_');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}_", trimmed)
        }
    }

    /// Name of the configured queue: the final path segment of its URL.
    pub fn queue_name(&self) -> Result<String, QueueError> {
        let url = Url::parse(&self.queue_url).map_err(|e| {
            QueueError::invalid_configuration(format!(
                "could not parse queue URL '{}': {}",
                self.queue_url, e
            ))
        })?;

        final_path_segment(&url).ok_or_else(|| {
            QueueError::invalid_configuration(format!(
                "queue URL '{}' has no queue name",
                self.queue_url
            ))
        })
    }
}

impl fmt::Debug for ServiceConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.secret.is_empty() { "" } else { "<REDACTED>" };
        f.debug_struct("ServiceConfiguration")
            .field("queue_url", &self.queue_url)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret", &secret)
            .field("metric_prefix", &self.metric_prefix)
            .finish()
    }
}

/// Last non-empty path segment of a URL
pub(crate) fn final_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

fn is_valid_metric_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        None => true,
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        Some(_) => false,
    }
}

#[cfg(test)]
#[path = "configuration_tests.rs"]
mod tests;
