//! # Queue Facade
//!
//! Lifecycle-managed, metrics-instrumented facade over an SQS-compatible
//! message queue.
//!
//! This library provides:
//! - A [`QueueService`] that connects on start, disconnects on stop and
//!   verifies the configured queue exists before accepting work
//! - Per-operation prometheus counters (calls, duration, successes,
//!   failures, traffic amount and traffic size) labelled by queue and
//!   operation
//! - An HTTP client speaking the SQS query protocol with SigV4 signing
//! - An in-memory queue service for tests and local development
//!
//! ## Module Organization
//!
//! - [`service`] - Lifecycle state and instrumented operations
//! - [`metrics`] - Counter families and the prometheus collector
//! - [`configuration`] - Service configuration and loading
//! - [`client`] - Client traits, request models and implementations
//! - [`error`] - Error type shared by the client and the service
//!
//! ## Example
//!
//! ```no_run
//! use queue_facade::{HttpClientFactory, QueueService, SendMessageRequest, ServiceConfiguration};
//!
//! # async fn run() -> Result<(), queue_facade::QueueError> {
//! let service = QueueService::new(HttpClientFactory);
//! service
//!     .apply_configuration(ServiceConfiguration::new(
//!         "https://sqs.sa-east-1.amazonaws.com/123456789012/orders",
//!     ))
//!     .await?;
//! service.start().await?;
//!
//! service.send_message(SendMessageRequest::new("hello")).await?;
//!
//! service.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod configuration;
pub mod error;
pub mod metrics;
pub mod service;

pub use client::model::*;
pub use client::{ClientFactory, HttpClientFactory, InMemorySqs, SqsApi, SqsHttpClient};
pub use configuration::{ServiceConfiguration, DEFAULT_REGION};
pub use error::QueueError;
pub use metrics::{MetricFamily, MetricLabels, MetricsCollector, Operation};
pub use service::{QueueService, ServiceState};
