//! Remote queue client interface and its implementations.
//!
//! [`SqsApi`] is the narrow RPC surface the service wraps. Two
//! implementations are provided:
//! - [`SqsHttpClient`] speaks the SQS query protocol over HTTP
//! - [`InMemorySqs`] keeps queues in process for tests and local runs

use crate::configuration::ServiceConfiguration;
use crate::error::QueueError;
use async_trait::async_trait;
use std::sync::Arc;

pub mod http;
pub mod memory;
pub mod model;

pub use http::{HttpClientFactory, SqsHttpClient};
pub use memory::InMemorySqs;
pub use model::*;

/// Operations of the remote queueing service
///
/// Implementations must resolve `queue_url` themselves; the service always
/// passes requests with the field set.
#[async_trait]
pub trait SqsApi: Send + Sync {
    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, QueueError>;

    async fn send_message_batch(
        &self,
        request: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse, QueueError>;

    async fn receive_message(
        &self,
        request: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse, QueueError>;

    async fn delete_message(
        &self,
        request: DeleteMessageRequest,
    ) -> Result<DeleteMessageResponse, QueueError>;

    async fn delete_message_batch(
        &self,
        request: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse, QueueError>;

    async fn purge_queue(&self, request: PurgeQueueRequest)
        -> Result<PurgeQueueResponse, QueueError>;

    /// List the URLs of queues whose name starts with `name_prefix`
    async fn list_queues(&self, name_prefix: &str) -> Result<Vec<String>, QueueError>;
}

/// Builds a remote client for a configuration
///
/// Called by [`QueueService::start`](crate::QueueService::start); credential
/// and endpoint resolution live here.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        configuration: &ServiceConfiguration,
    ) -> Result<Arc<dyn SqsApi>, QueueError>;
}
