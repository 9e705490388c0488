//! In-memory queue service for testing and local development.
//!
//! [`InMemorySqs`] behaves like a small SQS endpoint:
//! - Queues must be created before use and are addressed by URL
//! - Messages are delivered in FIFO order and hidden while in flight
//! - Deleting requires the receipt handle of the latest delivery
//! - Batch calls follow the SQS validation rules (1 to 10 entries, distinct ids)
//!
//! Clones share storage, so the same instance can be handed to a
//! [`QueueService`](crate::QueueService) as its [`ClientFactory`] while a test
//! keeps a handle to seed or inspect queues.

use super::model::*;
use super::{ClientFactory, SqsApi};
use crate::configuration::ServiceConfiguration;
use crate::error::QueueError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Maximum number of entries in a batch request
pub const MAX_BATCH_ENTRIES: usize = 10;

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const LONG_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Default)]
struct QueueStorage {
    queues: HashMap<String, InMemoryQueue>,
}

#[derive(Default)]
struct InMemoryQueue {
    /// Visible messages in delivery order
    messages: VecDeque<StoredMessage>,
    /// Messages received but not yet deleted, keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    /// Return messages whose visibility timeout elapsed to the front of the queue
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some(in_flight) = self.in_flight.remove(&handle) {
                self.messages.push_front(in_flight.message);
            }
        }
    }

    fn push(&mut self, body: String, delay_seconds: Option<u32>) -> String {
        let message_id = Uuid::new_v4().to_string();
        let delay = Duration::from_secs(u64::from(delay_seconds.unwrap_or(0)));
        self.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body,
            available_at: Instant::now() + delay,
        });
        message_id
    }
}

#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    available_at: Instant,
}

struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

// ============================================================================
// InMemorySqs
// ============================================================================

/// Thread-safe in-process queue service
#[derive(Clone, Default)]
pub struct InMemorySqs {
    storage: Arc<Mutex<QueueStorage>>,
}

impl InMemorySqs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service that already contains the given queues
    pub fn with_queues<I, S>(queue_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sqs = Self::new();
        for url in queue_urls {
            sqs.create_queue(url);
        }
        sqs
    }

    /// Create an empty queue; existing queues are left untouched
    pub fn create_queue(&self, queue_url: impl Into<String>) {
        self.lock().queues.entry(queue_url.into()).or_default();
    }

    pub fn delete_queue(&self, queue_url: &str) -> bool {
        self.lock().queues.remove(queue_url).is_some()
    }

    /// Number of visible messages in a queue, `None` if it does not exist
    pub fn visible_messages(&self, queue_url: &str) -> Option<usize> {
        self.lock().queues.get(queue_url).map(|q| q.messages.len())
    }

    /// Number of received but undeleted messages in a queue
    pub fn in_flight_messages(&self, queue_url: &str) -> Option<usize> {
        self.lock().queues.get(queue_url).map(|q| q.in_flight.len())
    }

    fn lock(&self) -> MutexGuard<'_, QueueStorage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the queue addressed by `queue_url`
    fn with_queue<T>(
        &self,
        queue_url: Option<&str>,
        f: impl FnOnce(&mut InMemoryQueue) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let mut storage = self.lock();
        let queue = storage
            .queues
            .get_mut(queue_url.unwrap_or_default())
            .ok_or_else(non_existent_queue)?;
        f(queue)
    }
}

fn non_existent_queue() -> QueueError {
    QueueError::InvalidRequest {
        code: "AWS.SimpleQueueService.NonExistentQueue".to_string(),
        message: "The specified queue does not exist".to_string(),
    }
}

fn invalid_request(code: &str, message: impl Into<String>) -> QueueError {
    QueueError::InvalidRequest {
        code: code.to_string(),
        message: message.into(),
    }
}

/// Validate batch size and id uniqueness the way SQS does
fn validate_batch<'a>(ids: impl ExactSizeIterator<Item = &'a str>) -> Result<(), QueueError> {
    if ids.len() == 0 {
        return Err(invalid_request(
            "AWS.SimpleQueueService.EmptyBatchRequest",
            "There should be at least one entry in the request",
        ));
    }
    if ids.len() > MAX_BATCH_ENTRIES {
        return Err(invalid_request(
            "AWS.SimpleQueueService.TooManyEntriesInBatchRequest",
            format!("Maximum number of entries per request are {}", MAX_BATCH_ENTRIES),
        ));
    }

    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(invalid_request(
                "AWS.SimpleQueueService.BatchEntryIdsNotDistinct",
                format!("Id {} repeated", id),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl SqsApi for InMemorySqs {
    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, QueueError> {
        let body = request.message_body.unwrap_or_default();
        if body.is_empty() {
            return Err(invalid_request(
                "MissingParameter",
                "The request must contain the parameter MessageBody",
            ));
        }

        self.with_queue(request.queue_url.as_deref(), |queue| {
            let message_id = queue.push(body, request.delay_seconds);
            Ok(SendMessageResponse {
                message_id,
                ..Default::default()
            })
        })
    }

    async fn send_message_batch(
        &self,
        request: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse, QueueError> {
        validate_batch(request.entries.iter().map(|e| e.id.as_str()))?;

        self.with_queue(request.queue_url.as_deref(), |queue| {
            let mut response = SendMessageBatchResponse::default();
            for entry in request.entries {
                if entry.message_body.is_empty() {
                    response.failed.push(BatchResultErrorEntry {
                        id: entry.id,
                        code: "InvalidParameterValue".to_string(),
                        message: Some("message body must not be empty".to_string()),
                        sender_fault: true,
                    });
                    continue;
                }

                let message_id = queue.push(entry.message_body, entry.delay_seconds);
                response.successful.push(SendMessageBatchResultEntry {
                    id: entry.id,
                    message_id,
                    md5_of_message_body: None,
                });
            }
            Ok(response)
        })
    }

    async fn receive_message(
        &self,
        request: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse, QueueError> {
        let max = request.max_number_of_messages.unwrap_or(1);
        if !(1..=MAX_BATCH_ENTRIES as u32).contains(&max) {
            return Err(invalid_request(
                "InvalidParameterValue",
                format!("MaxNumberOfMessages must be between 1 and {}", MAX_BATCH_ENTRIES),
            ));
        }

        let visibility = request
            .visibility_timeout
            .map(|s| Duration::from_secs(u64::from(s)))
            .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(request.wait_time_seconds.unwrap_or(0)));

        loop {
            let messages = self.with_queue(request.queue_url.as_deref(), |queue| {
                let now = Instant::now();
                queue.release_expired(now);

                let mut received = Vec::new();
                let mut remaining = VecDeque::with_capacity(queue.messages.len());
                while let Some(message) = queue.messages.pop_front() {
                    if received.len() < max as usize && message.available_at <= now {
                        let receipt_handle = Uuid::new_v4().to_string();
                        received.push(ReceivedMessage {
                            message_id: message.message_id.clone(),
                            receipt_handle: receipt_handle.clone(),
                            body: message.body.clone(),
                            md5_of_body: None,
                        });
                        queue.in_flight.insert(
                            receipt_handle,
                            InFlightMessage {
                                message,
                                visible_at: now + visibility,
                            },
                        );
                    } else {
                        remaining.push_back(message);
                    }
                }
                queue.messages = remaining;
                Ok(received)
            })?;

            if !messages.is_empty() || Instant::now() >= deadline {
                return Ok(ReceiveMessageResponse { messages });
            }
            tokio::time::sleep(LONG_POLL_INTERVAL).await;
        }
    }

    async fn delete_message(
        &self,
        request: DeleteMessageRequest,
    ) -> Result<DeleteMessageResponse, QueueError> {
        self.with_queue(request.queue_url.as_deref(), |queue| {
            queue
                .in_flight
                .remove(&request.receipt_handle)
                .map(|_| DeleteMessageResponse {})
                .ok_or_else(|| {
                    invalid_request(
                        "ReceiptHandleIsInvalid",
                        format!("The receipt handle \"{}\" is not valid", request.receipt_handle),
                    )
                })
        })
    }

    async fn delete_message_batch(
        &self,
        request: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse, QueueError> {
        validate_batch(request.entries.iter().map(|e| e.id.as_str()))?;

        self.with_queue(request.queue_url.as_deref(), |queue| {
            let mut response = DeleteMessageBatchResponse::default();
            for entry in request.entries {
                if queue.in_flight.remove(&entry.receipt_handle).is_some() {
                    response.successful.push(entry.id);
                } else {
                    response.failed.push(BatchResultErrorEntry {
                        id: entry.id,
                        code: "ReceiptHandleIsInvalid".to_string(),
                        message: Some("The receipt handle is not valid".to_string()),
                        sender_fault: true,
                    });
                }
            }
            Ok(response)
        })
    }

    async fn purge_queue(
        &self,
        request: PurgeQueueRequest,
    ) -> Result<PurgeQueueResponse, QueueError> {
        self.with_queue(request.queue_url.as_deref(), |queue| {
            queue.messages.clear();
            queue.in_flight.clear();
            Ok(PurgeQueueResponse {})
        })
    }

    async fn list_queues(&self, name_prefix: &str) -> Result<Vec<String>, QueueError> {
        let storage = self.lock();
        let mut urls: Vec<String> = storage
            .queues
            .keys()
            .filter(|url| {
                let name = Url::parse(url)
                    .ok()
                    .and_then(|u| crate::configuration::final_path_segment(&u))
                    .unwrap_or_else(|| url.rsplit('/').next().unwrap_or_default().to_string());
                name.starts_with(name_prefix)
            })
            .cloned()
            .collect();
        urls.sort();
        Ok(urls)
    }
}

#[async_trait]
impl ClientFactory for InMemorySqs {
    async fn connect(
        &self,
        _configuration: &ServiceConfiguration,
    ) -> Result<Arc<dyn SqsApi>, QueueError> {
        Ok(Arc::new(self.clone()))
    }
}
