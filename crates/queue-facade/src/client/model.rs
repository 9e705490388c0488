//! Request and response structures for the SQS query API.
//!
//! Every request carries an optional `queue_url`. The service fills it in
//! from its configuration when the caller leaves it unset.

use serde::{Deserialize, Serialize};

/// Requests that target a single queue
pub trait QueueRequest {
    fn queue_url(&self) -> Option<&str>;
    fn set_queue_url(&mut self, queue_url: String);
}

macro_rules! impl_queue_request {
    ($($ty:ty),* $(,)?) => {
        $(
            impl QueueRequest for $ty {
                fn queue_url(&self) -> Option<&str> {
                    self.queue_url.as_deref()
                }

                fn set_queue_url(&mut self, queue_url: String) {
                    self.queue_url = Some(queue_url);
                }
            }
        )*
    };
}

impl_queue_request!(
    SendMessageRequest,
    SendMessageBatchRequest,
    ReceiveMessageRequest,
    DeleteMessageRequest,
    DeleteMessageBatchRequest,
    PurgeQueueRequest,
);

// ============================================================================
// SendMessage
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub queue_url: Option<String>,
    pub message_body: Option<String>,
    pub delay_seconds: Option<u32>,
    /// Required by FIFO queues
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

impl SendMessageRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            message_body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Byte length of the body; zero when absent
    pub fn body_len(&self) -> usize {
        self.message_body.as_ref().map_or(0, String::len)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub md5_of_message_body: Option<String>,
    pub sequence_number: Option<String>,
}

// ============================================================================
// SendMessageBatch
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageBatchRequest {
    pub queue_url: Option<String>,
    pub entries: Vec<SendMessageBatchEntry>,
}

impl SendMessageBatchRequest {
    pub fn new(entries: Vec<SendMessageBatchEntry>) -> Self {
        Self {
            queue_url: None,
            entries,
        }
    }

    /// Sum of the entry body byte lengths
    pub fn body_len(&self) -> usize {
        self.entries.iter().map(|e| e.message_body.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageBatchEntry {
    /// Caller-chosen identifier, unique within the batch
    pub id: String,
    pub message_body: String,
    pub delay_seconds: Option<u32>,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

impl SendMessageBatchEntry {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message_body: body.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageBatchResponse {
    pub successful: Vec<SendMessageBatchResultEntry>,
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageBatchResultEntry {
    pub id: String,
    pub message_id: String,
    pub md5_of_message_body: Option<String>,
}

/// Per-entry failure inside an otherwise successful batch call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResultErrorEntry {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    pub sender_fault: bool,
}

// ============================================================================
// ReceiveMessage
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessageRequest {
    pub queue_url: Option<String>,
    /// 1 to 10; the service default (1) applies when unset
    pub max_number_of_messages: Option<u32>,
    /// Long-poll duration, 0 to 20 seconds
    pub wait_time_seconds: Option<u32>,
    pub visibility_timeout: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessageResponse {
    pub messages: Vec<ReceivedMessage>,
}

impl ReceiveMessageResponse {
    /// Sum of the received body byte lengths
    pub fn body_len(&self) -> usize {
        self.messages.iter().map(|m| m.body.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub md5_of_body: Option<String>,
}

// ============================================================================
// DeleteMessage / DeleteMessageBatch / PurgeQueue
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageRequest {
    pub queue_url: Option<String>,
    pub receipt_handle: String,
}

impl DeleteMessageRequest {
    pub fn new(receipt_handle: impl Into<String>) -> Self {
        Self {
            queue_url: None,
            receipt_handle: receipt_handle.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageBatchRequest {
    pub queue_url: Option<String>,
    pub entries: Vec<DeleteMessageBatchEntry>,
}

impl DeleteMessageBatchRequest {
    pub fn new(entries: Vec<DeleteMessageBatchEntry>) -> Self {
        Self {
            queue_url: None,
            entries,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageBatchEntry {
    pub id: String,
    pub receipt_handle: String,
}

impl DeleteMessageBatchEntry {
    pub fn new(id: impl Into<String>, receipt_handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            receipt_handle: receipt_handle.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageBatchResponse {
    /// Ids of the entries that were deleted
    pub successful: Vec<String>,
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeQueueRequest {
    pub queue_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeQueueResponse {}
