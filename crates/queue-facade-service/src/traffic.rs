//! Traffic loop that keeps the configured queue busy.
//!
//! Each cycle sends one message with a random numeric body, long-polls for
//! up to a second and deletes the last message it received. Failures are
//! logged and the loop carries on with the next cycle.

use anyhow::Context;
use queue_facade::{DeleteMessageRequest, QueueService, ReceiveMessageRequest, SendMessageRequest};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "traffic_tests.rs"]
mod tests;

/// Seconds each receive waits for a message
pub const RECEIVE_WAIT_SECONDS: u32 = 1;

/// Outcome of one send, receive and delete cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub message_id: String,
    pub received: usize,
    pub deleted: bool,
}

/// Random decimal body for a traffic message
pub fn random_body() -> String {
    rand::rng().random::<u64>().to_string()
}

/// Run a single cycle against `service`
pub async fn run_cycle(service: &QueueService) -> anyhow::Result<CycleReport> {
    let body = random_body();
    let sent = service
        .send_message(SendMessageRequest::new(body.as_str()))
        .await
        .context("sending message")?;
    debug!(message_id = %sent.message_id, body = %body, "Sent message");

    let received = service
        .receive_message(ReceiveMessageRequest {
            wait_time_seconds: Some(RECEIVE_WAIT_SECONDS),
            ..Default::default()
        })
        .await
        .context("receiving messages")?;
    for message in &received.messages {
        debug!(message_id = %message.message_id, len = message.body.len(), "Received message");
    }

    let deleted = match received.messages.last() {
        Some(message) => {
            service
                .delete_message(DeleteMessageRequest::new(message.receipt_handle.as_str()))
                .await
                .context("deleting message")?;
            true
        }
        None => false,
    };

    Ok(CycleReport {
        message_id: sent.message_id,
        received: received.messages.len(),
        deleted,
    })
}

/// Run cycles every `interval` until `shutdown` flips or its sender is dropped
pub async fn run(
    service: Arc<QueueService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "Traffic loop started");

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = run_cycle(&service) => match result {
                Ok(report) => info!(
                    message_id = %report.message_id,
                    received = report.received,
                    deleted = report.deleted,
                    "Traffic cycle complete"
                ),
                Err(e) => warn!(error = %format!("{:#}", e), "Traffic cycle failed"),
            },
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Traffic loop stopped");
}
