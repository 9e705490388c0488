//! Lifecycle-managed, metrics-instrumented queue service.
//!
//! [`QueueService`] wraps an [`SqsApi`] client. It owns the active
//! [`ServiceConfiguration`], connects on [`start`](QueueService::start),
//! disconnects on [`stop`](QueueService::stop), and records every operation
//! in a [`MetricsCollector`].
//!
//! ## Instrumentation
//!
//! Every operation wrapper:
//! 1. fills in the request's queue URL from the configuration when unset
//! 2. increments `calls` for `(queue, operation)`, even when stopped
//! 3. returns [`QueueError::ServiceNotRunning`] if stopped
//! 4. times the remote call into `duration`, success or not
//! 5. increments `successes` or `failures` and accounts traffic
//!
//! Batch operations account their traffic before dispatch so the counters
//! reflect offered load; single operations account it only on success.
//!
//! ## Concurrency
//!
//! The lifecycle state and the current collector live behind one
//! `RwLock`. Wrappers read both in a single critical section and release the
//! lock before the remote call. Lifecycle transitions are serialized by a
//! separate mutex.

use crate::client::model::*;
use crate::client::{ClientFactory, SqsApi};
use crate::configuration::{final_path_segment, ServiceConfiguration};
use crate::error::QueueError;
use crate::metrics::{MetricFamily, MetricLabels, MetricsCollector, Operation};
use prometheus::Registry;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use url::Url;

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

/// Lifecycle state of a [`QueueService`]
#[derive(Clone, Default)]
pub enum ServiceState {
    #[default]
    Stopped,
    Running { client: Arc<dyn SqsApi> },
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    fn client(&self) -> Option<Arc<dyn SqsApi>> {
        match self {
            Self::Stopped => None,
            Self::Running { client } => Some(Arc::clone(client)),
        }
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("Stopped"),
            Self::Running { .. } => f.write_str("Running"),
        }
    }
}

/// State guarded by the service's reader-writer lock
struct Runtime {
    state: ServiceState,
    collector: MetricsCollector,
}

/// Message counts and body bytes moved by one operation
#[derive(Debug, Clone, Copy)]
struct Traffic {
    messages: usize,
    bytes: Option<usize>,
}

impl Traffic {
    fn record(&self, collector: &MetricsCollector, labels: &MetricLabels) {
        collector.observe(MetricFamily::TrafficAmount, labels, self.messages as f64);
        if let Some(bytes) = self.bytes {
            collector.observe(MetricFamily::TrafficSize, labels, bytes as f64);
        }
    }
}

/// SQS service wrapper with lifecycle management and per-operation metrics
///
/// Construct one instance per application and share it by reference or
/// `Arc`; all methods take `&self`.
pub struct QueueService {
    factory: Arc<dyn ClientFactory>,
    registry: Option<Registry>,
    configuration: RwLock<ServiceConfiguration>,
    runtime: RwLock<Runtime>,
    lifecycle: Mutex<()>,
}

impl QueueService {
    /// Create a stopped service that builds its clients with `factory`
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        let collector =
            MetricsCollector::new("").expect("unprefixed metric names are always valid");

        Self {
            factory: Arc::new(factory),
            registry: None,
            configuration: RwLock::new(ServiceConfiguration::default()),
            runtime: RwLock::new(Runtime {
                state: ServiceState::Stopped,
                collector,
            }),
            lifecycle: Mutex::new(()),
        }
    }

    /// Create a stopped service whose collectors are registered with `registry`
    ///
    /// Each start registers the fresh collector and unregisters the one it
    /// replaces, so scrapes always see the current service lifetime.
    pub fn with_registry(
        factory: impl ClientFactory + 'static,
        registry: Registry,
    ) -> Result<Self, QueueError> {
        let mut service = Self::new(factory);
        service.runtime.get_mut().collector.register_with(&registry)?;
        service.registry = Some(registry);
        Ok(service)
    }

    // ------------------------------------------------------------------------
    // Configuration and state
    // ------------------------------------------------------------------------

    /// Replace the stored configuration
    ///
    /// Allowed in any state. A running service keeps its client and
    /// collector; the new queue URL applies to subsequent operations and the
    /// new connection settings to the next start. A stopped service whose
    /// metric prefix changes gets an empty collector under the new names.
    pub async fn apply_configuration(
        &self,
        configuration: ServiceConfiguration,
    ) -> Result<(), QueueError> {
        configuration.validate()?;

        let _guard = self.lifecycle.lock().await;
        let prefix = configuration.normalized_metric_prefix();
        {
            let mut runtime = self.runtime.write().await;
            if !runtime.state.is_running() && runtime.collector.prefix() != prefix {
                let collector = MetricsCollector::new(prefix)?;
                self.replace_collector(&mut runtime, collector)?;
            }
        }

        *self.configuration.write().await = configuration;
        Ok(())
    }

    pub async fn configuration(&self) -> ServiceConfiguration {
        self.configuration.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.read().await.state.is_running()
    }

    pub async fn state(&self) -> ServiceState {
        self.runtime.read().await.state.clone()
    }

    /// Collector of the current service lifetime
    pub async fn collector(&self) -> MetricsCollector {
        self.runtime.read().await.collector.clone()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Connect to the configured queue
    ///
    /// No-op when already running. Otherwise builds a client, checks that the
    /// configured queue exists and installs the client together with a fresh
    /// collector. On any error the service stays stopped and the error is
    /// returned as produced.
    pub async fn start(&self) -> Result<(), QueueError> {
        let guard = self.lifecycle.lock().await;
        self.start_locked(&guard).await
    }

    /// Drop the client; no-op when already stopped
    ///
    /// Operations that fetched the client before this call finish against it.
    /// The collector is kept so calls made while stopped remain visible.
    pub async fn stop(&self) -> Result<(), QueueError> {
        let guard = self.lifecycle.lock().await;
        self.stop_locked(&guard).await
    }

    /// Stop, then start; counters start from zero afterwards
    pub async fn restart(&self) -> Result<(), QueueError> {
        let guard = self.lifecycle.lock().await;
        self.stop_locked(&guard).await?;
        self.start_locked(&guard).await
    }

    async fn start_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<(), QueueError> {
        if self.is_running().await {
            return Ok(());
        }

        let configuration = self.configuration().await;
        let queue_name = configuration.queue_name()?;

        let client = self.factory.connect(&configuration).await?;
        let candidates = client.list_queues(&queue_name).await?;
        debug!(
            queue_url = %configuration.queue_url,
            candidates = candidates.len(),
            "Verifying queue exists"
        );

        let found = candidates.iter().any(|candidate| {
            Url::parse(candidate)
                .ok()
                .and_then(|url| final_path_segment(&url))
                .is_some_and(|name| name == queue_name)
        });
        if !found {
            return Err(QueueError::QueueNotFound {
                queue_url: configuration.queue_url,
            });
        }

        let collector = MetricsCollector::new(configuration.normalized_metric_prefix())?;

        let mut runtime = self.runtime.write().await;
        self.replace_collector(&mut runtime, collector)?;
        runtime.state = ServiceState::Running { client };

        info!(
            queue_url = %configuration.queue_url,
            region = %configuration.effective_region(),
            metric_prefix = %configuration.normalized_metric_prefix(),
            "Queue service started"
        );
        Ok(())
    }

    /// Install `collector`, moving the registry export over to it
    ///
    /// On a registration failure the previous collector stays installed and
    /// exported.
    fn replace_collector(
        &self,
        runtime: &mut Runtime,
        collector: MetricsCollector,
    ) -> Result<(), QueueError> {
        if let Some(registry) = &self.registry {
            if let Err(e) = runtime.collector.unregister_from(registry) {
                warn!(error = %e, "Previous metrics collector was not registered");
            }
            if let Err(e) = collector.register_with(registry) {
                if let Err(restore) = runtime.collector.register_with(registry) {
                    warn!(
                        error = %restore,
                        prefix = %runtime.collector.prefix(),
                        "Could not restore previous metrics collector; no queue metrics are exported"
                    );
                }
                return Err(e.into());
            }
        }
        runtime.collector = collector;
        Ok(())
    }

    async fn stop_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<(), QueueError> {
        let mut runtime = self.runtime.write().await;
        if runtime.state.is_running() {
            runtime.state = ServiceState::Stopped;
            info!("Queue service stopped");
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Wrapper for `SendMessage`
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, QueueError> {
        let body_len = request.body_len();
        self.instrumented(
            Operation::SendMessage,
            request,
            |_| None,
            |client, request| async move { client.send_message(request).await },
            |_| {
                Some(Traffic {
                    messages: 1,
                    bytes: Some(body_len),
                })
            },
        )
        .await
    }

    /// Wrapper for `SendMessageBatch`
    ///
    /// Traffic covers every entry, whatever the per-entry outcome.
    pub async fn send_message_batch(
        &self,
        request: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse, QueueError> {
        self.instrumented(
            Operation::SendMessageBatch,
            request,
            |request| {
                Some(Traffic {
                    messages: request.entries.len(),
                    bytes: Some(request.body_len()),
                })
            },
            |client, request| async move { client.send_message_batch(request).await },
            |_| None,
        )
        .await
    }

    /// Wrapper for `ReceiveMessage`
    pub async fn receive_message(
        &self,
        request: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse, QueueError> {
        self.instrumented(
            Operation::ReceiveMessage,
            request,
            |_| None,
            |client, request| async move { client.receive_message(request).await },
            |response: &ReceiveMessageResponse| {
                Some(Traffic {
                    messages: response.messages.len(),
                    bytes: Some(response.body_len()),
                })
            },
        )
        .await
    }

    /// Wrapper for `DeleteMessage`
    pub async fn delete_message(
        &self,
        request: DeleteMessageRequest,
    ) -> Result<DeleteMessageResponse, QueueError> {
        self.instrumented(
            Operation::DeleteMessage,
            request,
            |_| None,
            |client, request| async move { client.delete_message(request).await },
            |_| {
                Some(Traffic {
                    messages: 1,
                    bytes: None,
                })
            },
        )
        .await
    }

    /// Wrapper for `DeleteMessageBatch`
    pub async fn delete_message_batch(
        &self,
        request: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse, QueueError> {
        self.instrumented(
            Operation::DeleteMessageBatch,
            request,
            |request| {
                Some(Traffic {
                    messages: request.entries.len(),
                    bytes: None,
                })
            },
            |client, request| async move { client.delete_message_batch(request).await },
            |_| None,
        )
        .await
    }

    /// Wrapper for `PurgeQueue`
    ///
    /// Only `calls` is recorded; the purge itself is passed through untimed.
    pub async fn purge_queue(
        &self,
        request: PurgeQueueRequest,
    ) -> Result<PurgeQueueResponse, QueueError> {
        let (request, labels) = self.resolve(Operation::PurgeQueue, request).await;
        let (client, collector) = self.snapshot().await;

        collector.touch(&labels);
        collector.increment(MetricFamily::Calls, &labels);

        let client = client.ok_or(QueueError::ServiceNotRunning)?;
        client.purge_queue(request).await
    }

    /// Run `handler` with the raw client; not instrumented
    pub async fn run_with_client<F, Fut, T>(&self, handler: F) -> Result<T, QueueError>
    where
        F: FnOnce(Arc<dyn SqsApi>) -> Fut,
        Fut: Future<Output = Result<T, QueueError>>,
    {
        let client = self
            .runtime
            .read()
            .await
            .state
            .client()
            .ok_or(QueueError::ServiceNotRunning)?;
        handler(client).await
    }

    // ------------------------------------------------------------------------
    // Instrumentation
    // ------------------------------------------------------------------------

    /// Default the request's queue URL and build its label pair
    async fn resolve<R: QueueRequest>(
        &self,
        operation: Operation,
        mut request: R,
    ) -> (R, MetricLabels) {
        if request.queue_url().is_none() {
            let queue_url = self.configuration.read().await.queue_url.clone();
            request.set_queue_url(queue_url);
        }
        let labels = MetricLabels::new(request.queue_url().unwrap_or_default(), operation);
        (request, labels)
    }

    /// Client and collector read in one critical section
    async fn snapshot(&self) -> (Option<Arc<dyn SqsApi>>, MetricsCollector) {
        let runtime = self.runtime.read().await;
        (runtime.state.client(), runtime.collector.clone())
    }

    async fn instrumented<Req, Resp, Call, Fut>(
        &self,
        operation: Operation,
        request: Req,
        before_dispatch: impl FnOnce(&Req) -> Option<Traffic>,
        call: Call,
        on_success: impl FnOnce(&Resp) -> Option<Traffic>,
    ) -> Result<Resp, QueueError>
    where
        Req: QueueRequest,
        Call: FnOnce(Arc<dyn SqsApi>, Req) -> Fut,
        Fut: Future<Output = Result<Resp, QueueError>>,
    {
        let (request, labels) = self.resolve(operation, request).await;
        let (client, collector) = self.snapshot().await;

        collector.touch(&labels);
        collector.increment(MetricFamily::Calls, &labels);

        let client = client.ok_or(QueueError::ServiceNotRunning)?;

        if let Some(traffic) = before_dispatch(&request) {
            traffic.record(&collector, &labels);
        }

        let started = Instant::now();
        let result = call(client, request).await;
        collector.observe(
            MetricFamily::Duration,
            &labels,
            started.elapsed().as_secs_f64(),
        );

        match result {
            Ok(response) => {
                collector.increment(MetricFamily::Successes, &labels);
                if let Some(traffic) = on_success(&response) {
                    traffic.record(&collector, &labels);
                }
                Ok(response)
            }
            Err(e) => {
                collector.increment(MetricFamily::Failures, &labels);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for QueueService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueService")
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}
