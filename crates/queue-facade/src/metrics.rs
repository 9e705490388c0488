//! Per-operation counters for queue traffic.
//!
//! A [`MetricsCollector`] owns six counter families, all labelled with
//! `queue` and `operation`. It implements [`prometheus::core::Collector`], so
//! it can be registered with any [`prometheus::Registry`] and scraped through
//! the usual describe/collect contract.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily as ProtoMetricFamily;
use prometheus::{CounterVec, Opts, Registry};
use std::fmt;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Label names shared by every family
pub const LABEL_NAMES: [&str; 2] = ["queue", "operation"];

/// The six counter families tracked per label pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    Calls,
    Duration,
    Successes,
    Failures,
    TrafficAmount,
    TrafficSize,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 6] = [
        Self::Calls,
        Self::Duration,
        Self::Successes,
        Self::Failures,
        Self::TrafficAmount,
        Self::TrafficSize,
    ];

    /// Series name without prefix
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Calls => "message_calls",
            Self::Duration => "message_duration",
            Self::Successes => "message_success",
            Self::Failures => "message_failures",
            Self::TrafficAmount => "message_traffic_amount",
            Self::TrafficSize => "message_traffic_size",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Self::Calls => "Number of operation calls, including calls made while stopped",
            Self::Duration => "Seconds spent waiting on the queue service",
            Self::Successes => "Number of operations the queue service completed",
            Self::Failures => "Number of operations the queue service rejected",
            Self::TrafficAmount => "Number of messages moved",
            Self::TrafficSize => "Bytes of message bodies moved",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Queue operations as they appear in the `operation` label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SendMessage,
    SendMessageBatch,
    ReceiveMessage,
    DeleteMessage,
    DeleteMessageBatch,
    PurgeQueue,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "SendMessage",
            Self::SendMessageBatch => "SendMessageBatch",
            Self::ReceiveMessage => "ReceiveMessage",
            Self::DeleteMessage => "DeleteMessage",
            Self::DeleteMessageBatch => "DeleteMessageBatch",
            Self::PurgeQueue => "PurgeQueue",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (queue, operation) key every counter is tracked under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricLabels {
    pub queue: String,
    pub operation: Operation,
}

impl MetricLabels {
    pub fn new(queue: impl Into<String>, operation: Operation) -> Self {
        Self {
            queue: queue.into(),
            operation,
        }
    }

    fn values(&self) -> [&str; 2] {
        [self.queue.as_str(), self.operation.as_str()]
    }
}

/// Counter set for one service lifetime
///
/// Clones share the underlying counters.
#[derive(Clone)]
pub struct MetricsCollector {
    prefix: String,
    families: [CounterVec; 6],
}

impl MetricsCollector {
    /// Create a collector whose series names start with `prefix`
    ///
    /// `prefix` is used verbatim; callers normalize it (see
    /// [`ServiceConfiguration::normalized_metric_prefix`](crate::ServiceConfiguration::normalized_metric_prefix)).
    ///
    /// # Errors
    ///
    /// Fails if the resulting names are not valid metric names.
    pub fn new(prefix: impl Into<String>) -> Result<Self, prometheus::Error> {
        let prefix = prefix.into();
        let build = |family: MetricFamily| {
            CounterVec::new(
                Opts::new(format!("{}{}", prefix, family.suffix()), family.help()),
                &LABEL_NAMES,
            )
        };

        Ok(Self {
            families: [
                build(MetricFamily::Calls)?,
                build(MetricFamily::Duration)?,
                build(MetricFamily::Successes)?,
                build(MetricFamily::Failures)?,
                build(MetricFamily::TrafficAmount)?,
                build(MetricFamily::TrafficSize)?,
            ],
            prefix,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Exported name of a family
    pub fn series_name(&self, family: MetricFamily) -> String {
        format!("{}{}", self.prefix, family.suffix())
    }

    /// Create the series of every family for `labels` at zero
    pub fn touch(&self, labels: &MetricLabels) {
        for family in &self.families {
            family.with_label_values(&labels.values());
        }
    }

    /// Add one to `family` for `labels`
    pub fn increment(&self, family: MetricFamily, labels: &MetricLabels) {
        self.families[family.index()]
            .with_label_values(&labels.values())
            .inc();
    }

    /// Add `amount` to `family` for `labels`; non-positive amounts are ignored
    pub fn observe(&self, family: MetricFamily, labels: &MetricLabels, amount: f64) {
        if amount > 0.0 {
            self.families[family.index()]
                .with_label_values(&labels.values())
                .inc_by(amount);
        }
    }

    /// Current value of a series; zero if it was never touched
    pub fn value(&self, family: MetricFamily, labels: &MetricLabels) -> f64 {
        self.families[family.index()]
            .get_metric_with_label_values(&labels.values())
            .map(|counter| counter.get())
            .unwrap_or(0.0)
    }

    /// Register with a pull-based registry
    pub fn register_with(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.clone()))
    }

    /// Remove from a registry this collector was registered with
    pub fn unregister_from(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.unregister(Box::new(self.clone()))
    }

    /// Append a snapshot of every family to `sink`
    pub fn collect_into(&self, sink: &mut Vec<ProtoMetricFamily>) {
        sink.extend(self.collect());
    }
}

impl Collector for MetricsCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.families.iter().flat_map(|f| f.desc()).collect()
    }

    fn collect(&self) -> Vec<ProtoMetricFamily> {
        self.families.iter().flat_map(|f| f.collect()).collect()
    }
}

impl fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("prefix", &self.prefix)
            .finish()
    }
}
