//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes only the counters the stage and its runner record.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Final disposition of a record as seen by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The record was transformed and emitted downstream.
    Emitted,
    /// The record failed and was routed to the error output.
    Failed,
    /// The record failed and was dropped by policy.
    Discarded,
}

impl RecordOutcome {
    /// Label value used for the `outcome` dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emitted => "emitted",
            Self::Failed => "failed",
            Self::Discarded => "discarded",
        }
    }
}

/// Prometheus-backed metrics registry shared across the stage.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    records_total: IntCounterVec,
    bytes_transformed_total: IntCounter,
    config_issues_total: IntCounter,
    degraded: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Records emitted downstream.
    pub records_emitted: u64,
    /// Records routed to the error output.
    pub records_failed: u64,
    /// Records dropped by the error policy.
    pub records_discarded: u64,
    /// Bytes written through the transform.
    pub bytes_transformed: u64,
    /// Configuration issues reported at startup.
    pub config_issues: u64,
    /// Whether the stage currently reports itself degraded.
    pub degraded: bool,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();
        let records_total = install(&registry, "stage_records_total", |name| {
            IntCounterVec::new(Opts::new(name, "Records processed by outcome"), &["outcome"])
        })?;
        let bytes_transformed_total = install(&registry, "stage_bytes_transformed_total", |name| {
            IntCounter::with_opts(Opts::new(name, "Bytes written through the rot13 transform"))
        })?;
        let config_issues_total = install(&registry, "stage_config_issues_total", |name| {
            IntCounter::with_opts(Opts::new(
                name,
                "Configuration issues reported during stage initialisation",
            ))
        })?;
        let degraded = install(&registry, "stage_degraded", |name| {
            IntGauge::with_opts(Opts::new(name, "Set to 1 while the most recent record failed"))
        })?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                records_total,
                bytes_transformed_total,
                config_issues_total,
                degraded,
            }),
        })
    }

    /// Increment the record counter for the given outcome.
    pub fn inc_record(&self, outcome: RecordOutcome) {
        self.inner
            .records_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Add to the transformed byte counter.
    pub fn add_bytes_transformed(&self, bytes: u64) {
        self.inner.bytes_transformed_total.inc_by(bytes);
    }

    /// Add to the startup configuration issue counter.
    pub fn add_config_issues(&self, count: usize) {
        self.inner
            .config_issues_total
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Flip the degraded gauge.
    pub fn set_degraded(&self, degraded: bool) {
        self.inner.degraded.set(i64::from(degraded));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Render`] if the registry cannot be encoded.
    pub fn render(&self) -> TelemetryResult<String> {
        TextEncoder::new()
            .encode_to_string(&self.inner.registry.gather())
            .map_err(|source| TelemetryError::Render { source })
    }

    /// Take a point-in-time snapshot of the stage counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let records = |outcome: RecordOutcome| {
            self.inner
                .records_total
                .with_label_values(&[outcome.as_str()])
                .get()
        };
        MetricsSnapshot {
            records_emitted: records(RecordOutcome::Emitted),
            records_failed: records(RecordOutcome::Failed),
            records_discarded: records(RecordOutcome::Discarded),
            bytes_transformed: self.inner.bytes_transformed_total.get(),
            config_issues: self.inner.config_issues_total.get(),
            degraded: self.inner.degraded.get() != 0,
        }
    }
}

/// Define a collector under `metric` and register a handle to it.
fn install<C, F>(registry: &Registry, metric: &'static str, define: F) -> TelemetryResult<C>
where
    C: Collector + Clone + 'static,
    F: FnOnce(&'static str) -> prometheus::Result<C>,
{
    let collector =
        define(metric).map_err(|source| TelemetryError::MetricDefinition { metric, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricRegistration { metric, source })?;
    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> TelemetryResult<()> {
        let metrics = Metrics::new()?;
        metrics.inc_record(RecordOutcome::Emitted);
        metrics.inc_record(RecordOutcome::Emitted);
        metrics.inc_record(RecordOutcome::Failed);
        metrics.inc_record(RecordOutcome::Discarded);
        metrics.add_bytes_transformed(44);
        metrics.add_config_issues(2);
        metrics.set_degraded(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_emitted, 2);
        assert_eq!(snapshot.records_failed, 1);
        assert_eq!(snapshot.records_discarded, 1);
        assert_eq!(snapshot.bytes_transformed, 44);
        assert_eq!(snapshot.config_issues, 2);
        assert!(snapshot.degraded);

        let rendered = metrics.render()?;
        assert!(rendered.contains("stage_records_total"));
        assert!(rendered.contains("stage_bytes_transformed_total 44"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> TelemetryResult<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_record(RecordOutcome::Emitted);
        assert_eq!(second.snapshot().records_emitted, 0);
        Ok(())
    }

    #[test]
    fn duplicate_metric_names_are_rejected_by_name() -> TelemetryResult<()> {
        let registry = Registry::new();
        install(&registry, "stage_degraded", |name| {
            IntGauge::with_opts(Opts::new(name, "first"))
        })?;
        let Err(err) = install(&registry, "stage_degraded", |name| {
            IntGauge::with_opts(Opts::new(name, "second"))
        }) else {
            panic!("expected duplicate registration to fail");
        };
        assert!(matches!(
            err,
            TelemetryError::MetricRegistration {
                metric: "stage_degraded",
                ..
            }
        ));

        let Err(err) = install(&registry, "stage bad name", |name| {
            IntGauge::with_opts(Opts::new(name, "invalid"))
        }) else {
            panic!("expected an invalid metric name to fail");
        };
        assert!(matches!(err, TelemetryError::MetricDefinition { .. }));
        Ok(())
    }
}
