//! Error types for logging and metrics setup.

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Failures raised while wiring up stage logging or metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber could not be installed.
    #[error("logging subscriber install failed")]
    LoggingInstall {
        /// Underlying subscriber error.
        #[source]
        source: TryInitError,
    },
    /// A stage metric was rejected when it was defined.
    #[error("stage metric definition rejected")]
    MetricDefinition {
        /// Name of the metric.
        metric: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
    /// A stage metric could not be added to the registry.
    #[error("stage metric registration rejected")]
    MetricRegistration {
        /// Name of the metric.
        metric: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
    /// The registry could not be rendered as Prometheus text.
    #[error("stage metrics render failed")]
    Render {
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
}
