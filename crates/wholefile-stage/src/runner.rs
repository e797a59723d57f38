//! Stage lifecycle harness: startup validation, batch processing under the
//! record error policy, health tracking, teardown.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};
use wholefile_config::{OnRecordError, StageConfig, validate_directory};
use wholefile_events::{Event, EventBus};
use wholefile_telemetry::{Metrics, RecordOutcome};

use crate::error::{RecordError, StageError, StageResult};
use crate::processor::RecordProcessor;
use crate::record::Record;
use crate::transform::{ByteTransform, Rot13};

const HEALTH_COMPONENT: &str = "rot13";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Destroyed,
}

/// Records produced by one batch.
#[derive(Debug, Default)]
pub struct BatchOutput {
    /// Records emitted downstream, in input order.
    pub output: Vec<Record>,
    /// Records routed to the error output under [`OnRecordError::ToError`].
    pub errors: Vec<RecordError>,
}

/// Drives a [`RecordProcessor`] the way the surrounding pipeline would.
pub struct StageRunner<T = Rot13> {
    processor: RecordProcessor<T>,
    events: EventBus,
    metrics: Metrics,
    lifecycle: Lifecycle,
    degraded: AtomicBool,
}

impl StageRunner<Rot13> {
    /// Runner for the rot13 stage.
    #[must_use]
    pub fn new(config: StageConfig, events: EventBus, metrics: Metrics) -> Self {
        Self::with_processor(RecordProcessor::new(config), events, metrics)
    }
}

impl<T: ByteTransform> StageRunner<T> {
    /// Runner around an existing processor.
    #[must_use]
    pub const fn with_processor(
        processor: RecordProcessor<T>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            processor,
            events,
            metrics,
            lifecycle: Lifecycle::Created,
            degraded: AtomicBool::new(false),
        }
    }

    /// Validate the output directory and start accepting records.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidConfiguration`] carrying every issue found.
    pub fn init(&mut self) -> StageResult<()> {
        let directory = &self.processor.config().directory;
        let issues = validate_directory(directory);
        if !issues.is_empty() {
            self.metrics.add_config_issues(issues.len());
            for issue in &issues {
                error!(issue = %issue, "stage configuration rejected");
            }
            self.events.publish(Event::StageRejected {
                issues: issues.iter().map(ToString::to_string).collect(),
            });
            return Err(StageError::InvalidConfiguration { issues });
        }

        self.lifecycle = Lifecycle::Running;
        self.events.publish(Event::StageInitialised {
            directory: directory.display().to_string(),
        });
        info!(
            directory = %directory.display(),
            overwrite = %self.processor.config().overwrite,
            on_record_error = %self.processor.config().on_record_error,
            "stage initialised"
        );
        Ok(())
    }

    /// Process `records` in order, applying the configured error policy.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::NotInitialised`] outside `init`/`destroy`, and
    /// [`StageError::PipelineStopped`] on the first failure under
    /// [`OnRecordError::StopPipeline`]; records emitted earlier in the batch
    /// are not returned in that case.
    pub fn process_batch(&self, records: Vec<Record>) -> StageResult<BatchOutput> {
        if self.lifecycle != Lifecycle::Running {
            return Err(StageError::NotInitialised);
        }

        let policy = self.processor.config().on_record_error;
        let mut batch = BatchOutput::default();
        for record in records {
            self.events.publish(Event::RecordStarted {
                record_id: record.id(),
                filename: record.filename().ok().map(str::to_string),
            });

            match self.processor.process(record) {
                Ok(processed) => {
                    self.metrics.inc_record(RecordOutcome::Emitted);
                    self.metrics.add_bytes_transformed(processed.bytes);
                    self.mark_recovered();
                    self.events.publish(Event::RecordEmitted {
                        record_id: processed.record.id(),
                        destination: processed.destination.display().to_string(),
                        bytes: processed.bytes,
                    });
                    batch.output.push(processed.record);
                }
                Err(failure) => {
                    let message = failure.chain_message();
                    self.mark_degraded(&message);
                    self.events.publish(Event::RecordFailed {
                        record_id: failure.record.id(),
                        state: failure.state.as_str().to_string(),
                        message,
                    });
                    match policy {
                        OnRecordError::ToError => {
                            self.metrics.inc_record(RecordOutcome::Failed);
                            batch.errors.push(failure);
                        }
                        OnRecordError::Discard => {
                            self.metrics.inc_record(RecordOutcome::Discarded);
                            warn!(record_id = %failure.record.id(), "failed record discarded");
                        }
                        OnRecordError::StopPipeline => {
                            self.metrics.inc_record(RecordOutcome::Failed);
                            error!(record_id = %failure.record.id(), "stopping pipeline on record error");
                            return Err(StageError::PipelineStopped {
                                source: Box::new(failure),
                            });
                        }
                    }
                }
            }
        }
        Ok(batch)
    }

    /// Stop accepting records.
    pub fn destroy(&mut self) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.lifecycle = Lifecycle::Destroyed;
        self.events.publish(Event::StageDestroyed);
        info!("stage destroyed");
    }

    /// Whether the most recent record failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Processor driven by this runner.
    #[must_use]
    pub const fn processor(&self) -> &RecordProcessor<T> {
        &self.processor
    }

    /// Metrics registry updated by this runner.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn mark_degraded(&self, detail: &str) {
        if self.degraded.swap(true, Ordering::AcqRel) {
            warn!(component = HEALTH_COMPONENT, detail, "stage still degraded");
        } else {
            warn!(component = HEALTH_COMPONENT, detail, "stage degraded");
            self.metrics.set_degraded(true);
            self.events.publish(Event::HealthChanged {
                degraded: vec![HEALTH_COMPONENT.to_string()],
            });
        }
    }

    fn mark_recovered(&self) {
        if self.degraded.swap(false, Ordering::AcqRel) {
            self.metrics.set_degraded(false);
            self.events.publish(Event::HealthChanged { degraded: vec![] });
            info!(component = HEALTH_COMPONENT, "stage recovered");
        }
    }
}
