//! Telemetry hooks for unit runs and per-run summaries
//!
//! Telemetry is best effort. The engine calls the logger from the driving
//! thread only and discards any error it returns.

use crate::types::{ConfigurationIntent, ConfigurationUnit, ResultInformation, SetResultCode};
use anyhow::Result;
use uuid::Uuid;

/// Action name logged for desired-state tests
pub const TEST_ACTION: &str = "test";

/// Action name logged for applies
pub const APPLY_ACTION: &str = "apply";

/// How many units with a given last intent were seen, run and failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentSummary {
    pub intent: ConfigurationIntent,
    pub count: usize,
    pub run: usize,
    pub failed: usize,
}

impl IntentSummary {
    pub fn new(intent: ConfigurationIntent) -> Self {
        Self {
            intent,
            count: 0,
            run: 0,
            failed: 0,
        }
    }
}

/// Summary sent once per apply run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingSummary {
    pub set_id: Uuid,
    pub code: SetResultCode,
    /// One entry per intent, in `ConfigurationIntent::ALL` order
    pub intents: Vec<IntentSummary>,
}

impl ProcessingSummary {
    pub fn for_intent(&self, intent: ConfigurationIntent) -> Option<&IntentSummary> {
        self.intents.iter().find(|s| s.intent == intent)
    }
}

/// Receives completed unit outcomes
pub trait TelemetryLogger: Send + Sync {
    /// Called after every test or apply of a unit, whatever the outcome
    fn log_unit_run(
        &self,
        set_id: Uuid,
        unit: &ConfigurationUnit,
        intent: ConfigurationIntent,
        action: &str,
        result: &ResultInformation,
    ) -> Result<()>;

    /// Called once at the end of an apply run
    fn log_processing_summary(&self, _summary: &ProcessingSummary) -> Result<()> {
        Ok(())
    }
}

/// Telemetry logger that drops everything
pub struct NoTelemetry;

impl TelemetryLogger for NoTelemetry {
    fn log_unit_run(
        &self,
        _set_id: Uuid,
        _unit: &ConfigurationUnit,
        _intent: ConfigurationIntent,
        _action: &str,
        _result: &ResultInformation,
    ) -> Result<()> {
        Ok(())
    }
}

/// Telemetry logger that writes through the `log` facade
pub struct LogTelemetry;

impl TelemetryLogger for LogTelemetry {
    fn log_unit_run(
        &self,
        set_id: Uuid,
        unit: &ConfigurationUnit,
        intent: ConfigurationIntent,
        action: &str,
        result: &ResultInformation,
    ) -> Result<()> {
        log::debug!(
            target: "configset::telemetry",
            "set={} unit={} type={} intent={:?} action={} error={:?} source={:?}",
            set_id,
            unit.instance_identifier,
            unit.unit_type,
            intent,
            action,
            result.error,
            result.source
        );
        Ok(())
    }

    fn log_processing_summary(&self, summary: &ProcessingSummary) -> Result<()> {
        for s in &summary.intents {
            log::debug!(
                target: "configset::telemetry",
                "set={} code={:?} intent={:?} count={} run={} failed={}",
                summary.set_id,
                summary.code,
                s.intent,
                s.count,
                s.run,
                s.failed
            );
        }
        Ok(())
    }
}
