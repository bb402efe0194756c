//! # Configset
//!
//! An engine for applying configuration sets: ordered collections of
//! configuration units, each describing a desired state of some part of a
//! system.
//!
//! The engine itself knows nothing about resources. It validates the set,
//! orders units by their declared dependencies, and drives test/apply calls
//! through caller-supplied processors, reporting every transition as it goes.
//!
//! ## Core Concepts
//!
//! - **ConfigurationUnit**: One desired state, optionally a group of member units
//! - **ProcessorFactory**: Creates the processor that tests and applies a unit
//! - **ApplyEngine**: Validates, orders and applies a set
//! - **ProgressSink**: Receives progress events and can cancel a run
//! - **SetResult**: Per-unit outcomes and an overall result code
//!
//! ## Example
//!
//! ```ignore
//! use configset::{
//!     ApplyEngine, ConfigurationSet, ConfigurationUnit, NoTelemetry, RecordingProgress,
//! };
//!
//! let set = ConfigurationSet::new(vec![
//!     ConfigurationUnit::new("File").with_identifier("config").depends_on(["dir"]),
//!     ConfigurationUnit::new("Directory").with_identifier("dir"),
//! ]);
//!
//! let engine = ApplyEngine::new(&MyFactory, &NoTelemetry);
//! let mut progress = RecordingProgress::new();
//! let result = engine.apply(&set, &mut progress)?;
//!
//! println!("{}: {} failed", result.code, result.failed_count());
//! ```

pub mod assertions;
pub mod engine;
pub mod error;
pub mod graph;
pub mod processor;
pub mod progress;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export main types at crate root
pub use assertions::{ASSERTIONS_GROUP_TYPE, AssertionsGroup, is_assertions_group};
pub use engine::{ApplyEngine, ApplyPlan, EngineOptions};
pub use error::{Cancelled, EngineError, UnitError};
pub use processor::{
    ApplyGroupSettingsResult, ApplySettingsResult, CancellationToken, GroupEvent,
    GroupProcessor, GroupProgress, ProcessorFactory, TestGroupSettingsResult,
    TestSettingsResult, UnitApplyResult, UnitProcessor, UnitTestResult,
};
pub use progress::{Cancellable, ConfigurationChange, NoProgress, ProgressSink, RecordingProgress};
pub use telemetry::{LogTelemetry, NoTelemetry, ProcessingSummary, TelemetryLogger};
pub use types::{
    ConfigurationIntent, ConfigurationParameter, ConfigurationSet, ConfigurationUnit,
    ResultInformation, ResultSource, SetResult, SetResultCode, SetState, TestOutcome, UnitRef,
    UnitResult, UnitState, ValueSet,
};
