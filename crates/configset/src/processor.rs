//! Processor traits for testing and applying configuration units
//!
//! The engine does not know how to test or apply any resource itself. A
//! [`ProcessorFactory`] supplied by the caller creates one [`UnitProcessor`]
//! per unit. Processors that can handle a whole group of units at once
//! expose a [`GroupProcessor`] through [`UnitProcessor::as_group`].
//!
//! # Example
//!
//! ```ignore
//! use configset::{
//!     ConfigurationUnit, ProcessorFactory, UnitProcessor, TestSettingsResult,
//!     ApplySettingsResult,
//! };
//!
//! #[derive(Debug)]
//! struct FileExists { path: String }
//!
//! impl UnitProcessor for FileExists {
//!     fn test_settings(&self) -> anyhow::Result<TestSettingsResult> {
//!         if std::path::Path::new(&self.path).exists() {
//!             Ok(TestSettingsResult::positive())
//!         } else {
//!             Ok(TestSettingsResult::negative())
//!         }
//!     }
//!
//!     fn apply_settings(&self) -> anyhow::Result<ApplySettingsResult> {
//!         std::fs::write(&self.path, "")?;
//!         Ok(ApplySettingsResult::success())
//!     }
//! }
//!
//! struct Factory;
//!
//! impl ProcessorFactory for Factory {
//!     fn create_unit_processor(
//!         &self,
//!         unit: &ConfigurationUnit,
//!     ) -> anyhow::Result<Box<dyn UnitProcessor>> {
//!         let path = unit.settings.get("path").and_then(|v| v.as_str());
//!         match path {
//!             Some(p) => Ok(Box::new(FileExists { path: p.to_string() })),
//!             None => anyhow::bail!("file unit needs a path"),
//!         }
//!     }
//! }
//! ```

use crate::types::{ConfigurationUnit, ResultInformation, TestOutcome};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use uuid::Uuid;

/// Creates the processor that handles a unit
///
/// Creation may be slow (out-of-process, remote) and may fail per unit.
pub trait ProcessorFactory: Send + Sync {
    fn create_unit_processor(&self, unit: &ConfigurationUnit) -> Result<Box<dyn UnitProcessor>>;
}

/// Tests and applies the settings of a single unit
pub trait UnitProcessor: Send + Sync + fmt::Debug {
    /// Determine whether the system is already in the desired state
    fn test_settings(&self) -> Result<TestSettingsResult>;

    /// Bring the system into the desired state
    fn apply_settings(&self) -> Result<ApplySettingsResult>;

    /// Group capability, if this processor can handle a unit's members
    ///
    /// Processors for ordinary resources keep the default.
    fn as_group(&self) -> Option<&dyn GroupProcessor> {
        None
    }
}

/// Tests and applies all members of a group unit as one operation
///
/// Both operations may run for a long time. Implementations should check
/// the token between members and stop early once it is cancelled.
pub trait GroupProcessor: Send + Sync {
    /// Test every member, returning the aggregate plus per-member outcomes
    fn test_group_settings(&self, cancel: &CancellationToken) -> Result<TestGroupSettingsResult>;

    /// Apply the group, reporting members through `progress` as they finish
    fn apply_group_settings(
        &self,
        progress: &GroupProgress,
        cancel: &CancellationToken,
    ) -> Result<ApplyGroupSettingsResult>;
}

/// Result of a unit test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSettingsResult {
    pub outcome: TestOutcome,
    pub result_information: ResultInformation,
}

impl TestSettingsResult {
    pub fn positive() -> Self {
        Self::with_outcome(TestOutcome::Positive)
    }

    pub fn negative() -> Self {
        Self::with_outcome(TestOutcome::Negative)
    }

    /// The test could not be performed
    pub fn failed(result_information: ResultInformation) -> Self {
        Self {
            outcome: TestOutcome::Failed,
            result_information,
        }
    }

    pub fn with_outcome(outcome: TestOutcome) -> Self {
        Self {
            outcome,
            result_information: ResultInformation::default(),
        }
    }
}

/// Result of a unit apply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplySettingsResult {
    pub result_information: ResultInformation,
    pub reboot_required: bool,
}

impl ApplySettingsResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failed(result_information: ResultInformation) -> Self {
        Self {
            result_information,
            reboot_required: false,
        }
    }

    pub fn with_reboot(mut self) -> Self {
        self.reboot_required = true;
        self
    }
}

/// Test outcome for one group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitTestResult {
    pub instance_identifier: Uuid,
    pub outcome: TestOutcome,
    pub result_information: ResultInformation,
}

/// Apply outcome for one group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitApplyResult {
    pub instance_identifier: Uuid,
    pub result_information: ResultInformation,
    pub reboot_required: bool,
}

/// Result of testing a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestGroupSettingsResult {
    pub result: TestSettingsResult,
    pub unit_results: Vec<UnitTestResult>,
}

/// Result of applying a group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyGroupSettingsResult {
    pub result: ApplySettingsResult,
    pub unit_results: Vec<UnitApplyResult>,
}

/// Incremental notification from a running group apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    /// A member started applying
    UnitStarted(Uuid),
    /// A member finished applying
    UnitCompleted(UnitApplyResult),
}

/// Sending half of a group apply's progress stream
///
/// The engine is the only receiver. Reporting after the engine stopped
/// listening is silently ignored.
#[derive(Debug, Clone)]
pub struct GroupProgress {
    tx: Sender<GroupEvent>,
}

impl GroupProgress {
    pub fn new(tx: Sender<GroupEvent>) -> Self {
        Self { tx }
    }

    /// Report that a member started
    pub fn unit_started(&self, instance_identifier: Uuid) {
        let _ = self.tx.send(GroupEvent::UnitStarted(instance_identifier));
    }

    /// Report a member's final result
    pub fn unit_completed(&self, result: UnitApplyResult) {
        let _ = self.tx.send(GroupEvent::UnitCompleted(result));
    }
}

/// Cooperative cancellation flag shared between threads
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
