//! Scriptable processors shared by the crate's tests

use crate::error::UnitError;
use crate::processor::{
    ApplyGroupSettingsResult, ApplySettingsResult, CancellationToken, GroupProcessor,
    GroupProgress, ProcessorFactory, TestGroupSettingsResult, TestSettingsResult,
    UnitApplyResult, UnitProcessor, UnitTestResult,
};
use crate::types::{ConfigurationUnit, ResultInformation, ResultSource, TestOutcome};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Script for a group processor
#[derive(Debug, Clone, Default)]
pub struct GroupScript {
    /// Aggregate test outcome; members test Negative unless listed in `positive`
    pub test: Option<TestOutcome>,
    /// Members reported Positive by the group test
    pub positive: Vec<String>,
    /// Members streamed (started + completed) before the apply returns
    pub stream: Vec<String>,
    /// Members included in the final apply result
    pub final_members: Vec<String>,
    pub fail_apply: bool,
    /// Report a member the set does not contain
    pub stray_member: bool,
    /// Test blocks until its token is cancelled, then errors
    pub block_test: bool,
    /// Apply blocks, after streaming, until its token is cancelled, then errors
    pub block_apply: bool,
    /// Tripped right before blocking, like a user pressing Ctrl-C
    pub trip: Option<CancellationToken>,
    /// Apply leaves a copy of its progress handle alive this long after returning
    pub linger: Option<Duration>,
}

/// How a mocked unit behaves
#[derive(Debug, Clone)]
pub struct Behavior {
    pub outcome: TestOutcome,
    pub test_error: bool,
    pub panic_on_test: bool,
    pub apply_error: Option<i32>,
    pub reboot: bool,
    pub creation_fails: bool,
    pub cancel_on_test: Option<CancellationToken>,
    pub group: Option<GroupScript>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            outcome: TestOutcome::Positive,
            test_error: false,
            panic_on_test: false,
            apply_error: None,
            reboot: false,
            creation_fails: false,
            cancel_on_test: None,
            group: None,
        }
    }
}

impl Behavior {
    /// Test Negative, apply succeeds
    pub fn apply_ok() -> Self {
        Self::default().testing_negative()
    }

    /// Test Negative, apply reports a processor error
    pub fn apply_fails() -> Self {
        Self {
            apply_error: Some(5),
            ..Self::apply_ok()
        }
    }

    pub fn test_fails() -> Self {
        Self::default().with_outcome(TestOutcome::Failed)
    }

    pub fn test_errors() -> Self {
        Self {
            test_error: true,
            ..Self::default()
        }
    }

    pub fn test_panics() -> Self {
        Self {
            panic_on_test: true,
            ..Self::default()
        }
    }

    pub fn creation_fails() -> Self {
        Self {
            creation_fails: true,
            ..Self::default()
        }
    }

    pub fn group(script: GroupScript) -> Self {
        Self {
            group: Some(script),
            ..Self::default()
        }
    }

    pub fn testing_negative(self) -> Self {
        self.with_outcome(TestOutcome::Negative)
    }

    pub fn with_outcome(mut self, outcome: TestOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_reboot(mut self) -> Self {
        self.reboot = true;
        self
    }

    /// Trip `token` when the unit is tested
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_test = Some(token);
        self
    }
}

type CallLog = Arc<Mutex<Vec<String>>>;

/// Factory handing out scripted processors keyed by unit identifier
///
/// Units without a script are already in the desired state.
#[derive(Default)]
pub struct MockFactory {
    behaviors: HashMap<String, Behavior>,
    calls: CallLog,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identifier: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(identifier.to_string(), behavior);
        self
    }

    /// Every test/apply call so far, as "action:identifier"
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls of the given action
    pub fn count(&self, action: &str) -> usize {
        let prefix = format!("{action}:");
        self.calls()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }
}

impl ProcessorFactory for MockFactory {
    fn create_unit_processor(&self, unit: &ConfigurationUnit) -> Result<Box<dyn UnitProcessor>> {
        let behavior = self
            .behaviors
            .get(&unit.identifier)
            .cloned()
            .unwrap_or_default();

        if behavior.creation_fails {
            anyhow::bail!("no processor for {}", unit.identifier);
        }

        let members = unit
            .members()
            .iter()
            .map(|m| (m.identifier.clone(), m.instance_identifier))
            .collect();

        Ok(Box::new(MockProcessor {
            identifier: unit.identifier.clone(),
            behavior,
            members,
            calls: Arc::clone(&self.calls),
        }))
    }
}

#[derive(Debug)]
struct MockProcessor {
    identifier: String,
    behavior: Behavior,
    members: Vec<(String, Uuid)>,
    calls: CallLog,
}

impl MockProcessor {
    fn record(&self, action: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{action}:{}", self.identifier));
    }

    fn member(&self, identifier: &str) -> Uuid {
        self.members
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, uuid)| *uuid)
            .unwrap_or_else(|| panic!("{identifier} is not a member of {}", self.identifier))
    }

    fn script(&self) -> &GroupScript {
        self.behavior.group.as_ref().unwrap()
    }

    /// Wait for the engine to cancel `cancel`, giving up after a few seconds
    fn block_until_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if let Some(trip) = &self.script().trip {
            trip.cancel();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while !cancel.is_cancelled() {
            if Instant::now() > deadline {
                anyhow::bail!("{} was never cancelled", self.identifier);
            }
            thread::sleep(Duration::from_millis(1));
        }
        anyhow::bail!("{} stopped on cancellation", self.identifier)
    }
}

impl UnitProcessor for MockProcessor {
    fn test_settings(&self) -> Result<TestSettingsResult> {
        self.record("test");
        if let Some(token) = &self.behavior.cancel_on_test {
            token.cancel();
        }
        if self.behavior.panic_on_test {
            panic!("processor blew up");
        }
        if self.behavior.test_error {
            anyhow::bail!("test could not run");
        }

        Ok(match self.behavior.outcome {
            TestOutcome::Failed => TestSettingsResult::failed(
                ResultInformation::failure(UnitError::Processor(7), ResultSource::SystemState)
                    .with_description("test failed"),
            ),
            outcome => TestSettingsResult::with_outcome(outcome),
        })
    }

    fn apply_settings(&self) -> Result<ApplySettingsResult> {
        self.record("apply");
        let result = match self.behavior.apply_error {
            Some(code) => ApplySettingsResult::failed(ResultInformation::failure(
                UnitError::Processor(code),
                ResultSource::UnitProcessing,
            )),
            None => ApplySettingsResult::success(),
        };
        Ok(ApplySettingsResult {
            reboot_required: self.behavior.reboot,
            ..result
        })
    }

    fn as_group(&self) -> Option<&dyn GroupProcessor> {
        self.behavior.group.as_ref().map(|_| self as &dyn GroupProcessor)
    }
}

impl GroupProcessor for MockProcessor {
    fn test_group_settings(&self, cancel: &CancellationToken) -> Result<TestGroupSettingsResult> {
        self.record("test_group");
        let script = self.script();
        if script.block_test {
            self.block_until_cancelled(cancel)?;
        }

        let unit_results = self
            .members
            .iter()
            .map(|(identifier, instance_identifier)| UnitTestResult {
                instance_identifier: *instance_identifier,
                outcome: if script.positive.contains(identifier) {
                    TestOutcome::Positive
                } else {
                    TestOutcome::Negative
                },
                result_information: ResultInformation::default(),
            })
            .collect();

        Ok(TestGroupSettingsResult {
            result: TestSettingsResult::with_outcome(script.test.unwrap_or(TestOutcome::Negative)),
            unit_results,
        })
    }

    fn apply_group_settings(
        &self,
        progress: &GroupProgress,
        cancel: &CancellationToken,
    ) -> Result<ApplyGroupSettingsResult> {
        self.record("apply_group");
        let script = self.script();
        let success = |instance_identifier| UnitApplyResult {
            instance_identifier,
            result_information: ResultInformation::default(),
            reboot_required: false,
        };

        for identifier in &script.stream {
            let id = self.member(identifier);
            progress.unit_started(id);
            progress.unit_completed(success(id));
        }
        if script.stray_member {
            progress.unit_completed(success(Uuid::new_v4()));
        }
        if script.block_apply {
            self.block_until_cancelled(cancel)?;
        }
        if let Some(linger) = script.linger {
            let held = progress.clone();
            thread::spawn(move || {
                thread::sleep(linger);
                drop(held);
            });
        }

        let unit_results = script
            .final_members
            .iter()
            .map(|identifier| success(self.member(identifier)))
            .collect();

        let result = if script.fail_apply {
            ApplySettingsResult::failed(ResultInformation::failure(
                UnitError::Processor(9),
                ResultSource::UnitProcessing,
            ))
        } else {
            ApplySettingsResult::success().with_reboot()
        };

        Ok(ApplyGroupSettingsResult {
            result,
            unit_results,
        })
    }
}
