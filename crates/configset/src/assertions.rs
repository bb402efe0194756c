//! Built-in handler for assertions groups
//!
//! An assertions group only ever tests its members: the members describe
//! state that must already hold, and nothing is changed to make it hold.
//! "Applying" the group re-tests each member and fails any member that is
//! not in the asserted state.

use crate::error::UnitError;
use crate::processor::{
    ApplyGroupSettingsResult, ApplySettingsResult, CancellationToken, GroupProcessor,
    GroupProgress, ProcessorFactory, TestGroupSettingsResult, TestSettingsResult,
    UnitApplyResult, UnitTestResult,
};
use crate::types::{ConfigurationUnit, ResultInformation, ResultSource, TestOutcome};
use anyhow::Result;

/// Reserved unit type of the built-in assertions group
pub const ASSERTIONS_GROUP_TYPE: &str = "Enact.Configuration/AssertionsGroup";

/// Whether a unit should be handled by [`AssertionsGroup`]
pub fn is_assertions_group(unit: &ConfigurationUnit) -> bool {
    unit.is_group && unit.unit_type.eq_ignore_ascii_case(ASSERTIONS_GROUP_TYPE)
}

/// Group processor that asserts each active member
pub struct AssertionsGroup<'a> {
    unit: &'a ConfigurationUnit,
    factory: &'a dyn ProcessorFactory,
}

impl<'a> AssertionsGroup<'a> {
    pub fn new(unit: &'a ConfigurationUnit, factory: &'a dyn ProcessorFactory) -> Self {
        Self { unit, factory }
    }

    fn active_members(&self) -> impl Iterator<Item = &'a ConfigurationUnit> {
        self.unit.members().iter().filter(|m| m.is_active)
    }

    fn test_member(&self, member: &ConfigurationUnit) -> TestSettingsResult {
        let outcome = self
            .factory
            .create_unit_processor(member)
            .and_then(|processor| processor.test_settings());

        match outcome {
            Ok(result) => result,
            Err(e) => TestSettingsResult::failed(
                ResultInformation::failure(UnitError::Internal, ResultSource::Internal)
                    .with_description(format!("{e:#}")),
            ),
        }
    }
}

fn assertion_failed() -> ResultInformation {
    ResultInformation::failure(UnitError::AssertionFailed, ResultSource::Precondition)
        .with_description("The system is not in the asserted state")
}

impl GroupProcessor for AssertionsGroup<'_> {
    fn test_group_settings(&self, cancel: &CancellationToken) -> Result<TestGroupSettingsResult> {
        let mut unit_results = Vec::new();
        let mut aggregate = TestOutcome::Positive;
        let mut first_failure = None;

        for member in self.active_members() {
            if cancel.is_cancelled() {
                anyhow::bail!("assertions group test cancelled");
            }

            let result = self.test_member(member);
            match result.outcome {
                TestOutcome::Positive => {}
                TestOutcome::Negative => {
                    if aggregate == TestOutcome::Positive {
                        aggregate = TestOutcome::Negative;
                    }
                }
                _ => {
                    aggregate = TestOutcome::Failed;
                    first_failure.get_or_insert_with(|| result.result_information.clone());
                }
            }

            unit_results.push(UnitTestResult {
                instance_identifier: member.instance_identifier,
                outcome: result.outcome,
                result_information: result.result_information,
            });
        }

        let result = match first_failure {
            Some(info) => TestSettingsResult::failed(info),
            None => TestSettingsResult::with_outcome(aggregate),
        };
        Ok(TestGroupSettingsResult {
            result,
            unit_results,
        })
    }

    fn apply_group_settings(
        &self,
        progress: &GroupProgress,
        cancel: &CancellationToken,
    ) -> Result<ApplyGroupSettingsResult> {
        let mut unit_results = Vec::new();
        let mut all_held = true;

        for member in self.active_members() {
            if cancel.is_cancelled() {
                anyhow::bail!("assertions group apply cancelled");
            }

            progress.unit_started(member.instance_identifier);

            let tested = self.test_member(member);
            let result_information = match tested.outcome {
                TestOutcome::Positive => ResultInformation::default(),
                TestOutcome::Negative => assertion_failed(),
                TestOutcome::Failed => tested.result_information,
                _ => ResultInformation::failure(UnitError::Unexpected, ResultSource::Internal),
            };
            all_held &= result_information.succeeded();

            let unit_result = UnitApplyResult {
                instance_identifier: member.instance_identifier,
                result_information,
                reboot_required: false,
            };
            progress.unit_completed(unit_result.clone());
            unit_results.push(unit_result);
        }

        let result = if all_held {
            ApplySettingsResult::success()
        } else {
            ApplySettingsResult::failed(assertion_failed())
        };
        Ok(ApplyGroupSettingsResult {
            result,
            unit_results,
        })
    }
}
