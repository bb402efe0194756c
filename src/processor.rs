//! Built-in `command` unit processor
//!
//! A `command` unit carries two shell command lines in its settings:
//!
//! - `test`: exits 0 when the system is already in the desired state
//! - `apply`: brings the system into the desired state
//!
//! A unit without `test` is always applied. `reboot_required = true` is
//! reported back after a successful apply.

use anyhow::{Result, bail};
use configset::{
    ApplySettingsResult, ConfigurationUnit, ProcessorFactory, ResultInformation, ResultSource,
    TestSettingsResult, UnitError, UnitProcessor, ValueSet, is_assertions_group,
};
use serde_json::Value;

use crate::runner;

/// Unit type handled by [`CommandProcessor`]
pub const COMMAND_UNIT_TYPE: &str = "command";

/// Creates processors for the unit types the CLI understands
pub struct CommandProcessorFactory;

impl ProcessorFactory for CommandProcessorFactory {
    fn create_unit_processor(&self, unit: &ConfigurationUnit) -> Result<Box<dyn UnitProcessor>> {
        // Assertions groups are run by the engine itself; only their members
        // need real processors
        if is_assertions_group(unit) {
            return Ok(Box::new(CommandProcessor::default()));
        }

        if !unit.unit_type.eq_ignore_ascii_case(COMMAND_UNIT_TYPE) {
            bail!("Unsupported unit type '{}' for {}", unit.unit_type, unit.to_ref());
        }

        Ok(Box::new(CommandProcessor::from_settings(&unit.settings)?))
    }
}

#[derive(Debug, Default)]
pub struct CommandProcessor {
    test: Option<String>,
    apply: Option<String>,
    reboot_required: bool,
}

impl CommandProcessor {
    pub fn from_settings(settings: &ValueSet) -> Result<Self> {
        let reboot_required = match settings.get("reboot_required") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => bail!("Setting 'reboot_required' must be a boolean, got {other}"),
        };

        Ok(Self {
            test: string_setting(settings, "test")?,
            apply: string_setting(settings, "apply")?,
            reboot_required,
        })
    }
}

fn string_setting(settings: &ValueSet, name: &str) -> Result<Option<String>> {
    match settings.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => bail!("Setting '{name}' must be a string, got {other}"),
    }
}

impl UnitProcessor for CommandProcessor {
    fn test_settings(&self) -> Result<TestSettingsResult> {
        let Some(test) = &self.test else {
            return Ok(TestSettingsResult::negative());
        };

        let output = runner::run_shell(test)?;
        Ok(if output.success {
            TestSettingsResult::positive()
        } else {
            TestSettingsResult::negative()
        })
    }

    fn apply_settings(&self) -> Result<ApplySettingsResult> {
        let Some(apply) = &self.apply else {
            return Ok(ApplySettingsResult::failed(
                ResultInformation::failure(UnitError::Internal, ResultSource::UnitProcessing)
                    .with_description("No 'apply' command configured"),
            ));
        };

        let output = runner::run_shell(apply)?;
        if output.success {
            let result = ApplySettingsResult::success();
            return Ok(if self.reboot_required {
                result.with_reboot()
            } else {
                result
            });
        }

        let code = output.code.unwrap_or(-1);
        Ok(ApplySettingsResult::failed(
            ResultInformation::failure(UnitError::Processor(code), ResultSource::UnitProcessing)
                .with_description(format!("'{apply}' exited with code {code}"))
                .with_details(output.stderr),
        ))
    }
}
