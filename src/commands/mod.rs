//! Subcommand implementations

pub mod apply;
pub mod plan;
pub mod validate;

use anyhow::{Result, bail};
use configset::{ApplyPlan, ConfigurationSet, SetResult};

use crate::progress::reason;
use crate::ui;

/// Print every unit that carries an error
pub fn report_failures(result: &SetResult) {
    for unit in result.unit_results.iter().filter(|r| !r.succeeded()) {
        ui::kv(&unit.unit.to_string(), &reason(&unit.result_information));
    }
}

/// Fail with a per-unit report unless pre-processing accepted the set
pub fn ensure_valid(set: &ConfigurationSet, plan: &ApplyPlan) -> Result<()> {
    if plan.is_valid() {
        return Ok(());
    }

    ui::error(&format!(
        "{}: {}",
        set.name,
        ui::describe_code(plan.result.code)
    ));
    report_failures(&plan.result);
    bail!("'{}' is not a valid configuration set ({})", set.name, plan.result.code)
}
