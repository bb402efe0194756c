//! `enact plan` - show processing order without running anything

use anyhow::Result;
use configset::{ApplyEngine, ApplyPlan, ConfigurationSet, NoProgress, NoTelemetry};

use crate::Context;
use crate::config;
use crate::processor::CommandProcessorFactory;
use crate::ui;

pub fn run(ctx: &Context, file: &str) -> Result<()> {
    let set = config::load_set(file)?;
    let plan = ApplyEngine::new(&CommandProcessorFactory, &NoTelemetry).plan(&set, &mut NoProgress)?;

    super::ensure_valid(&set, &plan)?;

    ui::header(&format!("Plan: {}", set.name));
    print_plan(&set, &plan, ctx.verbose > 0);
    Ok(())
}

/// Print the top-level units in processing order
pub fn print_plan(set: &ConfigurationSet, plan: &ApplyPlan, verbose: bool) {
    if plan.order.is_empty() {
        ui::info("Nothing to apply");
        return;
    }

    let total = plan.order.len();
    for (i, unit_ref) in plan.order.iter().enumerate() {
        ui::step(i + 1, total, &unit_ref.to_string());

        let Some(unit) = set
            .units
            .iter()
            .find(|u| u.instance_identifier == unit_ref.instance_identifier)
        else {
            continue;
        };

        if !unit.is_active {
            ui::dim("inactive, will be skipped");
        }
        for member in unit.members() {
            ui::dim(&format!("└ {}", member.to_ref()));
        }
        if verbose && !unit.dependencies.is_empty() {
            ui::kv("after", &unit.dependencies.join(", "));
        }
    }
}
