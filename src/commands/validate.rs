//! `enact validate` - structural checks only

use anyhow::Result;
use configset::{ApplyEngine, NoProgress, NoTelemetry};

use crate::Context;
use crate::config;
use crate::processor::CommandProcessorFactory;
use crate::ui;

pub fn run(ctx: &Context, file: &str) -> Result<()> {
    let set = config::load_set(file)?;
    let plan = ApplyEngine::new(&CommandProcessorFactory, &NoTelemetry).plan(&set, &mut NoProgress)?;

    super::ensure_valid(&set, &plan)?;

    if !ctx.quiet {
        ui::success(&format!(
            "{} is valid ({} units)",
            set.name,
            set.unit_count()
        ));
    }
    Ok(())
}
