//! `enact apply` - converge the system to a configuration set

use anyhow::{Result, bail};
use colored::Colorize;
use configset::{
    ApplyEngine, Cancellable, CancellationToken, EngineOptions, LogTelemetry, NoProgress,
    ProgressSink, SetResult, UnitState,
};
use std::time::Duration;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config;
use crate::processor::CommandProcessorFactory;
use crate::progress::TerminalProgress;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let set = config::load_set(&args.file)?;
    let engine = ApplyEngine::new(&CommandProcessorFactory, &LogTelemetry).with_options(
        EngineOptions {
            poll_interval: Duration::from_millis(args.poll_ms),
        },
    );

    let plan = engine.plan(&set, &mut NoProgress)?;
    super::ensure_valid(&set, &plan)?;

    if !ctx.quiet {
        ui::header(&format!("Apply: {}", set.name));
        super::plan::print_plan(&set, &plan, ctx.verbose > 0);
    }
    if plan.order.is_empty() {
        return Ok(());
    }

    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    println!();
    let mut progress = interruptible(TerminalProgress::new(ctx.verbose > 0), ctrl_c_token());
    let result = engine.apply(&set, &mut progress)?;

    print_summary(&result);

    if !result.code.is_success() {
        super::report_failures(&result);
        bail!("Apply failed: {}", ui::describe_code(result.code));
    }
    ui::success(ui::describe_code(result.code));
    Ok(())
}

fn print_summary(result: &SetResult) {
    let applied = result
        .unit_results
        .iter()
        .filter(|r| r.state == UnitState::Completed && r.succeeded() && !r.previously_in_desired_state)
        .count();
    let unchanged = result
        .unit_results
        .iter()
        .filter(|r| r.previously_in_desired_state)
        .count();

    println!();
    ui::kv("applied", &applied.to_string());
    ui::kv("unchanged", &unchanged.to_string());
    ui::kv("failed or skipped", &result.failed_count().to_string());

    if result.unit_results.iter().any(|r| r.reboot_required) {
        ui::warn("A reboot is required to finish applying this configuration");
    }
}

/// Stop the run at the next unit boundary once `token` is tripped
fn interruptible<S: ProgressSink>(sink: S, token: CancellationToken) -> Cancellable<S> {
    Cancellable::new(sink, token)
}

/// Token tripped by the first Ctrl-C; a second one exits immediately
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handler = token.clone();

    let installed = ctrlc::set_handler(move || {
        if handler.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!();
        ui::warn("Cancelling after the current unit (Ctrl-C again to abort)");
        handler.cancel();
    });
    if let Err(e) = installed {
        log::warn!("Could not install Ctrl-C handler: {e}");
    }
    token
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
