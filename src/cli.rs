use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "enact")]
#[command(version)]
#[command(about = "Test and apply declarative configuration sets", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check a configuration set for structural errors
    Validate(SetArgs),

    /// Show the order units would be processed in
    Plan(SetArgs),

    /// Test every unit and apply the ones not in their desired state
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct SetArgs {
    /// Configuration set document (.json or .toml)
    pub file: String,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Configuration set document (.json or .toml)
    pub file: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// How often a running group checks for cancellation, in milliseconds
    #[arg(long, default_value = "50")]
    pub poll_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::parse_from(["enact", "-vv", "apply", "set.toml", "--yes"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.file, "set.toml");
                assert!(args.yes);
                assert_eq!(args.poll_ms, 50);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
