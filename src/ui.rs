use colored::Colorize;
use configset::SetResultCode;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// One-line description of a set result code
pub fn describe_code(code: SetResultCode) -> &'static str {
    match code {
        SetResultCode::Success => "all units are in their desired state",
        SetResultCode::NotImplemented => "parameters and variables are not supported",
        SetResultCode::DuplicateIdentifier => "two or more units share an identifier",
        SetResultCode::MissingDependency => "a dependency does not name any unit",
        SetResultCode::DependencyCycle => "units depend on each other in a cycle",
        SetResultCode::DependencyUnsatisfied => "some units were skipped",
        SetResultCode::SetApplyFailed => "one or more units failed",
        SetResultCode::Cancelled => "the run was cancelled",
    }
}
