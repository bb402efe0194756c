//! Error types for the configset crate

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Outcome codes recorded on a single unit's result information
///
/// A unit whose result information carries no error succeeded.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitError {
    /// Another unit in the set uses the same identifier
    #[error("duplicate identifier")]
    DuplicateIdentifier,

    /// A dependency names an identifier that no unit carries
    #[error("missing dependency")]
    MissingDependency,

    /// A dependency did not complete successfully
    #[error("dependency unsatisfied")]
    DependencyUnsatisfied,

    /// The unit is marked inactive
    #[error("manually skipped")]
    ManuallySkipped,

    /// A member of an assertions group is not in the asserted state
    #[error("assertion failed")]
    AssertionFailed,

    /// The processor returned a test outcome the engine cannot act on
    #[error("unexpected test result")]
    Unexpected,

    /// Infrastructure failure while processing the unit
    #[error("internal error")]
    Internal,

    /// The run was cancelled while this unit was in flight
    #[error("operation cancelled")]
    Cancelled,

    /// Processor-defined failure code
    #[error("unit processor reported error code {0}")]
    Processor(i32),
}

/// Errors that abort a run before any unit can be attributed a result
#[derive(Error, Debug)]
pub enum EngineError {
    /// Two units share an instance identifier
    #[error("duplicate instance identifier: {0}")]
    DuplicateInstanceIdentifier(Uuid),

    /// More than one unit matched an identifier after duplicates were rejected
    #[error("identifier '{0}' matches more than one unit")]
    AmbiguousIdentifier(String),

    /// A group processor reported a result for a unit outside the set
    #[error("no unit with instance identifier {0}")]
    UnknownInstance(Uuid),
}

/// Marker returned when the progress sink requests cancellation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("configuration run cancelled")]
pub struct Cancelled;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
