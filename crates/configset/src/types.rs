//! Core types for configuration sets, units and their results

use crate::error::UnitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque property bag handed through to processors
pub type ValueSet = serde_json::Map<String, serde_json::Value>;

/// The schema version stamped on sets built in code
pub const LATEST_SCHEMA_VERSION: &str = "0.3";

/// A single declarative resource instance to test and apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationUnit {
    /// Resource kind, resolved by the processor factory
    #[serde(rename = "type")]
    pub unit_type: String,

    /// Globally unique, never reassigned
    #[serde(default = "Uuid::new_v4")]
    pub instance_identifier: Uuid,

    /// User-facing name that dependencies refer to; may be empty
    #[serde(default)]
    pub identifier: String,

    /// Identifiers of units that must succeed before this one runs
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub is_group: bool,

    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Members of a group; ignored unless `is_group` is set
    #[serde(default)]
    pub units: Vec<ConfigurationUnit>,

    #[serde(default)]
    pub metadata: ValueSet,

    #[serde(default)]
    pub settings: ValueSet,
}

fn default_active() -> bool {
    true
}

impl ConfigurationUnit {
    /// Create an active, non-group unit of the given type
    pub fn new(unit_type: impl Into<String>) -> Self {
        Self {
            unit_type: unit_type.into(),
            instance_identifier: Uuid::new_v4(),
            identifier: String::new(),
            dependencies: Vec::new(),
            is_group: false,
            is_active: true,
            units: Vec::new(),
            metadata: ValueSet::new(),
            settings: ValueSet::new(),
        }
    }

    /// Set the identifier other units use to depend on this one
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Add dependencies by identifier
    pub fn depends_on<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(identifiers.into_iter().map(Into::into));
        self
    }

    /// Turn the unit into a group containing `units`
    pub fn with_units(mut self, units: Vec<ConfigurationUnit>) -> Self {
        self.is_group = true;
        self.units = units;
        self
    }

    /// Mark the unit inactive so it is skipped
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Insert a setting value
    pub fn with_setting(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Members of the unit when it is a group
    pub fn members(&self) -> &[ConfigurationUnit] {
        if self.is_group { &self.units } else { &[] }
    }

    /// Lightweight reference used in results and progress events
    pub fn to_ref(&self) -> UnitRef {
        UnitRef {
            instance_identifier: self.instance_identifier,
            identifier: self.identifier.clone(),
            unit_type: self.unit_type.clone(),
        }
    }
}

/// A declared set parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub is_secure: bool,
}

/// An ordered collection of units applied together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSet {
    #[serde(default)]
    pub name: String,

    /// Where the set came from (a URL, a package, ...)
    #[serde(default)]
    pub origin: String,

    #[serde(default)]
    pub path: String,

    #[serde(default = "Uuid::new_v4")]
    pub instance_identifier: Uuid,

    #[serde(default = "latest_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub units: Vec<ConfigurationUnit>,

    #[serde(default)]
    pub metadata: ValueSet,

    /// Not supported by the engine yet
    #[serde(default)]
    pub parameters: Vec<ConfigurationParameter>,

    /// Not supported by the engine yet
    #[serde(default)]
    pub variables: ValueSet,
}

fn latest_schema_version() -> String {
    LATEST_SCHEMA_VERSION.to_string()
}

impl ConfigurationSet {
    /// Create a set from top-level units
    pub fn new(units: Vec<ConfigurationUnit>) -> Self {
        Self {
            name: String::new(),
            origin: String::new(),
            path: String::new(),
            instance_identifier: Uuid::new_v4(),
            schema_version: latest_schema_version(),
            units,
            metadata: ValueSet::new(),
            parameters: Vec::new(),
            variables: ValueSet::new(),
        }
    }

    /// Total number of units, group members included
    pub fn unit_count(&self) -> usize {
        fn count(units: &[ConfigurationUnit]) -> usize {
            units.iter().map(|u| 1 + count(u.members())).sum()
        }
        count(&self.units)
    }
}

/// Identity of a unit as carried by results and progress
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    pub instance_identifier: Uuid,
    pub identifier: String,
    pub unit_type: String,
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.identifier.is_empty() {
            write!(f, "{} [{}]", self.unit_type, self.instance_identifier)
        } else {
            write!(f, "{} ({})", self.identifier, self.unit_type)
        }
    }
}

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResultSource {
    #[default]
    None,
    /// The engine or its infrastructure
    Internal,
    /// The structure of the set itself
    ConfigurationSet,
    /// A condition checked before running the unit
    Precondition,
    /// The system is not in a state the unit can work with
    SystemState,
    /// The unit processor
    UnitProcessing,
}

/// Normalized outcome record for a unit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultInformation {
    pub error: Option<UnitError>,
    pub source: ResultSource,
    pub description: String,
    pub details: String,
}

impl ResultInformation {
    /// A failure with the given code and source
    pub fn failure(error: UnitError, source: ResultSource) -> Self {
        Self {
            error: Some(error),
            source,
            description: String::new(),
            details: String::new(),
        }
    }

    /// Attach a human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach free-form details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Why a unit is being run; recorded per unit for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigurationIntent {
    /// Only tested
    #[default]
    Assert,
    /// Only read
    Inform,
    /// Tested and applied when drifted
    Apply,
}

impl ConfigurationIntent {
    pub const ALL: [ConfigurationIntent; 3] = [Self::Assert, Self::Inform, Self::Apply];
}

/// Outcome of a desired-state test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    /// The processor could not tell
    Unknown,
    /// Already in the desired state
    Positive,
    /// Not in the desired state; apply is needed
    Negative,
    /// The test itself failed
    Failed,
    /// The test was not run
    NotRun,
}

/// Progress state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

/// Progress state of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SetState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// Result of one unit in an apply run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitResult {
    pub unit: UnitRef,
    pub state: UnitState,
    pub previously_in_desired_state: bool,
    pub reboot_required: bool,
    pub result_information: ResultInformation,
}

impl UnitResult {
    pub fn new(unit: UnitRef) -> Self {
        Self {
            unit,
            state: UnitState::NotStarted,
            previously_in_desired_state: false,
            reboot_required: false,
            result_information: ResultInformation::default(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result_information.succeeded()
    }
}

/// Set-level outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SetResultCode {
    #[default]
    Success,
    /// Parameters or variables were declared
    NotImplemented,
    DuplicateIdentifier,
    MissingDependency,
    DependencyCycle,
    /// Units were skipped because a dependency did not succeed
    DependencyUnsatisfied,
    /// At least one unit failed
    SetApplyFailed,
    Cancelled,
}

impl SetResultCode {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether the set was rejected before any unit ran
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NotImplemented
                | Self::DuplicateIdentifier
                | Self::MissingDependency
                | Self::DependencyCycle
        )
    }
}

impl fmt::Display for SetResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::NotImplemented => "parameters and variables are not implemented",
            Self::DuplicateIdentifier => "duplicate unit identifier",
            Self::MissingDependency => "missing dependency",
            Self::DependencyCycle => "dependency cycle",
            Self::DependencyUnsatisfied => "dependency unsatisfied",
            Self::SetApplyFailed => "one or more units failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Aggregated result of applying a set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResult {
    pub code: SetResultCode,
    /// Every unit in the set, group members included
    pub unit_results: Vec<UnitResult>,
}

impl SetResult {
    /// Find a unit's result by its identifier (case-insensitive)
    pub fn find(&self, identifier: &str) -> Option<&UnitResult> {
        let wanted = identifier.to_lowercase();
        self.unit_results
            .iter()
            .find(|r| !r.unit.identifier.is_empty() && r.unit.identifier.to_lowercase() == wanted)
    }

    /// Number of units whose result carries an error
    pub fn failed_count(&self) -> usize {
        self.unit_results.iter().filter(|r| !r.succeeded()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_defaults_from_json() {
        let unit: ConfigurationUnit =
            serde_json::from_str(r#"{ "type": "command", "identifier": "a" }"#).unwrap();
        assert!(unit.is_active);
        assert!(!unit.is_group);
        assert!(unit.dependencies.is_empty());
        assert!(!unit.instance_identifier.is_nil());
    }

    #[test]
    fn test_members_only_for_groups() {
        let mut unit = ConfigurationUnit::new("x");
        unit.units.push(ConfigurationUnit::new("y"));
        assert!(unit.members().is_empty());

        let group = ConfigurationUnit::new("x").with_units(vec![ConfigurationUnit::new("y")]);
        assert_eq!(group.members().len(), 1);
    }

    #[test]
    fn test_unit_count_includes_nested() {
        let set = ConfigurationSet::new(vec![
            ConfigurationUnit::new("a"),
            ConfigurationUnit::new("g").with_units(vec![
                ConfigurationUnit::new("b"),
                ConfigurationUnit::new("g2").with_units(vec![ConfigurationUnit::new("c")]),
            ]),
        ]);
        assert_eq!(set.unit_count(), 5);
    }

    #[test]
    fn test_structural_codes() {
        assert!(SetResultCode::DependencyCycle.is_structural());
        assert!(!SetResultCode::SetApplyFailed.is_structural());
        assert!(SetResultCode::Success.is_success());
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let unit = ConfigurationUnit::new("t").with_identifier("Alpha");
        let result = SetResult {
            code: SetResultCode::Success,
            unit_results: vec![UnitResult::new(unit.to_ref())],
        };
        assert!(result.find("alpha").is_some());
        assert!(result.find("beta").is_none());
    }
}
