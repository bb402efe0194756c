//! Unit graph - flattens a configuration set into one addressable arena
//!
//! Every unit of the set, group members included, gets exactly one
//! [`UnitNode`]. Nodes refer to each other by index into the arena, so
//! dependency links stay valid while nodes are mutated in place.

use crate::error::{EngineError, Result};
use crate::types::{ConfigurationIntent, ConfigurationSet, ConfigurationUnit, UnitResult};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Engine-side state for one unit
#[derive(Debug)]
pub struct UnitNode<'a> {
    pub unit: &'a ConfigurationUnit,
    /// Indices of the nodes this one depends on
    pub dependencies: Vec<usize>,
    /// Nodes that must be done before this one is scheduled: its own
    /// dependencies plus those of its members that point outside the group
    pub waits_on: Vec<usize>,
    pub preprocessed: bool,
    pub processed: bool,
    pub last_intent: ConfigurationIntent,
    pub result: UnitResult,
}

impl<'a> UnitNode<'a> {
    fn new(unit: &'a ConfigurationUnit) -> Self {
        Self {
            unit,
            dependencies: Vec::new(),
            waits_on: Vec::new(),
            preprocessed: false,
            processed: false,
            last_intent: ConfigurationIntent::Assert,
            result: UnitResult::new(unit.to_ref()),
        }
    }

    /// Processed and carrying no error
    pub fn processed_successfully(&self) -> bool {
        self.processed && self.result.succeeded()
    }
}

/// A dependency reference that matched no unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Node that declared the dependency
    pub node: usize,
    /// The identifier as written
    pub dependency: String,
}

/// Registry of all units in a set
#[derive(Debug)]
pub struct UnitGraph<'a> {
    nodes: Vec<UnitNode<'a>>,
    top_level: Vec<usize>,
    by_instance: HashMap<Uuid, usize>,
    by_identifier: HashMap<String, Vec<usize>>,
}

/// NFKC-normalized, case-folded form used for identifier comparison
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.nfkc().collect::<String>().to_lowercase()
}

impl<'a> UnitGraph<'a> {
    /// Register every unit of the set
    ///
    /// Group members are registered before the group that contains them.
    /// Fails if two units share an instance identifier.
    pub fn build(set: &'a ConfigurationSet) -> Result<Self> {
        let mut graph = Self {
            nodes: Vec::with_capacity(set.unit_count()),
            top_level: Vec::with_capacity(set.units.len()),
            by_instance: HashMap::new(),
            by_identifier: HashMap::new(),
        };
        graph.add_units(&set.units, true)?;
        Ok(graph)
    }

    fn add_units(&mut self, units: &'a [ConfigurationUnit], top_level: bool) -> Result<()> {
        for unit in units {
            self.add_units(unit.members(), false)?;

            let index = self.nodes.len();
            if self
                .by_instance
                .insert(unit.instance_identifier, index)
                .is_some()
            {
                return Err(EngineError::DuplicateInstanceIdentifier(
                    unit.instance_identifier,
                ));
            }

            if !unit.identifier.is_empty() {
                self.by_identifier
                    .entry(normalize_identifier(&unit.identifier))
                    .or_default()
                    .push(index);
            }

            self.nodes.push(UnitNode::new(unit));
            if top_level {
                self.top_level.push(index);
            }
        }
        Ok(())
    }

    /// Number of units carrying the identifier (case-insensitive)
    pub fn count_by_identifier(&self, identifier: &str) -> usize {
        self.by_identifier
            .get(&normalize_identifier(identifier))
            .map_or(0, Vec::len)
    }

    /// Resolve a dependency reference to exactly one node
    pub fn resolve_dependency(&self, identifier: &str) -> Result<Option<usize>> {
        match self
            .by_identifier
            .get(&normalize_identifier(identifier))
            .map(Vec::as_slice)
        {
            None | Some([]) => Ok(None),
            Some([index]) => Ok(Some(*index)),
            Some(_) => Err(EngineError::AmbiguousIdentifier(identifier.to_string())),
        }
    }

    /// Index of the node for an instance identifier
    pub fn index_of(&self, instance_identifier: &Uuid) -> Option<usize> {
        self.by_instance.get(instance_identifier).copied()
    }

    /// Index of the node for an instance identifier, or an error naming it
    pub fn require(&self, instance_identifier: &Uuid) -> Result<usize> {
        self.index_of(instance_identifier)
            .ok_or(EngineError::UnknownInstance(*instance_identifier))
    }

    /// Indices of nodes whose non-empty identifier is used more than once
    pub fn duplicate_identifiers(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                !node.unit.identifier.is_empty()
                    && self.count_by_identifier(&node.unit.identifier) > 1
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Resolve every node's dependency references into node indices
    ///
    /// Empty references are ignored. Resolution of a node stops at its first
    /// missing reference, which is returned; only one is reported per node.
    /// Also fills in every node's `waits_on`.
    pub fn link_dependencies(&mut self) -> Result<Vec<MissingDependency>> {
        let mut missing = Vec::new();

        for index in 0..self.nodes.len() {
            let unit = self.nodes[index].unit;
            let mut resolved = Vec::with_capacity(unit.dependencies.len());

            for dependency in unit.dependencies.iter().filter(|d| !d.is_empty()) {
                match self.resolve_dependency(dependency)? {
                    Some(target) => resolved.push(target),
                    None => {
                        missing.push(MissingDependency {
                            node: index,
                            dependency: dependency.clone(),
                        });
                        break;
                    }
                }
            }

            self.nodes[index].dependencies = resolved;
        }

        for index in 0..self.nodes.len() {
            let waits_on = self.external_dependencies(index);
            self.nodes[index].waits_on = waits_on;
        }

        Ok(missing)
    }

    /// A group runs its members itself, so it inherits every member
    /// dependency that leaves the group. A member depending on its own
    /// group makes the group wait on itself.
    fn external_dependencies(&self, index: usize) -> Vec<usize> {
        let mut waits_on = self.nodes[index].dependencies.clone();
        let members = self.descendants(index);

        for &member in &members {
            for &dependency in &self.nodes[member].dependencies {
                if !members.contains(&dependency) && !waits_on.contains(&dependency) {
                    waits_on.push(dependency);
                }
            }
        }
        waits_on
    }

    /// Indices of all members of a group, at any depth
    pub fn descendants(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_descendants(self.nodes[index].unit, &mut out);
        out
    }

    fn collect_descendants(&self, unit: &ConfigurationUnit, out: &mut Vec<usize>) {
        for member in unit.members() {
            if let Some(index) = self.index_of(&member.instance_identifier) {
                out.push(index);
            }
            self.collect_descendants(member, out);
        }
    }

    pub fn all_nodes(&self) -> &[UnitNode<'a>] {
        &self.nodes
    }

    /// Indices of the set's own units, in declaration order
    pub fn top_level(&self) -> &[usize] {
        &self.top_level
    }

    pub fn node(&self, index: usize) -> &UnitNode<'a> {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut UnitNode<'a> {
        &mut self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Snapshot of every unit's result, in registration order
    pub fn unit_results(&self) -> Vec<UnitResult> {
        self.nodes.iter().map(|n| n.result.clone()).collect()
    }
}
