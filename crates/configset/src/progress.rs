//! Progress reporting and cancellation
//!
//! The engine reports every state transition to a [`ProgressSink`] and asks
//! the same sink whether the run has been cancelled. Sinks never influence
//! the outcome: an error returned from [`ProgressSink::on_change`] is logged
//! and ignored.

use crate::processor::CancellationToken;
use crate::types::{ResultInformation, SetState, UnitRef, UnitState};
use anyhow::Result;

/// A single progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationChange {
    /// The set as a whole changed state
    SetState(SetState),
    /// A unit changed state
    UnitState {
        state: UnitState,
        unit: UnitRef,
        /// Snapshot at the time of the transition
        result_information: ResultInformation,
    },
}

impl ConfigurationChange {
    /// The unit this event is about, if any
    pub fn unit(&self) -> Option<&UnitRef> {
        match self {
            Self::SetState(_) => None,
            Self::UnitState { unit, .. } => Some(unit),
        }
    }
}

/// Receives progress events during a run
pub trait ProgressSink {
    /// Called on every set or unit state transition
    fn on_change(&mut self, change: &ConfigurationChange) -> Result<()>;

    /// Polled at the engine's cancellation checkpoints
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// No-op progress sink
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_change(&mut self, _change: &ConfigurationChange) -> Result<()> {
        Ok(())
    }
}

/// Sink that keeps every event, in order
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Vec<ConfigurationChange>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit events only, as (identifier, state) pairs
    pub fn unit_transitions(&self) -> Vec<(String, UnitState)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ConfigurationChange::UnitState { state, unit, .. } => {
                    Some((unit.identifier.clone(), *state))
                }
                ConfigurationChange::SetState(_) => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_change(&mut self, change: &ConfigurationChange) -> Result<()> {
        self.events.push(change.clone());
        Ok(())
    }
}

/// Wraps a sink with a cancellation token the caller can trip
pub struct Cancellable<S> {
    inner: S,
    token: CancellationToken,
}

impl<S: ProgressSink> Cancellable<S> {
    pub fn new(inner: S, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ProgressSink> ProgressSink for Cancellable<S> {
    fn on_change(&mut self, change: &ConfigurationChange) -> Result<()> {
        self.inner.on_change(change)
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.inner.is_cancelled()
    }
}
