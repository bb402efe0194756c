//! Apply engine - dependency-ordered test/apply of a configuration set
//!
//! A run has two passes over the same [`UnitGraph`]:
//!
//! 1. **Pre-process**: structural checks (unsupported features, duplicate
//!    identifiers, missing dependencies) followed by a simulated drain in
//!    which every unit succeeds. Anything left over sits on a cycle.
//! 2. **Apply**: the real drain. Each unit is tested, applied if drifted,
//!    and its dependents only run once it has succeeded.
//!
//! Both passes share [`SetRun::drain`]: always run the first unit in
//! declaration order whose dependencies are satisfied, then rescan from the
//! top. Scheduling is deterministic and single-threaded; only a group's test
//! and apply run on a helper thread, streaming member results back over a
//! channel while the engine polls for cancellation.

use crate::assertions::{AssertionsGroup, is_assertions_group};
use crate::error::{Cancelled, EngineError, Result, UnitError};
use crate::graph::{UnitGraph, UnitNode};
use crate::processor::{
    CancellationToken, GroupEvent, GroupProcessor, GroupProgress,
    ProcessorFactory, UnitApplyResult, UnitProcessor, UnitTestResult,
};
use crate::progress::{ConfigurationChange, ProgressSink};
use crate::telemetry::{
    APPLY_ACTION, IntentSummary, ProcessingSummary, TEST_ACTION, TelemetryLogger,
};
use crate::types::{
    ConfigurationIntent, ConfigurationSet, ConfigurationUnit, ResultInformation, ResultSource,
    SetResult, SetResultCode, SetState, TestOutcome, UnitRef, UnitState,
};
use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Options for the apply engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How often cancellation is polled while a group apply is running
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Outcome of pre-processing a set without running it
#[derive(Debug, Clone)]
pub struct ApplyPlan {
    pub result: SetResult,
    /// Top-level units in the order they would be processed
    pub order: Vec<UnitRef>,
}

impl ApplyPlan {
    pub fn is_valid(&self) -> bool {
        self.result.code.is_success()
    }
}

/// Applies configuration sets using an external processor factory
pub struct ApplyEngine<'f> {
    factory: &'f dyn ProcessorFactory,
    telemetry: &'f dyn TelemetryLogger,
    options: EngineOptions,
}

impl<'f> ApplyEngine<'f> {
    pub fn new(factory: &'f dyn ProcessorFactory, telemetry: &'f dyn TelemetryLogger) -> Self {
        Self {
            factory,
            telemetry,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the set and compute its processing order
    ///
    /// No unit is tested or applied.
    pub fn plan(
        &self,
        set: &ConfigurationSet,
        progress: &mut dyn ProgressSink,
    ) -> Result<ApplyPlan> {
        let mut run = SetRun::new(self, set, progress)?;
        let order = run.process(true)?;

        let order = order
            .into_iter()
            .map(|index| run.graph.node(index).result.unit.clone())
            .collect();
        Ok(ApplyPlan {
            result: run.into_result(),
            order,
        })
    }

    /// Apply the set, streaming progress to `progress`
    ///
    /// Unit failures, structural problems and cancellation are all reported
    /// through the returned [`SetResult`]. An error is only returned when the
    /// set cannot be turned into a graph at all.
    pub fn apply(
        &self,
        set: &ConfigurationSet,
        progress: &mut dyn ProgressSink,
    ) -> Result<SetResult> {
        log::info!(
            "Applying configuration set '{}' ({} units)",
            set.name,
            set.unit_count()
        );

        let mut run = SetRun::new(self, set, progress)?;
        let outcome = run.process(false);
        run.log_processing_summary();
        outcome?;

        let result = run.into_result();
        log::info!("Configuration set finished: {:?}", result.code);
        Ok(result)
    }
}

/// Result of one drain over the top-level units
struct DrainOutcome {
    /// Some action reported failure
    failed: bool,
    /// Units whose dependencies were never satisfied
    remaining: Vec<usize>,
}

/// How a unit is processed, resolved once per unit
enum Dispatch<'p> {
    Leaf(&'p dyn UnitProcessor),
    Group(&'p dyn GroupProcessor),
    Assertions(AssertionsGroup<'p>),
}

impl<'p> Dispatch<'p> {
    /// A unit is only a group if something can process its members.
    /// Otherwise it is handled as a plain unit and its members never run.
    fn resolve(
        unit: &'p ConfigurationUnit,
        processor: &'p dyn UnitProcessor,
        factory: &'p dyn ProcessorFactory,
    ) -> Self {
        if !unit.is_group {
            return Self::Leaf(processor);
        }
        if is_assertions_group(unit) {
            return Self::Assertions(AssertionsGroup::new(unit, factory));
        }
        match processor.as_group() {
            Some(group) => Self::Group(group),
            None => Self::Leaf(processor),
        }
    }
}

/// State for a single run over one set
struct SetRun<'a, 'r> {
    set: &'a ConfigurationSet,
    graph: UnitGraph<'a>,
    factory: &'r dyn ProcessorFactory,
    telemetry: &'r dyn TelemetryLogger,
    progress: &'r mut dyn ProgressSink,
    options: &'r EngineOptions,
    code: SetResultCode,
}

impl<'a, 'r> SetRun<'a, 'r> {
    fn new(
        engine: &'r ApplyEngine<'_>,
        set: &'a ConfigurationSet,
        progress: &'r mut dyn ProgressSink,
    ) -> Result<Self> {
        Ok(Self {
            set,
            graph: UnitGraph::build(set)?,
            factory: engine.factory,
            telemetry: engine.telemetry,
            progress,
            options: &engine.options,
            code: SetResultCode::Success,
        })
    }

    fn into_result(self) -> SetResult {
        SetResult {
            code: self.code,
            unit_results: self.graph.unit_results(),
        }
    }

    /// Pre-process and, unless `preprocess_only`, apply
    ///
    /// Returns the pre-processing order of the top-level units, which is
    /// empty when the set was rejected.
    fn process(&mut self, preprocess_only: bool) -> Result<Vec<usize>> {
        let order = self.preprocess()?;

        if let Some(order) = &order
            && !preprocess_only
        {
            log::debug!("Pre-processing order: {order:?}");
            self.apply_pass();
        }

        self.send_set_state(SetState::Completed);
        Ok(order.unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Pass 1: structure and cycles
    // ------------------------------------------------------------------

    fn preprocess(&mut self) -> Result<Option<Vec<usize>>> {
        if !self.set.parameters.is_empty() || !self.set.variables.is_empty() {
            log::error!("Configuration parameters and variables are not implemented");
            self.code = SetResultCode::NotImplemented;
            return Ok(None);
        }

        let duplicates = self.graph.duplicate_identifiers();
        if !duplicates.is_empty() {
            for index in duplicates {
                log::error!(
                    "Found duplicate identifier: {}",
                    self.unit(index).identifier
                );
                self.set_information(
                    index,
                    ResultInformation::failure(
                        UnitError::DuplicateIdentifier,
                        ResultSource::ConfigurationSet,
                    ),
                );
                self.send_unit_state(UnitState::Completed, index);
            }
            self.code = SetResultCode::DuplicateIdentifier;
            return Ok(None);
        }

        let missing = self.graph.link_dependencies()?;
        if !missing.is_empty() {
            for m in missing {
                log::error!("Found missing dependency: {}", m.dependency);
                self.set_information(
                    m.node,
                    ResultInformation::failure(
                        UnitError::MissingDependency,
                        ResultSource::ConfigurationSet,
                    )
                    .with_details(m.dependency),
                );
                self.send_unit_state(UnitState::Completed, m.node);
            }
            self.code = SetResultCode::MissingDependency;
            return Ok(None);
        }

        let mut order = Vec::new();
        let Ok(outcome) = self.drain(
            |dependency| dependency.preprocessed,
            |run, index| {
                run.mark_preprocessed(index);
                order.push(index);
                Ok::<_, Infallible>(true)
            },
        );

        if !outcome.remaining.is_empty() {
            // Every unit was assumed to succeed, so only a cycle can block one
            log::error!(
                "Dependency cycle among {} unit(s)",
                outcome.remaining.len()
            );
            self.mark_unsatisfied(&outcome.remaining, false);
            self.code = SetResultCode::DependencyCycle;
            return Ok(None);
        }

        Ok(Some(order))
    }

    /// Group members are handled by the group, so they count as pre-processed
    /// together with it. The group itself only became ready once everything
    /// its members wait on outside it was pre-processed.
    fn mark_preprocessed(&mut self, index: usize) {
        self.graph.node_mut(index).preprocessed = true;
        if self.unit(index).is_group {
            for member in self.graph.descendants(index) {
                self.graph.node_mut(member).preprocessed = true;
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: apply
    // ------------------------------------------------------------------

    fn apply_pass(&mut self) {
        self.send_set_state(SetState::InProgress);

        match self.drain(UnitNode::processed_successfully, Self::process_unit) {
            Ok(outcome) => {
                self.mark_unsatisfied(&outcome.remaining, true);
                self.code = if outcome.failed {
                    SetResultCode::SetApplyFailed
                } else if !outcome.remaining.is_empty() {
                    SetResultCode::DependencyUnsatisfied
                } else {
                    SetResultCode::Success
                };
            }
            Err(Cancelled) => {
                log::warn!("Configuration set apply cancelled");
                self.code = SetResultCode::Cancelled;
            }
        }
    }

    /// Run `action` on top-level units in dependency order
    ///
    /// Repeatedly picks the first unit, in declaration order, whose
    /// dependencies all pass `satisfied`, until a full scan finds none. A
    /// group also waits on its members' dependencies outside the group.
    fn drain<P, A, E>(&mut self, satisfied: P, mut action: A) -> std::result::Result<DrainOutcome, E>
    where
        P: Fn(&UnitNode<'a>) -> bool,
        A: FnMut(&mut Self, usize) -> std::result::Result<bool, E>,
    {
        let mut worklist = self.graph.top_level().to_vec();
        let mut failed = false;

        while let Some(position) = worklist
            .iter()
            .position(|&index| self.dependencies_satisfied(index, &satisfied))
        {
            let index = worklist.remove(position);
            if !action(self, index)? {
                failed = true;
            }
        }

        Ok(DrainOutcome {
            failed,
            remaining: worklist,
        })
    }

    fn dependencies_satisfied<P>(&self, index: usize, satisfied: &P) -> bool
    where
        P: Fn(&UnitNode<'a>) -> bool,
    {
        self.graph
            .node(index)
            .waits_on
            .iter()
            .all(|&dependency| satisfied(self.graph.node(dependency)))
    }

    fn mark_unsatisfied(&mut self, indices: &[usize], send_progress: bool) {
        for &index in indices {
            self.set_information(
                index,
                ResultInformation::failure(
                    UnitError::DependencyUnsatisfied,
                    ResultSource::Precondition,
                ),
            );
            if send_progress {
                self.send_unit_state(UnitState::Skipped, index);
            }
        }
    }

    /// Process one unit; `Ok(false)` means it failed
    fn process_unit(&mut self, index: usize) -> std::result::Result<bool, Cancelled> {
        self.check_cancelled()?;

        // From here on the unit has a real result, even if nothing else runs
        self.graph.node_mut(index).processed = true;

        if !self.unit(index).is_active {
            // Recorded as a failure so dependents do not run, but scheduling
            // treats the unit itself as handled
            self.set_information(
                index,
                ResultInformation::failure(UnitError::ManuallySkipped, ResultSource::Precondition),
            );
            self.send_unit_state(UnitState::Skipped, index);
            return Ok(true);
        }

        self.send_unit_state(UnitState::InProgress, index);
        let outcome = self.run_unit(index);
        self.send_unit_state(UnitState::Completed, index);
        outcome
    }

    fn run_unit(&mut self, index: usize) -> std::result::Result<bool, Cancelled> {
        let unit = self.unit(index);
        let factory = self.factory;

        let processor = match guarded(|| factory.create_unit_processor(unit)) {
            Ok(processor) => processor,
            Err(info) => {
                log::error!("Failed to create processor for {}: {}", unit.to_ref(), info.description);
                self.set_information(index, info);
                return Ok(false);
            }
        };

        // Creating the processor may have taken a while
        self.check_cancelled_for(index)?;

        match Dispatch::resolve(unit, &*processor, factory) {
            Dispatch::Leaf(processor) => self.process_leaf(index, processor),
            Dispatch::Group(processor) => self.process_group(index, processor),
            Dispatch::Assertions(processor) => self.process_group(index, &processor),
        }
    }

    fn process_leaf(
        &mut self,
        index: usize,
        processor: &dyn UnitProcessor,
    ) -> std::result::Result<bool, Cancelled> {
        let mut action = TEST_ACTION;
        let outcome = self.test_and_apply_leaf(index, processor, &mut action);
        self.log_unit_run(index, action);
        outcome
    }

    fn test_and_apply_leaf(
        &mut self,
        index: usize,
        processor: &dyn UnitProcessor,
        action: &mut &'static str,
    ) -> std::result::Result<bool, Cancelled> {
        self.graph.node_mut(index).last_intent = ConfigurationIntent::Assert;

        let tested = match guarded(|| processor.test_settings()) {
            Ok(tested) => tested,
            Err(info) => {
                self.set_information(index, info);
                return Ok(false);
            }
        };

        match tested.outcome {
            TestOutcome::Positive => {
                self.graph.node_mut(index).result.previously_in_desired_state = true;
                Ok(true)
            }
            TestOutcome::Negative => {
                // Testing may have taken a while
                self.check_cancelled_for(index)?;

                *action = APPLY_ACTION;
                self.graph.node_mut(index).last_intent = ConfigurationIntent::Apply;

                match guarded(|| processor.apply_settings()) {
                    Ok(applied) => Ok(self.record_apply(
                        index,
                        applied.result_information,
                        applied.reboot_required,
                    )),
                    Err(info) => {
                        self.set_information(index, info);
                        Ok(false)
                    }
                }
            }
            TestOutcome::Failed => {
                self.set_failure(index, tested.result_information);
                Ok(false)
            }
            other => {
                log::error!("Unexpected test result {other:?} for {}", self.unit(index).to_ref());
                self.set_information(
                    index,
                    ResultInformation::failure(UnitError::Unexpected, ResultSource::Internal),
                );
                Ok(false)
            }
        }
    }

    fn process_group(
        &mut self,
        index: usize,
        processor: &dyn GroupProcessor,
    ) -> std::result::Result<bool, Cancelled> {
        let mut action = TEST_ACTION;
        let outcome = self.test_and_apply_group(index, processor, &mut action);
        self.log_unit_run(index, action);
        outcome
    }

    fn test_and_apply_group(
        &mut self,
        index: usize,
        processor: &dyn GroupProcessor,
        action: &mut &'static str,
    ) -> std::result::Result<bool, Cancelled> {
        self.graph.node_mut(index).last_intent = ConfigurationIntent::Assert;

        let (tested, cancelled) =
            self.run_group_operation(|_, cancel| processor.test_group_settings(cancel));
        let tested = match tested {
            Ok(tested) => tested,
            Err(info) => {
                self.set_information(index, info);
                return if cancelled { Err(Cancelled) } else { Ok(false) };
            }
        };

        if let Err(e) = self.record_test_results(&tested.unit_results) {
            self.set_information(index, internal_failure(e.to_string()));
            return Ok(false);
        }
        if cancelled {
            self.set_information(index, cancelled_failure());
            return Err(Cancelled);
        }

        match tested.result.outcome {
            TestOutcome::Positive => {
                // Members already in their desired state are done, so units
                // depending on them can run
                for result in &tested.unit_results {
                    if result.outcome == TestOutcome::Positive
                        && let Some(member) = self.graph.index_of(&result.instance_identifier)
                    {
                        self.graph.node_mut(member).processed = true;
                    }
                }
                self.graph.node_mut(index).result.previously_in_desired_state = true;
                Ok(true)
            }
            TestOutcome::Negative => {
                self.check_cancelled_for(index)?;

                *action = APPLY_ACTION;
                self.graph.node_mut(index).last_intent = ConfigurationIntent::Apply;

                let (applied, cancelled) = self.run_group_operation(|progress, cancel| {
                    processor.apply_group_settings(progress, cancel)
                });
                let succeeded = match applied {
                    Ok(applied) => match self.record_apply_results(&applied.unit_results) {
                        Ok(()) => self.record_apply(
                            index,
                            applied.result.result_information,
                            applied.result.reboot_required,
                        ),
                        Err(e) => {
                            self.set_information(index, internal_failure(e.to_string()));
                            false
                        }
                    },
                    Err(info) => {
                        self.set_information(index, info);
                        false
                    }
                };
                self.record_skipped_units(self.unit(index).members());

                if cancelled {
                    return Err(Cancelled);
                }
                Ok(succeeded)
            }
            TestOutcome::Failed => {
                self.set_failure(index, tested.result.result_information);
                Ok(false)
            }
            other => {
                log::error!("Unexpected group test result {other:?} for {}", self.unit(index).to_ref());
                self.set_information(
                    index,
                    ResultInformation::failure(UnitError::Unexpected, ResultSource::Internal),
                );
                Ok(false)
            }
        }
    }

    /// Run a group test or apply on a helper thread
    ///
    /// Member events streamed by the operation are merged as they arrive.
    /// Cancellation is polled every `poll_interval` and passed on through the
    /// operation's token; a cancelled operation is still awaited to
    /// completion. Returns the result and whether the token was tripped.
    fn run_group_operation<T, F>(
        &mut self,
        operation: F,
    ) -> (std::result::Result<T, ResultInformation>, bool)
    where
        T: Send,
        F: FnOnce(&GroupProgress, &CancellationToken) -> anyhow::Result<T> + Send,
    {
        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let poll_interval = self.options.poll_interval;
        let mut stream_error = None;

        let joined = thread::scope(|scope| {
            let token = cancel.clone();
            let handle = scope.spawn(move || {
                let progress = GroupProgress::new(tx);
                guarded(|| operation(&progress, &token))
            });

            loop {
                match rx.recv_timeout(poll_interval) {
                    Ok(event) => self.merge_group_event(event, &mut stream_error),
                    // The operation returned, but a copy of its progress
                    // handle may outlive it and keep the channel open
                    Err(RecvTimeoutError::Timeout) if handle.is_finished() => {
                        while let Ok(event) = rx.try_recv() {
                            self.merge_group_event(event, &mut stream_error);
                        }
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if !cancel.is_cancelled() && self.progress.is_cancelled() {
                            log::info!("Cancelling running group operation");
                            cancel.cancel();
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            handle.join()
        });

        let cancelled = cancel.is_cancelled();
        let applied = match joined {
            Ok(Ok(applied)) => match stream_error {
                Some(e) => Err(internal_failure(e.to_string())),
                None => Ok(applied),
            },
            Ok(Err(_)) if cancelled => Err(cancelled_failure()),
            Ok(Err(info)) => Err(info),
            Err(payload) => Err(internal_failure(processor_panic(payload.as_ref()))),
        };
        (applied, cancelled)
    }

    /// Merge a streamed event, keeping the first error
    fn merge_group_event(&mut self, event: GroupEvent, stream_error: &mut Option<EngineError>) {
        if let Err(e) = self.record_group_event(event)
            && stream_error.is_none()
        {
            *stream_error = Some(e);
        }
    }

    fn record_group_event(&mut self, event: GroupEvent) -> Result<()> {
        match event {
            GroupEvent::UnitStarted(instance_identifier) => {
                let index = self.graph.require(&instance_identifier)?;
                let node = self.graph.node(index);
                if !node.processed && node.result.state == UnitState::NotStarted {
                    self.send_unit_state(UnitState::InProgress, index);
                }
                Ok(())
            }
            GroupEvent::UnitCompleted(result) => self.record_apply_result(&result),
        }
    }

    /// Merge member outcomes from a group test
    fn record_test_results(&mut self, results: &[UnitTestResult]) -> Result<()> {
        for result in results {
            let index = self.graph.require(&result.instance_identifier)?;
            self.graph.node_mut(index).last_intent = ConfigurationIntent::Assert;

            match result.outcome {
                TestOutcome::Positive => {
                    self.graph.node_mut(index).result.previously_in_desired_state = true;
                }
                // Applied shortly
                TestOutcome::Negative => {}
                TestOutcome::Failed => {
                    self.set_failure(index, result.result_information.clone());
                }
                _ => {
                    self.set_information(
                        index,
                        ResultInformation::failure(UnitError::Unexpected, ResultSource::Internal),
                    );
                }
            }

            self.log_unit_run(index, TEST_ACTION);
        }
        Ok(())
    }

    /// Merge one member's apply result; later results for the same member
    /// are ignored
    fn record_apply_result(&mut self, result: &UnitApplyResult) -> Result<()> {
        let index = self.graph.require(&result.instance_identifier)?;
        let node = self.graph.node_mut(index);
        if node.processed {
            return Ok(());
        }
        node.processed = true;

        if result.result_information.succeeded() {
            node.result.reboot_required = result.reboot_required;
        } else {
            node.result.result_information = result.result_information.clone();
        }

        self.log_unit_run(index, APPLY_ACTION);
        self.send_unit_state(UnitState::Completed, index);
        Ok(())
    }

    fn record_apply_results(&mut self, results: &[UnitApplyResult]) -> Result<()> {
        for result in results {
            self.record_apply_result(result)?;
        }
        Ok(())
    }

    /// Account for members a group apply did not report
    fn record_skipped_units(&mut self, units: &'a [ConfigurationUnit]) {
        for unit in units {
            if unit.is_group {
                self.record_skipped_units(unit.members());
            }

            let Some(index) = self.graph.index_of(&unit.instance_identifier) else {
                continue;
            };
            let processed = self.graph.node(index).processed;

            if !unit.is_active {
                if processed {
                    log::error!("Inactive unit was processed: {}", unit.to_ref());
                } else {
                    self.graph.node_mut(index).processed = true;
                    self.set_information(
                        index,
                        ResultInformation::failure(
                            UnitError::ManuallySkipped,
                            ResultSource::Precondition,
                        ),
                    );
                    self.send_unit_state(UnitState::Skipped, index);
                }
            } else if !processed {
                log::warn!("Unit in a group was not processed: {}", unit.to_ref());
            }
        }
    }

    /// Record an apply outcome; returns whether it succeeded
    fn record_apply(&mut self, index: usize, info: ResultInformation, reboot_required: bool) -> bool {
        if info.succeeded() {
            self.graph.node_mut(index).result.reboot_required = reboot_required;
            true
        } else {
            self.set_information(index, info);
            false
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn unit(&self, index: usize) -> &'a ConfigurationUnit {
        self.graph.node(index).unit
    }

    fn set_information(&mut self, index: usize, info: ResultInformation) {
        self.graph.node_mut(index).result.result_information = info;
    }

    /// Copy a reported failure, making sure it reads as one
    fn set_failure(&mut self, index: usize, mut info: ResultInformation) {
        if info.error.is_none() {
            info.error = Some(UnitError::Internal);
            info.source = ResultSource::Internal;
        }
        self.set_information(index, info);
    }

    fn check_cancelled(&self) -> std::result::Result<(), Cancelled> {
        if self.progress.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Like `check_cancelled`, recording the cancellation on the unit
    fn check_cancelled_for(&mut self, index: usize) -> std::result::Result<(), Cancelled> {
        let checked = self.check_cancelled();
        if checked.is_err() {
            self.set_information(index, cancelled_failure());
        }
        checked
    }

    fn send_set_state(&mut self, state: SetState) {
        self.notify(&ConfigurationChange::SetState(state));
    }

    fn send_unit_state(&mut self, state: UnitState, index: usize) {
        let node = self.graph.node_mut(index);
        node.result.state = state;
        let change = ConfigurationChange::UnitState {
            state,
            unit: node.result.unit.clone(),
            result_information: node.result.result_information.clone(),
        };
        self.notify(&change);
    }

    fn notify(&mut self, change: &ConfigurationChange) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.progress.on_change(change))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Progress sink failed: {e:#}"),
            Err(payload) => log::warn!("Progress sink panicked: {}", panic_text(payload.as_ref())),
        }
    }

    fn log_unit_run(&self, index: usize, action: &str) {
        let node = self.graph.node(index);
        swallow_telemetry(|| {
            self.telemetry.log_unit_run(
                self.set.instance_identifier,
                node.unit,
                ConfigurationIntent::Apply,
                action,
                &node.result.result_information,
            )
        });
    }

    fn processing_summary(&self) -> ProcessingSummary {
        let intents = ConfigurationIntent::ALL
            .iter()
            .map(|&intent| {
                let mut summary = IntentSummary::new(intent);
                for node in self.graph.all_nodes().iter().filter(|n| n.last_intent == intent) {
                    summary.count += 1;
                    if node.processed {
                        summary.run += 1;
                        if !node.result.succeeded() {
                            summary.failed += 1;
                        }
                    }
                }
                summary
            })
            .collect();

        ProcessingSummary {
            set_id: self.set.instance_identifier,
            code: self.code,
            intents,
        }
    }

    fn log_processing_summary(&self) {
        let summary = self.processing_summary();
        swallow_telemetry(|| self.telemetry.log_processing_summary(&summary));
    }
}

/// Run a processor call, turning errors and panics into result information
fn guarded<T>(op: impl FnOnce() -> anyhow::Result<T>) -> std::result::Result<T, ResultInformation> {
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(internal_failure(format!("{e:#}"))),
        Err(payload) => Err(internal_failure(processor_panic(payload.as_ref()))),
    }
}

fn swallow_telemetry(op: impl FnOnce() -> anyhow::Result<()>) {
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("Telemetry failed: {e:#}"),
        Err(payload) => log::warn!("Telemetry panicked: {}", panic_text(payload.as_ref())),
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn processor_panic(payload: &(dyn Any + Send)) -> String {
    format!("processor panicked: {}", panic_text(payload))
}

fn internal_failure(description: String) -> ResultInformation {
    ResultInformation::failure(UnitError::Internal, ResultSource::Internal)
        .with_description(description)
}

fn cancelled_failure() -> ResultInformation {
    ResultInformation::failure(UnitError::Cancelled, ResultSource::Internal)
}
