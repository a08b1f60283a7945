//! Linearizability checker
//!
//! Decides whether a history of concurrent calls and returns could have
//! happened atomically under a [`Model`]. The history is validated and paired
//! into operations first, optionally split into partitions by the model, and
//! each partition is searched independently. Results combine as:
//! `Illegal` if any partition is illegal, else `Unknown` if any partition ran
//! out of budget, else `Ok`.

mod bitset;
mod config;
mod search;
mod trace;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::history::{build_operations, validate_operations, Event, HistoryError, Operation};
use crate::model::Model;
use search::{search, Budget, SearchOutcome};

pub use bitset::Bitset;
pub use config::CheckConfig;
pub use search::SearchStats;
pub use trace::{Attempt, Counterexample, StepOutcome, TraceFrame};

/// Outcome of a linearizability check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CheckResult {
    /// A linearization exists
    Ok,
    /// Proven that no linearization exists
    Illegal,
    /// The search budget ran out before either could be shown
    Unknown,
}

impl CheckResult {
    /// Combine the results of two independent partitions
    pub fn combine(self, other: CheckResult) -> CheckResult {
        match (self, other) {
            (CheckResult::Illegal, _) | (_, CheckResult::Illegal) => CheckResult::Illegal,
            (CheckResult::Unknown, _) | (_, CheckResult::Unknown) => CheckResult::Unknown,
            _ => CheckResult::Ok,
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckResult::Ok => write!(f, "Ok"),
            CheckResult::Illegal => write!(f, "Illegal"),
            CheckResult::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of checking one partition
#[derive(Clone, Debug)]
pub struct PartitionInfo<I, O, S> {
    /// Operations of this partition, ordered by call index
    pub operations: Vec<Operation<I, O>>,
    pub result: CheckResult,
    /// Operation ids in a valid linearization order (if found)
    pub linearization: Option<Vec<usize>>,
    /// Deepest explored path (for `Illegal`, and for `Unknown` when the search
    /// got far enough to exhaust a branch)
    pub counterexample: Option<Counterexample<S>>,
    pub stats: SearchStats,
}

/// Everything a check learned, used for reporting and visualization
#[derive(Clone, Debug)]
pub struct CheckInfo<I, O, S> {
    pub result: CheckResult,
    pub partitions: Vec<PartitionInfo<I, O, S>>,
}

/// [`CheckInfo`] for the value types of a model
pub type ModelInfo<M> = CheckInfo<<M as Model>::Input, <M as Model>::Output, <M as Model>::State>;

impl<I, O, S> CheckInfo<I, O, S> {
    pub fn is_linearizable(&self) -> bool {
        self.result == CheckResult::Ok
    }

    /// Partitions proven to have no linearization
    pub fn illegal_partitions(&self) -> impl Iterator<Item = &PartitionInfo<I, O, S>> {
        self.partitions
            .iter()
            .filter(|p| p.result == CheckResult::Illegal)
    }

    /// Total model steps across partitions
    pub fn total_steps(&self) -> u64 {
        self.partitions.iter().map(|p| p.stats.steps).sum()
    }
}

/// Checker bound to a model and a search budget
pub struct Checker<'m, M: Model> {
    model: &'m M,
    config: CheckConfig,
}

impl<'m, M: Model> Checker<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Checker {
            model,
            config: CheckConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CheckConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Validate an event history and check it
    ///
    /// Every partition is searched to completion (within budget) so that all
    /// counterexamples are available.
    pub fn check_events(
        &self,
        events: &[Event<M::Input, M::Output>],
    ) -> Result<ModelInfo<M>, HistoryError> {
        let ops = build_operations(self.model, events)?;
        Ok(self.run(ops, false))
    }

    /// Validate operations supplied directly and check them
    pub fn check_operations(
        &self,
        ops: Vec<Operation<M::Input, M::Output>>,
    ) -> Result<ModelInfo<M>, HistoryError> {
        validate_operations(self.model, &ops)?;
        Ok(self.run(ops, false))
    }

    /// Check only for the verdict, stopping other partitions once one is illegal
    pub fn verdict(&self, events: &[Event<M::Input, M::Output>]) -> Result<CheckResult, HistoryError> {
        let ops = build_operations(self.model, events)?;
        Ok(self.run(ops, true).result)
    }

    fn run(&self, mut ops: Vec<Operation<M::Input, M::Output>>, stop_early: bool) -> ModelInfo<M> {
        ops.sort_by_key(|op| op.call_index);
        let mut partitions = match self.model.partition(&ops) {
            Some(parts) => parts,
            None => vec![ops],
        };
        for part in &mut partitions {
            part.sort_by_key(|op| op.call_index);
        }

        let cancel = AtomicBool::new(false);
        let budget = Budget {
            // A deadline past the end of the clock is no deadline at all
            deadline: self
                .config
                .timeout
                .and_then(|t| Instant::now().checked_add(t)),
            step_limit: self.config.step_limit,
            cancel: stop_early.then_some(&cancel),
        };

        let outcomes: Vec<SearchOutcome<M::State>> = if self.config.parallel && partitions.len() > 1 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = partitions
                    .iter()
                    .enumerate()
                    .map(|(index, part)| scope.spawn(move || self.search_partition(index, part, budget)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| match handle.join() {
                        Ok(outcome) => outcome,
                        // A panicking model is the model author's bug; surface it
                        Err(payload) => std::panic::resume_unwind(payload),
                    })
                    .collect()
            })
        } else {
            partitions
                .iter()
                .enumerate()
                .map(|(index, part)| self.search_partition(index, part, budget))
                .collect()
        };

        let mut result = CheckResult::Ok;
        let mut infos = Vec::with_capacity(partitions.len());
        for (operations, outcome) in partitions.into_iter().zip(outcomes) {
            result = result.combine(outcome.result);
            let linearization = outcome
                .linearization
                .map(|order| order.into_iter().map(|i| operations[i].id).collect());
            infos.push(PartitionInfo {
                operations,
                result: outcome.result,
                linearization,
                counterexample: outcome.counterexample,
                stats: outcome.stats,
            });
        }

        if result == CheckResult::Unknown {
            warn!(
                timeout = ?self.config.timeout,
                step_limit = ?self.config.step_limit,
                "search budget exhausted before a verdict"
            );
        }
        info!(%result, partitions = infos.len(), "linearizability check finished");

        CheckInfo {
            result,
            partitions: infos,
        }
    }

    fn search_partition(
        &self,
        index: usize,
        ops: &[Operation<M::Input, M::Output>],
        budget: Budget<'_>,
    ) -> SearchOutcome<M::State> {
        if budget.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            debug!(partition = index, "skipping partition, verdict already known");
            return SearchOutcome {
                result: CheckResult::Unknown,
                linearization: None,
                counterexample: None,
                stats: SearchStats::default(),
            };
        }

        let started = Instant::now();
        let outcome = search(self.model, ops, self.config.memoize, &budget);
        debug!(
            partition = index,
            operations = ops.len(),
            result = %outcome.result,
            steps = outcome.stats.steps,
            memo_hits = outcome.stats.memo_hits,
            elapsed = ?started.elapsed(),
            "partition searched"
        );

        if outcome.result == CheckResult::Illegal {
            if let Some(flag) = budget.cancel {
                flag.store(true, Ordering::Relaxed);
            }
        }
        outcome
    }
}

/// Check an event history; true iff it is linearizable
///
/// Malformed histories are logged and reported as not linearizable.
pub fn check_events<M: Model>(model: &M, events: &[Event<M::Input, M::Output>]) -> bool {
    match Checker::new(model).verdict(events) {
        Ok(result) => result == CheckResult::Ok,
        Err(e) => {
            warn!(error = %e, "rejecting malformed history");
            false
        }
    }
}

/// Check an event history and keep everything needed for visualization
///
/// `timeout` of `None` searches until a verdict is reached.
pub fn check_events_verbose<M: Model>(
    model: &M,
    events: &[Event<M::Input, M::Output>],
    timeout: Option<Duration>,
) -> Result<(CheckResult, ModelInfo<M>), HistoryError> {
    let config = CheckConfig {
        timeout,
        ..CheckConfig::default()
    };
    let info = Checker::new(model).with_config(config).check_events(events)?;
    Ok((info.result, info))
}

/// Check operations supplied directly; true iff they are linearizable
pub fn check_operations<M: Model>(model: &M, ops: Vec<Operation<M::Input, M::Output>>) -> bool {
    match Checker::new(model).check_operations(ops) {
        Ok(info) => info.is_linearizable(),
        Err(e) => {
            warn!(error = %e, "rejecting malformed history");
            false
        }
    }
}

/// Check operations supplied directly, keeping the full result
pub fn check_operations_verbose<M: Model>(
    model: &M,
    ops: Vec<Operation<M::Input, M::Output>>,
    timeout: Option<Duration>,
) -> Result<(CheckResult, ModelInfo<M>), HistoryError> {
    let config = CheckConfig {
        timeout,
        ..CheckConfig::default()
    };
    let info = Checker::new(model).with_config(config).check_operations(ops)?;
    Ok((info.result, info))
}
