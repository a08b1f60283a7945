//! Wing-Gong style search for a linearization of one partition
//!
//! The search walks an explicit stack instead of recursing so that long
//! histories cannot exhaust the thread stack and so the budget can be checked
//! between steps.
//!
//! At every node the candidates are the unplaced operations whose call comes
//! before the earliest return bound of any unplaced required operation: that
//! operation has to take effect before its bound, so nothing called later can
//! go first. Pending operations have no bound and may be left unplaced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;

use super::bitset::Bitset;
use super::trace::{Attempt, Counterexample, StepOutcome, TraceFrame};
use super::CheckResult;
use crate::history::{Completion, Operation};
use crate::model::Model;

/// How often the wall clock and the cancel flag are consulted
const CLOCK_CHECK_INTERVAL: u64 = 64;

/// Limits on a single partition search
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Budget<'a> {
    pub deadline: Option<Instant>,
    pub step_limit: Option<u64>,
    pub cancel: Option<&'a AtomicBool>,
}

impl Budget<'_> {
    fn exhausted(&self, steps: u64) -> bool {
        if self.step_limit.is_some_and(|limit| steps >= limit) {
            return true;
        }
        if steps % CLOCK_CHECK_INTERVAL != 0 {
            return false;
        }
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Counters describing how much work a search did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Model steps evaluated
    pub steps: u64,
    /// Legal steps skipped because their configuration was already explored
    pub memo_hits: u64,
    /// Most operations placed at once
    pub max_depth: usize,
}

/// Result of searching one partition
#[derive(Debug)]
pub(crate) struct SearchOutcome<S> {
    pub result: CheckResult,
    /// Operation indices in linearization order, when one was found
    pub linearization: Option<Vec<usize>>,
    pub counterexample: Option<Counterexample<S>>,
    pub stats: SearchStats,
}

struct Frame<S> {
    op: Option<usize>,
    state: S,
    candidates: Vec<usize>,
    next: usize,
    attempts: Vec<Attempt<S>>,
}

/// Configurations (placed set, state) already fully explored
struct Memo<'m, M: Model> {
    model: &'m M,
    seen: HashMap<u64, Vec<(Bitset, M::State)>>,
}

impl<'m, M: Model> Memo<'m, M> {
    fn new(model: &'m M) -> Self {
        Memo {
            model,
            seen: HashMap::new(),
        }
    }

    /// Record a configuration; false if it was already present
    fn insert(&mut self, placed: &Bitset, state: &M::State) -> bool {
        let bucket = self.seen.entry(placed.hash_value()).or_default();
        if bucket
            .iter()
            .any(|(set, seen)| set == placed && self.model.equal(seen, state))
        {
            return false;
        }
        bucket.push((placed.clone(), state.clone()));
        true
    }
}

/// Search for a linearization of `ops`
///
/// `ops` must be sorted by call index.
pub(crate) fn search<M: Model>(
    model: &M,
    ops: &[Operation<M::Input, M::Output>],
    memoize: bool,
    budget: &Budget<'_>,
) -> SearchOutcome<M::State> {
    let bounds: Vec<usize> = ops
        .iter()
        .map(|op| op.return_index().unwrap_or(usize::MAX))
        .collect();
    let required_total = ops.iter().filter(|op| op.is_required()).count();

    let mut placed = Bitset::new(ops.len());
    let mut placed_required = 0;
    let mut memo = Memo::new(model);
    let mut stats = SearchStats::default();
    let mut deepest: Option<Counterexample<M::State>> = None;

    let mut stack = vec![Frame {
        op: None,
        state: model.init(),
        candidates: candidates(ops, &bounds, &placed),
        next: 0,
        attempts: Vec::new(),
    }];

    loop {
        if placed_required == required_total {
            return SearchOutcome {
                result: CheckResult::Ok,
                linearization: Some(stack.iter().filter_map(|f| f.op).collect()),
                counterexample: None,
                stats,
            };
        }

        if budget.exhausted(stats.steps) {
            return SearchOutcome {
                result: CheckResult::Unknown,
                linearization: None,
                counterexample: deepest,
                stats,
            };
        }

        let depth = stack.len() - 1;
        let Some(top) = stack.last_mut() else {
            break;
        };

        if top.next >= top.candidates.len() {
            // Every candidate from this node failed
            if deepest.as_ref().map_or(true, |d| depth > d.depth()) {
                deepest = Some(snapshot(&stack));
            }
            if let Some(frame) = stack.pop() {
                if let Some(idx) = frame.op {
                    placed.clear(idx);
                    if ops[idx].is_required() {
                        placed_required -= 1;
                    }
                }
            }
            if stack.is_empty() {
                break;
            }
            continue;
        }

        let idx = top.candidates[top.next];
        top.next += 1;
        stats.steps += 1;

        let op = &ops[idx];
        let (legal, next_state) = match &op.completion {
            Completion::Returned { output, .. } => {
                let (legal, state) = model.step(&top.state, &op.input, output);
                (legal, Some(state))
            }
            Completion::Superseded { .. } | Completion::Pending => {
                match model.step_pending(&top.state, &op.input) {
                    Some(state) => (true, Some(state)),
                    None => (false, None),
                }
            }
        };

        let next_state = match next_state {
            Some(state) if legal => state,
            state => {
                top.attempts.push(Attempt {
                    op: idx,
                    outcome: StepOutcome::Rejected,
                    state,
                });
                continue;
            }
        };

        placed.set(idx);
        if memoize && !memo.insert(&placed, &next_state) {
            placed.clear(idx);
            stats.memo_hits += 1;
            top.attempts.push(Attempt {
                op: idx,
                outcome: StepOutcome::Revisited,
                state: Some(next_state),
            });
            continue;
        }

        top.attempts.push(Attempt {
            op: idx,
            outcome: StepOutcome::Accepted,
            state: Some(next_state.clone()),
        });
        if op.is_required() {
            placed_required += 1;
        }
        stack.push(Frame {
            op: Some(idx),
            state: next_state,
            candidates: candidates(ops, &bounds, &placed),
            next: 0,
            attempts: Vec::new(),
        });
        stats.max_depth = stats.max_depth.max(stack.len() - 1);
    }

    SearchOutcome {
        result: CheckResult::Illegal,
        linearization: None,
        counterexample: deepest,
        stats,
    }
}

/// Operations that may be placed next given the placed set
fn candidates<I, O>(ops: &[Operation<I, O>], bounds: &[usize], placed: &Bitset) -> Vec<usize> {
    let min_bound = (0..ops.len())
        .filter(|&i| !placed.contains(i) && ops[i].is_required())
        .map(|i| bounds[i])
        .min()
        .unwrap_or(usize::MAX);

    (0..ops.len())
        .filter(|&i| !placed.contains(i) && ops[i].call_index < min_bound)
        .collect()
}

fn snapshot<S: Clone>(stack: &[Frame<S>]) -> Counterexample<S> {
    Counterexample {
        frames: stack
            .iter()
            .map(|f| TraceFrame {
                op: f.op,
                state: f.state.clone(),
                attempts: f.attempts.clone(),
            })
            .collect(),
    }
}
