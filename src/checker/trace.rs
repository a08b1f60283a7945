//! Counterexample trace recorded by the search
//!
//! The trace is a snapshot of the search stack at the deepest point the search
//! reached before giving up on that branch. Operation numbers are indices into
//! the partition's operation list.

use serde::Serialize;

/// What happened when an operation was tried from a state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Legal, and the resulting configuration was explored
    Accepted,
    /// The model rejected the step
    Rejected,
    /// Legal, but the resulting configuration was already known to fail
    Revisited,
}

impl StepOutcome {
    pub fn is_legal(&self) -> bool {
        !matches!(self, StepOutcome::Rejected)
    }
}

/// One attempted step from a frame's state
#[derive(Clone, Debug, PartialEq)]
pub struct Attempt<S> {
    /// Operation that was tried
    pub op: usize,
    pub outcome: StepOutcome,
    /// State returned by the model; `None` when the model reported that an
    /// unobserved operation cannot take effect
    pub state: Option<S>,
}

/// A state on the deepest path together with everything tried from it
#[derive(Clone, Debug, PartialEq)]
pub struct TraceFrame<S> {
    /// Operation whose placement produced this state (`None` at the root)
    pub op: Option<usize>,
    pub state: S,
    pub attempts: Vec<Attempt<S>>,
}

/// Deepest partial linearization explored by a failed search
#[derive(Clone, Debug, PartialEq)]
pub struct Counterexample<S> {
    pub frames: Vec<TraceFrame<S>>,
}

impl<S> Counterexample<S> {
    /// Number of operations placed on the deepest path
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    /// Operations on the deepest path, in linearization order
    pub fn path(&self) -> Vec<usize> {
        self.frames.iter().filter_map(|f| f.op).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
