//! Sequential specification abstraction
//!
//! A model describes what a single operation does when executed in isolation.
//! The checker replays candidate orderings of a concurrent history through it.

use std::fmt::Debug;

use crate::history::Operation;

/// Sequential specification of the object under test
///
/// Implementations must be pure: `step` and `step_pending` are invoked
/// hypothetically for every candidate ordering, so they must return the same
/// answer for the same arguments and must not retain state between calls.
pub trait Model: Send + Sync {
    /// Abstract state of the object
    type State: Clone + PartialEq + Debug + Send;
    /// Value carried by a call event
    type Input: Clone + Debug + Send + Sync;
    /// Value carried by a return event
    type Output: Clone + Debug + Send + Sync;

    /// Initial abstract state
    fn init(&self) -> Self::State;

    /// Decide whether `output` is a legal result of applying `input` to `state`
    ///
    /// Returns `(legal, new_state)`. The new state of an illegal step is only
    /// used for diagnostics.
    fn step(
        &self,
        state: &Self::State,
        input: &Self::Input,
        output: &Self::Output,
    ) -> (bool, Self::State);

    /// Apply an operation whose output was never observed
    ///
    /// Returns the state after the operation took effect, or `None` if it
    /// cannot have taken effect from `state`.
    fn step_pending(&self, state: &Self::State, input: &Self::Input) -> Option<Self::State>;

    /// Human readable form of a matched call/return pair
    fn describe_operation(&self, input: &Self::Input, output: &Self::Output) -> String;

    /// Human readable form of a call whose return was never observed
    fn describe_pending(&self, input: &Self::Input) -> String {
        format!("{:?} -> ?", input)
    }

    /// Human readable form of a state
    fn describe_state(&self, state: &Self::State) -> String {
        format!("{:?}", state)
    }

    /// State equality used by the search memo
    fn equal(&self, a: &Self::State, b: &Self::State) -> bool {
        a == b
    }

    /// Reject call/return pairs whose shapes do not belong together
    ///
    /// Called once per matched pair while the history is built, before any
    /// search runs.
    fn validate(&self, _input: &Self::Input, _output: &Self::Output) -> Result<(), String> {
        Ok(())
    }

    /// Split a history into independently checkable sub-histories
    ///
    /// `None` means the history is checked as a whole. Operations keep the
    /// event indices of the full history.
    #[allow(clippy::type_complexity)]
    fn partition(
        &self,
        _operations: &[Operation<Self::Input, Self::Output>],
    ) -> Option<Vec<Vec<Operation<Self::Input, Self::Output>>>> {
        None
    }
}
