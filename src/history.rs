//! History types and the builder that pairs call/return events
//!
//! A history is a flat sequence of events. Position in the sequence is the
//! only notion of time: event `i` happened before event `j` iff `i < j`.
//! [`build_operations`] validates the sequence and turns it into operations.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Model;

/// Whether an event starts or finishes an operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind<I, O> {
    /// Operation invoked with this input
    Call(I),
    /// Operation returned this output
    Return(O),
}

/// A single call or return observed from a client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<I, O> {
    /// Logical thread that issued the event
    pub client_id: usize,
    /// Pairs a call with its return
    pub id: usize,
    pub kind: EventKind<I, O>,
}

impl<I, O> Event<I, O> {
    /// Create a call event
    pub fn call(client_id: usize, id: usize, input: I) -> Self {
        Event {
            client_id,
            id,
            kind: EventKind::Call(input),
        }
    }

    /// Create a return event
    pub fn ret(client_id: usize, id: usize, output: O) -> Self {
        Event {
            client_id,
            id,
            kind: EventKind::Return(output),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, EventKind::Call(_))
    }
}

/// How an operation ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion<O> {
    /// Return observed at event `index`
    Returned { index: usize, output: O },
    /// No return, but the same client issued its next call at event `index`.
    /// The operation finished before that point with an unobserved output.
    Superseded { index: usize },
    /// No return and no later call from the client; the effect is unknown
    Pending,
}

/// An operation derived from a call and (possibly) its return
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation<I, O> {
    /// Event id shared by the call and the return
    pub id: usize,
    /// Client that performed the operation
    pub client_id: usize,
    /// Event index of the call
    pub call_index: usize,
    pub input: I,
    pub completion: Completion<O>,
}

impl<I, O> Operation<I, O> {
    /// Create an operation whose return was observed
    pub fn completed(
        id: usize,
        client_id: usize,
        call_index: usize,
        return_index: usize,
        input: I,
        output: O,
    ) -> Self {
        Operation {
            id,
            client_id,
            call_index,
            input,
            completion: Completion::Returned {
                index: return_index,
                output,
            },
        }
    }

    /// Create an operation whose return was never observed
    pub fn pending(id: usize, client_id: usize, call_index: usize, input: I) -> Self {
        Operation {
            id,
            client_id,
            call_index,
            input,
            completion: Completion::Pending,
        }
    }

    /// Event index by which the operation had finished, if known
    pub fn return_index(&self) -> Option<usize> {
        match self.completion {
            Completion::Returned { index, .. } | Completion::Superseded { index } => Some(index),
            Completion::Pending => None,
        }
    }

    /// Observed output, if any
    pub fn output(&self) -> Option<&O> {
        match &self.completion {
            Completion::Returned { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Whether every linearization has to place this operation
    pub fn is_required(&self) -> bool {
        !self.is_pending()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.completion, Completion::Pending)
    }

    /// Check if this operation overlaps with another in time
    pub fn overlaps(&self, other: &Operation<I, O>) -> bool {
        let self_end = self.return_index().unwrap_or(usize::MAX);
        let other_end = other.return_index().unwrap_or(usize::MAX);
        self.call_index < other_end && other.call_index < self_end
    }
}

/// Reasons an event sequence is rejected before any search
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("event {index}: return for id {id} has no matching call")]
    UnmatchedReturn { index: usize, id: usize },

    #[error("event {index}: return for id {id} precedes its call at event {call_index}")]
    ReturnBeforeCall {
        index: usize,
        id: usize,
        call_index: usize,
    },

    #[error("event {index}: call id {id} already used by the call at event {first_index}")]
    DuplicateCall {
        index: usize,
        id: usize,
        first_index: usize,
    },

    #[error("event {index}: id {id} already returned")]
    DuplicateReturn { index: usize, id: usize },

    #[error("event {index}: return for id {id} came from client {client_id}, but client {call_client_id} made the call")]
    ClientMismatch {
        index: usize,
        id: usize,
        client_id: usize,
        call_client_id: usize,
    },

    #[error("event {index}: client {client_id} returned id {id} after issuing another call at event {next_call_index}")]
    OverlappingCalls {
        index: usize,
        id: usize,
        client_id: usize,
        next_call_index: usize,
    },

    #[error("event {index}: client {client_id} called id {id} while id {outstanding_id} was still outstanding")]
    CallWhileOutstanding {
        index: usize,
        id: usize,
        client_id: usize,
        outstanding_id: usize,
    },

    #[error("event {index}: id {id} is marked superseded there, but that is not the next call of client {client_id}")]
    SupersededMismatch {
        index: usize,
        id: usize,
        client_id: usize,
    },

    #[error("event {index}: invalid operation for id {id}: {reason}")]
    InvalidOperation {
        index: usize,
        id: usize,
        reason: String,
    },
}

/// Pair calls with returns and validate the history
///
/// Operations come back ordered by call index. A call left without a return is
/// `Superseded` if its client issued another call afterwards, `Pending`
/// otherwise. Nothing is repaired: the first violation is returned.
pub fn build_operations<M: Model>(
    model: &M,
    events: &[Event<M::Input, M::Output>],
) -> Result<Vec<Operation<M::Input, M::Output>>, HistoryError> {
    let mut ops: Vec<Operation<M::Input, M::Output>> = Vec::new();
    let mut by_id: HashMap<usize, usize> = HashMap::new();
    let mut outstanding: HashMap<usize, usize> = HashMap::new();

    for (index, event) in events.iter().enumerate() {
        let id = event.id;
        match &event.kind {
            EventKind::Call(input) => {
                if let Some(&slot) = by_id.get(&id) {
                    return Err(HistoryError::DuplicateCall {
                        index,
                        id,
                        first_index: ops[slot].call_index,
                    });
                }
                let slot = ops.len();
                if let Some(previous) = outstanding.insert(event.client_id, slot) {
                    ops[previous].completion = Completion::Superseded { index };
                }
                by_id.insert(id, slot);
                ops.push(Operation::pending(id, event.client_id, index, input.clone()));
            }
            EventKind::Return(output) => {
                let Some(&slot) = by_id.get(&id) else {
                    return Err(missing_call(events, index, id));
                };
                let op = &mut ops[slot];
                match op.completion {
                    Completion::Returned { .. } => {
                        return Err(HistoryError::DuplicateReturn { index, id });
                    }
                    Completion::Superseded {
                        index: next_call_index,
                    } => {
                        return Err(HistoryError::OverlappingCalls {
                            index,
                            id,
                            client_id: op.client_id,
                            next_call_index,
                        });
                    }
                    Completion::Pending => {}
                }
                if op.client_id != event.client_id {
                    return Err(HistoryError::ClientMismatch {
                        index,
                        id,
                        client_id: event.client_id,
                        call_client_id: op.client_id,
                    });
                }
                model
                    .validate(&op.input, output)
                    .map_err(|reason| HistoryError::InvalidOperation { index, id, reason })?;

                op.completion = Completion::Returned {
                    index,
                    output: output.clone(),
                };
                outstanding.remove(&event.client_id);
            }
        }
    }

    Ok(ops)
}

/// Validate operations supplied directly instead of as events
pub fn validate_operations<M: Model>(
    model: &M,
    ops: &[Operation<M::Input, M::Output>],
) -> Result<(), HistoryError> {
    let mut calls: HashMap<usize, usize> = HashMap::new();
    for op in ops {
        if let Some(first_index) = calls.insert(op.id, op.call_index) {
            return Err(HistoryError::DuplicateCall {
                index: op.call_index,
                id: op.id,
                first_index,
            });
        }
        if let Some(return_index) = op.return_index() {
            if return_index <= op.call_index {
                return Err(HistoryError::ReturnBeforeCall {
                    index: return_index,
                    id: op.id,
                    call_index: op.call_index,
                });
            }
        }
        if let Completion::Returned { index, output } = &op.completion {
            model
                .validate(&op.input, output)
                .map_err(|reason| HistoryError::InvalidOperation {
                    index: *index,
                    id: op.id,
                    reason,
                })?;
        }
    }

    let mut by_client: BTreeMap<usize, Vec<&Operation<M::Input, M::Output>>> = BTreeMap::new();
    for op in ops {
        by_client.entry(op.client_id).or_default().push(op);
    }
    for (client_id, mut client_ops) in by_client {
        client_ops.sort_by_key(|op| op.call_index);
        for (i, op) in client_ops.iter().enumerate() {
            check_client_order(client_id, op, client_ops.get(i + 1).copied())?;
        }
    }
    Ok(())
}

/// One outstanding operation per client: `op` must be finished by `next`'s call
fn check_client_order<I, O>(
    client_id: usize,
    op: &Operation<I, O>,
    next: Option<&Operation<I, O>>,
) -> Result<(), HistoryError> {
    match (&op.completion, next) {
        (Completion::Returned { index, .. }, Some(next)) if *index >= next.call_index => {
            Err(HistoryError::OverlappingCalls {
                index: *index,
                id: op.id,
                client_id,
                next_call_index: next.call_index,
            })
        }
        (Completion::Pending, Some(next)) => Err(HistoryError::CallWhileOutstanding {
            index: next.call_index,
            id: next.id,
            client_id,
            outstanding_id: op.id,
        }),
        (Completion::Superseded { index }, next)
            if next.map(|n| n.call_index) != Some(*index) =>
        {
            Err(HistoryError::SupersededMismatch {
                index: *index,
                id: op.id,
                client_id,
            })
        }
        _ => Ok(()),
    }
}

fn missing_call<I, O>(events: &[Event<I, O>], index: usize, id: usize) -> HistoryError {
    let later_call = events
        .iter()
        .enumerate()
        .skip(index + 1)
        .find(|(_, e)| e.id == id && e.is_call());
    match later_call {
        Some((call_index, _)) => HistoryError::ReturnBeforeCall {
            index,
            id,
            call_index,
        },
        None => HistoryError::UnmatchedReturn { index, id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RegisterInput, RegisterModel, RegisterOutput};

    type RegisterEvent = Event<RegisterInput, RegisterOutput>;

    fn build(events: &[RegisterEvent]) -> Result<Vec<Operation<RegisterInput, RegisterOutput>>, HistoryError> {
        build_operations(&RegisterModel::new(), events)
    }

    #[test]
    fn test_pairs_calls_and_returns() {
        let events = vec![
            Event::call(0, 10, RegisterInput::put("a")),
            Event::call(1, 11, RegisterInput::get()),
            Event::ret(1, 11, RegisterOutput::found("a")),
            Event::ret(0, 10, RegisterOutput::Put),
        ];
        let ops = build(&events).unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].id, 10);
        assert_eq!(ops[0].return_index(), Some(3));
        assert_eq!(ops[1].id, 11);
        assert_eq!(ops[1].return_index(), Some(2));
        assert!(ops[0].overlaps(&ops[1]));
    }

    #[test]
    fn test_trailing_call_is_pending() {
        let events = vec![
            Event::call(0, 1, RegisterInput::put("a")),
            Event::ret(0, 1, RegisterOutput::Put),
            Event::call(0, 2, RegisterInput::put("b")),
        ];
        let ops = build(&events).unwrap();

        assert!(ops[1].is_pending());
        assert!(!ops[1].is_required());
        assert_eq!(ops[1].return_index(), None);
    }

    #[test]
    fn test_call_superseded_by_next_call() {
        let events = vec![
            Event::call(1, 6, RegisterInput::cas("19", "15")),
            Event::call(1, 7, RegisterInput::cas("19", "15")),
            Event::ret(1, 7, RegisterOutput::cas(true, "15")),
        ];
        let ops = build(&events).unwrap();

        assert_eq!(ops[0].completion, Completion::Superseded { index: 1 });
        assert!(ops[0].is_required());
        assert_eq!(ops[0].output(), None);
        assert_eq!(ops[1].return_index(), Some(2));
    }

    #[test]
    fn test_unmatched_return() {
        let events = vec![Event::ret(0, 3, RegisterOutput::Put)];
        assert_eq!(
            build(&events).unwrap_err(),
            HistoryError::UnmatchedReturn { index: 0, id: 3 }
        );
    }

    #[test]
    fn test_return_before_call() {
        let events = vec![
            Event::ret(0, 3, RegisterOutput::Put),
            Event::call(0, 3, RegisterInput::put("a")),
        ];
        assert_eq!(
            build(&events).unwrap_err(),
            HistoryError::ReturnBeforeCall {
                index: 0,
                id: 3,
                call_index: 1
            }
        );
    }

    #[test]
    fn test_duplicate_call_id() {
        let events = vec![
            Event::call(0, 1, RegisterInput::put("a")),
            Event::ret(0, 1, RegisterOutput::Put),
            Event::call(1, 1, RegisterInput::get()),
        ];
        assert!(matches!(
            build(&events).unwrap_err(),
            HistoryError::DuplicateCall { index: 2, id: 1, first_index: 0 }
        ));
    }

    #[test]
    fn test_duplicate_return() {
        let events = vec![
            Event::call(0, 1, RegisterInput::put("a")),
            Event::ret(0, 1, RegisterOutput::Put),
            Event::ret(0, 1, RegisterOutput::Put),
        ];
        assert_eq!(
            build(&events).unwrap_err(),
            HistoryError::DuplicateReturn { index: 2, id: 1 }
        );
    }

    #[test]
    fn test_overlapping_calls_on_one_client() {
        let events = vec![
            Event::call(0, 1, RegisterInput::put("a")),
            Event::call(0, 2, RegisterInput::put("b")),
            Event::ret(0, 1, RegisterOutput::Put),
        ];
        assert!(matches!(
            build(&events).unwrap_err(),
            HistoryError::OverlappingCalls { index: 2, id: 1, next_call_index: 1, .. }
        ));
    }

    #[test]
    fn test_return_from_other_client() {
        let events = vec![
            Event::call(0, 1, RegisterInput::put("a")),
            Event::ret(1, 1, RegisterOutput::Put),
        ];
        assert!(matches!(
            build(&events).unwrap_err(),
            HistoryError::ClientMismatch { client_id: 1, call_client_id: 0, .. }
        ));
    }

    #[test]
    fn test_mismatched_operation_kind() {
        let events = vec![
            Event::call(0, 1, RegisterInput::get()),
            Event::ret(0, 1, RegisterOutput::cas(true, "a")),
        ];
        let err = build(&events).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidOperation { index: 1, id: 1, .. }));
        assert!(err.to_string().contains("invalid operation"));
    }

    #[test]
    fn test_validate_operations() {
        let model = RegisterModel::new();
        let ok = vec![Operation::completed(1, 0, 0, 1, RegisterInput::get(), RegisterOutput::not_found())];
        assert!(validate_operations(&model, &ok).is_ok());

        let backwards = vec![Operation::completed(1, 0, 4, 2, RegisterInput::get(), RegisterOutput::not_found())];
        assert!(matches!(
            validate_operations(&model, &backwards).unwrap_err(),
            HistoryError::ReturnBeforeCall { .. }
        ));
    }

    #[test]
    fn test_validate_operations_one_outstanding_per_client() {
        let model = RegisterModel::new();

        // Returns at 5, after the same client's next call at 2
        let overlapping = vec![
            Operation::completed(1, 0, 0, 5, RegisterInput::put("a"), RegisterOutput::Put),
            Operation::completed(2, 0, 2, 3, RegisterInput::get(), RegisterOutput::found("a")),
        ];
        assert_eq!(
            validate_operations(&model, &overlapping).unwrap_err(),
            HistoryError::OverlappingCalls {
                index: 5,
                id: 1,
                client_id: 0,
                next_call_index: 2,
            }
        );

        let pending_then_call = vec![
            Operation::pending(1, 0, 0, RegisterInput::put("a")),
            Operation::completed(2, 0, 2, 3, RegisterInput::get(), RegisterOutput::found("a")),
        ];
        assert_eq!(
            validate_operations(&model, &pending_then_call).unwrap_err(),
            HistoryError::CallWhileOutstanding {
                index: 2,
                id: 2,
                client_id: 0,
                outstanding_id: 1,
            }
        );

        // Other clients may overlap freely
        let concurrent = vec![
            Operation::completed(1, 0, 0, 5, RegisterInput::put("a"), RegisterOutput::Put),
            Operation::completed(2, 1, 2, 3, RegisterInput::get(), RegisterOutput::found("a")),
        ];
        assert!(validate_operations(&model, &concurrent).is_ok());
    }

    #[test]
    fn test_validate_operations_superseded_index() {
        let model = RegisterModel::new();
        let superseded = |index| Operation {
            id: 1,
            client_id: 0,
            call_index: 0,
            input: RegisterInput::put("a"),
            completion: Completion::Superseded { index },
        };
        let next = Operation::completed(2, 0, 2, 3, RegisterInput::get(), RegisterOutput::found("a"));

        assert!(validate_operations(&model, &[superseded(2), next.clone()]).is_ok());
        assert_eq!(
            validate_operations(&model, &[superseded(1), next.clone()]).unwrap_err(),
            HistoryError::SupersededMismatch {
                index: 1,
                id: 1,
                client_id: 0,
            }
        );

        // No later call on the client to supersede it
        let lone = vec![superseded(2)];
        assert!(matches!(
            validate_operations(&model, &lone).unwrap_err(),
            HistoryError::SupersededMismatch { .. }
        ));

        // What the builder produces always validates
        let events = vec![
            Event::call(0, 1, RegisterInput::put("a")),
            Event::call(0, 2, RegisterInput::get()),
            Event::ret(0, 2, RegisterOutput::found("a")),
            Event::call(0, 3, RegisterInput::put("b")),
        ];
        let ops = build_operations(&model, &events).unwrap();
        assert!(validate_operations(&model, &ops).is_ok());
    }

    #[test]
    fn test_event_json_shape() {
        let event: RegisterEvent = Event::call(0, 2, RegisterInput::cas("", "19"));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: RegisterEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert!(json.contains("\"call\""));
    }
}
