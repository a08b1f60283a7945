//! Multi-key store of CAS registers
//!
//! Every key behaves like an independent [`RegisterModel`](super::RegisterModel).
//! Because keys never interact, the model partitions histories per key so that
//! each key is searched on its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::register::{self, RegisterInput, RegisterOutput};
use super::Model;
use crate::history::Operation;

/// Call value: a register operation on one key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvInput {
    pub key: String,
    #[serde(flatten)]
    pub op: RegisterInput,
}

impl KvInput {
    pub fn new(key: &str, op: RegisterInput) -> Self {
        KvInput {
            key: key.to_string(),
            op,
        }
    }
}

/// Key-value store model
#[derive(Clone, Copy, Debug)]
pub struct KvModel {
    partition_by_key: bool,
}

impl Default for KvModel {
    fn default() -> Self {
        Self::new()
    }
}

impl KvModel {
    /// Model that checks every key separately
    pub fn new() -> Self {
        KvModel {
            partition_by_key: true,
        }
    }

    /// Model that checks the whole history in one search
    pub fn unpartitioned() -> Self {
        KvModel {
            partition_by_key: false,
        }
    }
}

impl Model for KvModel {
    type State = BTreeMap<String, String>;
    type Input = KvInput;
    type Output = RegisterOutput;

    fn init(&self) -> Self::State {
        BTreeMap::new()
    }

    fn step(
        &self,
        state: &Self::State,
        input: &KvInput,
        output: &RegisterOutput,
    ) -> (bool, Self::State) {
        let current = state.get(&input.key).cloned();
        let (legal, next) = register::apply(&current, &input.op, output);
        (legal, with_value(state, &input.key, next))
    }

    fn step_pending(&self, state: &Self::State, input: &KvInput) -> Option<Self::State> {
        let current = state.get(&input.key).cloned();
        let next = register::apply_unobserved(&current, &input.op);
        Some(with_value(state, &input.key, next))
    }

    fn describe_operation(&self, input: &KvInput, output: &RegisterOutput) -> String {
        format!("{}: {}", input.key, register::describe(&input.op, output))
    }

    fn describe_pending(&self, input: &KvInput) -> String {
        format!("{}: {}", input.key, register::describe_unobserved(&input.op))
    }

    fn describe_state(&self, state: &Self::State) -> String {
        let entries: Vec<String> = state
            .iter()
            .map(|(k, v)| format!("{}={}", k, register::describe_value(&Some(v.clone()))))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }

    fn validate(&self, input: &KvInput, output: &RegisterOutput) -> Result<(), String> {
        register::check_shape(&input.op, output)
    }

    fn partition(
        &self,
        operations: &[Operation<KvInput, RegisterOutput>],
    ) -> Option<Vec<Vec<Operation<KvInput, RegisterOutput>>>> {
        if !self.partition_by_key {
            return None;
        }
        let mut by_key: BTreeMap<&str, Vec<Operation<KvInput, RegisterOutput>>> = BTreeMap::new();
        for op in operations {
            by_key.entry(op.input.key.as_str()).or_default().push(op.clone());
        }
        Some(by_key.into_values().collect())
    }
}

fn with_value(
    state: &BTreeMap<String, String>,
    key: &str,
    value: Option<String>,
) -> BTreeMap<String, String> {
    let mut next = state.clone();
    match value {
        Some(v) => {
            next.insert(key.to_string(), v);
        }
        None => {
            next.remove(key);
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{build_operations, Event};

    #[test]
    fn test_keys_are_independent() {
        let model = KvModel::new();
        let state = model.init();

        let (legal, state) = model.step(
            &state,
            &KvInput::new("a", RegisterInput::put("1")),
            &RegisterOutput::Put,
        );
        assert!(legal);

        let (legal, _) = model.step(
            &state,
            &KvInput::new("b", RegisterInput::get()),
            &RegisterOutput::not_found(),
        );
        assert!(legal);
    }

    #[test]
    fn test_partition_groups_by_key() {
        let model = KvModel::new();
        let events = vec![
            Event::call(0, 0, KvInput::new("x", RegisterInput::put("1"))),
            Event::call(1, 1, KvInput::new("y", RegisterInput::put("2"))),
            Event::ret(0, 0, RegisterOutput::Put),
            Event::ret(1, 1, RegisterOutput::Put),
            Event::call(0, 2, KvInput::new("x", RegisterInput::get())),
            Event::ret(0, 2, RegisterOutput::found("1")),
        ];
        let ops = build_operations(&model, &events).unwrap();

        let parts = model.partition(&ops).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 1);
        // Event indices refer to the full history
        assert_eq!(parts[0][1].call_index, 4);

        assert!(KvModel::unpartitioned().partition(&ops).is_none());
    }

    #[test]
    fn test_describe_state() {
        let model = KvModel::new();
        let mut state = model.init();
        state.insert("k".to_string(), "v".to_string());
        assert_eq!(model.describe_state(&state), "{k='v'}");
    }
}
