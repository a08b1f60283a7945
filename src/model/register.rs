//! String register with compare-and-swap
//!
//! Operations:
//! - `Get` - read the current value, `None` when the register was never written
//! - `Put` - unconditionally overwrite the value
//! - `Cas` - replace the value if it equals `old`; an empty `old` matches anything
//!
//! The register starts empty.

use serde::{Deserialize, Serialize};

use super::Model;

/// Call value for a register operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RegisterInput {
    Get,
    Put { value: String },
    Cas { old: String, new: String },
}

/// Return value for a register operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RegisterOutput {
    /// Value observed by a read (None = not found)
    Get { value: Option<String> },
    Put,
    /// Whether the swap happened, and the value the server reported afterwards
    Cas { swapped: bool, current: String },
}

impl RegisterInput {
    pub fn get() -> Self {
        RegisterInput::Get
    }

    pub fn put(value: &str) -> Self {
        RegisterInput::Put {
            value: value.to_string(),
        }
    }

    pub fn cas(old: &str, new: &str) -> Self {
        RegisterInput::Cas {
            old: old.to_string(),
            new: new.to_string(),
        }
    }
}

impl RegisterOutput {
    pub fn found(value: &str) -> Self {
        RegisterOutput::Get {
            value: Some(value.to_string()),
        }
    }

    pub fn not_found() -> Self {
        RegisterOutput::Get { value: None }
    }

    pub fn cas(swapped: bool, current: &str) -> Self {
        RegisterOutput::Cas {
            swapped,
            current: current.to_string(),
        }
    }
}

/// Apply one observed register operation to a register value
///
/// Shared with the multi-key store, which keeps one such value per key.
pub(crate) fn apply(
    state: &Option<String>,
    input: &RegisterInput,
    output: &RegisterOutput,
) -> (bool, Option<String>) {
    match (input, output) {
        (RegisterInput::Get, RegisterOutput::Get { value }) => (state == value, state.clone()),
        (RegisterInput::Put { value }, RegisterOutput::Put) => (true, Some(value.clone())),
        (RegisterInput::Cas { old, new }, RegisterOutput::Cas { swapped, .. }) => {
            // Empty expected value behaves like a put
            if old.is_empty() {
                return (true, Some(new.clone()));
            }
            let matches = state.as_deref() == Some(old.as_str());
            if matches && *swapped {
                (true, Some(new.clone()))
            } else if !matches && !*swapped {
                (true, state.clone())
            } else {
                (false, state.clone())
            }
        }
        _ => (false, state.clone()),
    }
}

/// Apply a register operation whose result was never observed
pub(crate) fn apply_unobserved(state: &Option<String>, input: &RegisterInput) -> Option<String> {
    match input {
        RegisterInput::Get => state.clone(),
        RegisterInput::Put { value } => Some(value.clone()),
        RegisterInput::Cas { old, new } => {
            if old.is_empty() || state.as_deref() == Some(old.as_str()) {
                Some(new.clone())
            } else {
                state.clone()
            }
        }
    }
}

pub(crate) fn check_shape(input: &RegisterInput, output: &RegisterOutput) -> Result<(), String> {
    match (input, output) {
        (RegisterInput::Get, RegisterOutput::Get { .. })
        | (RegisterInput::Put { .. }, RegisterOutput::Put)
        | (RegisterInput::Cas { .. }, RegisterOutput::Cas { .. }) => Ok(()),
        _ => Err(format!("{:?} answered by {:?}", input, output)),
    }
}

pub(crate) fn describe(input: &RegisterInput, output: &RegisterOutput) -> String {
    match (input, output) {
        (RegisterInput::Get, RegisterOutput::Get { value: Some(v) }) => format!("get() -> '{}'", v),
        (RegisterInput::Get, RegisterOutput::Get { value: None }) => {
            "get() -> <not found>".to_string()
        }
        (RegisterInput::Put { value }, _) => format!("put('{}')", value),
        (RegisterInput::Cas { old, new }, RegisterOutput::Cas { swapped: true, .. }) => {
            format!("cas('{}' -> '{}') ok", old, new)
        }
        (RegisterInput::Cas { old, .. }, RegisterOutput::Cas { current, .. }) => {
            format!("cas rejected: '{}' != '{}'", old, current)
        }
        _ => format!("{:?} -> {:?}", input, output),
    }
}

pub(crate) fn describe_unobserved(input: &RegisterInput) -> String {
    match input {
        RegisterInput::Get => "get() -> ?".to_string(),
        RegisterInput::Put { value } => format!("put('{}') ?", value),
        RegisterInput::Cas { old, new } => format!("cas('{}' -> '{}') ?", old, new),
    }
}

pub(crate) fn describe_value(state: &Option<String>) -> String {
    match state {
        Some(v) => format!("'{}'", v),
        None => "<empty>".to_string(),
    }
}

/// Single string register supporting get, put and compare-and-swap
#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterModel;

impl RegisterModel {
    pub fn new() -> Self {
        RegisterModel
    }
}

impl Model for RegisterModel {
    type State = Option<String>;
    type Input = RegisterInput;
    type Output = RegisterOutput;

    fn init(&self) -> Option<String> {
        None
    }

    fn step(
        &self,
        state: &Option<String>,
        input: &RegisterInput,
        output: &RegisterOutput,
    ) -> (bool, Option<String>) {
        apply(state, input, output)
    }

    fn step_pending(&self, state: &Option<String>, input: &RegisterInput) -> Option<Option<String>> {
        Some(apply_unobserved(state, input))
    }

    fn describe_operation(&self, input: &RegisterInput, output: &RegisterOutput) -> String {
        describe(input, output)
    }

    fn describe_pending(&self, input: &RegisterInput) -> String {
        describe_unobserved(input)
    }

    fn describe_state(&self, state: &Option<String>) -> String {
        describe_value(state)
    }

    fn validate(&self, input: &RegisterInput, output: &RegisterOutput) -> Result<(), String> {
        check_shape(input, output)
    }
}
