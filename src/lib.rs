//! Linearizability checking with counterexample visualization
//!
//! A history of concurrent calls and returns is checked against a sequential
//! [`Model`]. When no linearization exists, the deepest partial linearization
//! the search reached can be rendered as an HTML document with [`visualize`].
//!
//! Modules:
//! - `model`: the `Model` trait plus register and key-value models
//! - `history`: events, operations and history validation
//! - `checker`: the linearizability search and its entry points
//! - `visualize`: counterexample data and HTML rendering

pub mod checker;
pub mod history;
pub mod model;
pub mod visualize;

/// Helpers for test harnesses that persist counterexamples.
pub mod testing;

pub use checker::{
    check_events, check_events_verbose, check_operations, check_operations_verbose, CheckConfig,
    CheckInfo, CheckResult, Checker, ModelInfo,
};
pub use history::{Event, EventKind, HistoryError, Operation};
pub use model::Model;
pub use visualize::{visualize, VisualizeError};
