//! Counterexample visualization
//!
//! [`visualize`] turns the information kept by a failed check into a
//! self-contained HTML document. Only `Illegal` results carry a counterexample;
//! asking for anything else is an error rather than an empty document.

mod data;
mod html;

use std::io::Write;

use thiserror::Error;

use crate::checker::{CheckInfo, CheckResult};
use crate::model::Model;

pub use data::{
    build, BandOperation, ClientBand, Lattice, LatticeBuilder, LatticeEdge, NodeId,
    OperationStatus, PartitionView, StateNode, VisualizationData,
};
pub use html::render;

/// Errors that can occur while visualizing a check
#[derive(Debug, Error)]
pub enum VisualizeError {
    /// Only illegal results can be visualized
    #[error("nothing to visualize: check result is {result}, only Illegal results carry a counterexample")]
    Precondition { result: CheckResult },

    #[error("check result is Illegal but no partition recorded a counterexample trace")]
    MissingTrace,

    /// A reference to something that was never recorded
    #[error("{what} index {index} out of range for {len} recorded entries")]
    Bounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("failed to encode visualization data: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write visualization: {0}")]
    Io(#[from] std::io::Error),
}

/// Render the counterexample of an illegal check to `sink`
pub fn visualize<M: Model, W: Write>(
    model: &M,
    info: &CheckInfo<M::Input, M::Output, M::State>,
    mut sink: W,
) -> Result<(), VisualizeError> {
    let data = build(model, info)?;
    render(&data, &mut sink)?;
    sink.flush()?;
    tracing::debug!(
        clients = data.clients.len(),
        partitions = data.partitions.len(),
        "wrote counterexample visualization"
    );
    Ok(())
}
