//! Visualization data built from a failed check
//!
//! Two views are produced:
//! - one band per client with its operations positioned by event index
//! - per illegal partition, a lattice of the states the search visited on its
//!   deepest path and every step it attempted from them
//!
//! Lattice edges refer to nodes by index. Nodes are only ever appended through
//! [`LatticeBuilder`], and an edge is only accepted once both of its endpoints
//! exist, so a rendered document never refers to a state that was not recorded.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::VisualizeError;
use crate::checker::{CheckInfo, CheckResult, Counterexample, PartitionInfo, StepOutcome};
use crate::history::{Completion, Operation};
use crate::model::Model;

/// How an operation ended, as shown in a client band
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Completed,
    Superseded,
    Pending,
}

/// An operation positioned on its client's band
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BandOperation {
    pub id: usize,
    pub partition: usize,
    pub call_index: usize,
    pub return_index: Option<usize>,
    pub status: OperationStatus,
    pub description: String,
    /// Part of the deepest partial linearization of its partition
    pub linearized: bool,
}

/// All operations of one client, ordered by call index
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientBand {
    pub client_id: usize,
    pub operations: Vec<BandOperation>,
}

/// A state reached at some depth of the search
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateNode {
    /// Number of operations placed before reaching this state
    pub position: usize,
    /// Described state, `None` for an endpoint the search never resolved
    pub state: Option<String>,
}

impl StateNode {
    pub fn is_unresolved(&self) -> bool {
        self.state.is_none()
    }
}

/// One attempted step between two recorded states
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LatticeEdge {
    pub from: usize,
    pub to: usize,
    /// Event id of the operation that was tried
    pub op: usize,
    pub description: String,
    pub outcome: StepOutcome,
}

impl LatticeEdge {
    pub fn is_legal(&self) -> bool {
        self.outcome.is_legal()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Lattice {
    pub nodes: Vec<StateNode>,
    pub edges: Vec<LatticeEdge>,
}

/// Per-partition view
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartitionView {
    pub index: usize,
    pub result: CheckResult,
    /// Event ids along the deepest partial linearization
    pub path: Vec<usize>,
    pub lattice: Option<Lattice>,
}

/// Everything the renderer needs
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VisualizationData {
    pub result: CheckResult,
    pub clients: Vec<ClientBand>,
    pub partitions: Vec<PartitionView>,
}

/// Index of a node appended to a [`LatticeBuilder`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Append-only lattice under construction
#[derive(Debug, Default)]
pub struct LatticeBuilder {
    nodes: Vec<StateNode>,
    edges: Vec<LatticeEdge>,
    known: HashMap<(usize, String), NodeId>,
}

impl LatticeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for a described state at a position, reusing an equal one
    pub fn node(&mut self, position: usize, state: String) -> NodeId {
        if let Some(&id) = self.known.get(&(position, state.clone())) {
            return id;
        }
        let id = self.append(StateNode {
            position,
            state: Some(state.clone()),
        });
        self.known.insert((position, state), id);
        id
    }

    /// Sentinel node for an endpoint whose state was never produced
    pub fn unresolved(&mut self, position: usize) -> NodeId {
        self.append(StateNode {
            position,
            state: None,
        })
    }

    /// Add an edge between two recorded nodes
    pub fn push_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        op: usize,
        description: String,
        outcome: StepOutcome,
    ) -> Result<(), VisualizeError> {
        for endpoint in [from, to] {
            if endpoint.0 >= self.nodes.len() {
                return Err(VisualizeError::Bounds {
                    what: "state node",
                    index: endpoint.0,
                    len: self.nodes.len(),
                });
            }
        }
        self.edges.push(LatticeEdge {
            from: from.0,
            to: to.0,
            op,
            description,
            outcome,
        });
        Ok(())
    }

    pub fn finish(self) -> Lattice {
        Lattice {
            nodes: self.nodes,
            edges: self.edges,
        }
    }

    fn append(&mut self, node: StateNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }
}

/// Build the visualization of an illegal check
pub fn build<M: Model>(
    model: &M,
    info: &CheckInfo<M::Input, M::Output, M::State>,
) -> Result<VisualizationData, VisualizeError> {
    if info.result != CheckResult::Illegal {
        return Err(VisualizeError::Precondition {
            result: info.result,
        });
    }
    if info.illegal_partitions().all(|p| p.counterexample.is_none()) {
        return Err(VisualizeError::MissingTrace);
    }

    let mut clients: BTreeMap<usize, Vec<BandOperation>> = BTreeMap::new();
    let mut partitions = Vec::with_capacity(info.partitions.len());

    for (index, partition) in info.partitions.iter().enumerate() {
        let descriptions: Vec<String> = partition
            .operations
            .iter()
            .map(|op| describe(model, op))
            .collect();

        let on_path: HashSet<usize> = match &partition.counterexample {
            Some(trace) if partition.result == CheckResult::Illegal => {
                trace.path().into_iter().collect()
            }
            _ => HashSet::new(),
        };

        for (i, op) in partition.operations.iter().enumerate() {
            clients.entry(op.client_id).or_default().push(BandOperation {
                id: op.id,
                partition: index,
                call_index: op.call_index,
                return_index: op.return_index(),
                status: status(op),
                description: descriptions[i].clone(),
                linearized: on_path.contains(&i),
            });
        }

        partitions.push(partition_view(model, index, partition, &descriptions)?);
    }

    let clients = clients
        .into_iter()
        .map(|(client_id, mut operations)| {
            operations.sort_by_key(|op| op.call_index);
            ClientBand {
                client_id,
                operations,
            }
        })
        .collect();

    Ok(VisualizationData {
        result: info.result,
        clients,
        partitions,
    })
}

fn partition_view<M: Model>(
    model: &M,
    index: usize,
    partition: &PartitionInfo<M::Input, M::Output, M::State>,
    descriptions: &[String],
) -> Result<PartitionView, VisualizeError> {
    let trace = match &partition.counterexample {
        Some(trace) if partition.result == CheckResult::Illegal => trace,
        _ => {
            return Ok(PartitionView {
                index,
                result: partition.result,
                path: Vec::new(),
                lattice: None,
            })
        }
    };

    let path = trace
        .path()
        .into_iter()
        .map(|i| operation_id(&partition.operations, i))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PartitionView {
        index,
        result: partition.result,
        path,
        lattice: Some(lattice(model, trace, &partition.operations, descriptions)?),
    })
}

/// Lay out the counterexample as nodes and edges
///
/// The path node for depth `d + 1` is appended before any edge leaving depth
/// `d`, and every other edge target is appended right before its edge.
fn lattice<M: Model>(
    model: &M,
    trace: &Counterexample<M::State>,
    operations: &[Operation<M::Input, M::Output>],
    descriptions: &[String],
) -> Result<Lattice, VisualizeError> {
    let mut builder = LatticeBuilder::new();
    let Some(root) = trace.frames.first() else {
        return Ok(builder.finish());
    };
    let mut current = builder.node(0, model.describe_state(&root.state));

    for (depth, frame) in trace.frames.iter().enumerate() {
        let next = trace.frames.get(depth + 1).and_then(|next| {
            next.op
                .map(|op| (op, builder.node(depth + 1, model.describe_state(&next.state))))
        });

        for attempt in &frame.attempts {
            let id = operation_id(operations, attempt.op)?;
            let description = descriptions
                .get(attempt.op)
                .cloned()
                .ok_or(VisualizeError::Bounds {
                    what: "operation",
                    index: attempt.op,
                    len: descriptions.len(),
                })?;

            let to = match next {
                Some((op, node)) if op == attempt.op && attempt.outcome == StepOutcome::Accepted => {
                    node
                }
                _ => match &attempt.state {
                    Some(state) => builder.node(depth + 1, model.describe_state(state)),
                    None => builder.unresolved(depth + 1),
                },
            };
            builder.push_edge(current, to, id, description, attempt.outcome)?;
        }

        match next {
            Some((_, node)) => current = node,
            None => break,
        }
    }

    Ok(builder.finish())
}

fn operation_id<I, O>(operations: &[Operation<I, O>], index: usize) -> Result<usize, VisualizeError> {
    operations
        .get(index)
        .map(|op| op.id)
        .ok_or(VisualizeError::Bounds {
            what: "operation",
            index,
            len: operations.len(),
        })
}

fn describe<M: Model>(model: &M, op: &Operation<M::Input, M::Output>) -> String {
    match &op.completion {
        Completion::Returned { output, .. } => model.describe_operation(&op.input, output),
        Completion::Superseded { .. } | Completion::Pending => model.describe_pending(&op.input),
    }
}

fn status<I, O>(op: &Operation<I, O>) -> OperationStatus {
    match op.completion {
        Completion::Returned { .. } => OperationStatus::Completed,
        Completion::Superseded { .. } => OperationStatus::Superseded,
        Completion::Pending => OperationStatus::Pending,
    }
}
