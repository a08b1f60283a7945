//! Tests for counterexample visualization.
//!
//! Covers the CAS scenario with an operation that never returns, the
//! precondition on non-illegal results, and persisting documents to disk.

use std::time::Duration;

use linearize::model::{RegisterInput, RegisterModel, RegisterOutput};
use linearize::testing::{cleanup, next_available_path, write_counterexample};
use linearize::visualize::{build, OperationStatus};
use linearize::{
    check_events, check_events_verbose, visualize, CheckConfig, CheckResult, Checker, Event, Model,
    VisualizeError,
};

type RegisterEvent = Event<RegisterInput, RegisterOutput>;

/// Register history where client 1 issues two CAS calls and only the second returns.
fn cas_scenario() -> Vec<RegisterEvent> {
    vec![
        Event::call(0, 0, RegisterInput::cas("", "19")),
        Event::ret(0, 0, RegisterOutput::cas(true, "19")),
        Event::call(1, 1, RegisterInput::get()),
        Event::ret(1, 1, RegisterOutput::found("19")),
        Event::call(1, 6, RegisterInput::cas("19", "15")),
        Event::call(1, 7, RegisterInput::cas("19", "15")),
        Event::ret(1, 7, RegisterOutput::cas(true, "15")),
    ]
}

fn render_to_string<M: Model>(
    model: &M,
    info: &linearize::ModelInfo<M>,
) -> Result<String, VisualizeError> {
    let mut out = Vec::new();
    visualize(model, info, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

/// Test that the scenario with an unreturned call visualizes without error.
#[test]
fn test_visualize_unreturned_call_scenario() {
    let model = RegisterModel;
    let events = cas_scenario();
    assert!(!check_events(&model, &events));

    let (result, info) =
        check_events_verbose(&model, &events, Some(Duration::from_secs(10))).unwrap();
    assert_eq!(result, CheckResult::Illegal);
    assert!(info.partitions[0].counterexample.is_some());

    let html = render_to_string(&model, &info).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.trim_end().ends_with("</body></html>"));
    assert!(html.contains("cas(&#39;19&#39; -&gt; &#39;15&#39;) ?"));
    assert!(html.contains("cas(&#39;19&#39; -&gt; &#39;15&#39;) ok"));
}

/// Test the structure of the data behind the document.
#[test]
fn test_visualization_data_for_scenario() {
    let model = RegisterModel;
    let (_, info) = check_events_verbose(&model, &cas_scenario(), None).unwrap();
    let data = build(&model, &info).unwrap();

    assert_eq!(data.result, CheckResult::Illegal);
    let client_ids: Vec<usize> = data.clients.iter().map(|c| c.client_id).collect();
    assert_eq!(client_ids, vec![0, 1]);

    let client1 = &data.clients[1];
    let statuses: Vec<(usize, OperationStatus)> = client1
        .operations
        .iter()
        .map(|op| (op.id, op.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (1, OperationStatus::Completed),
            (6, OperationStatus::Superseded),
            (7, OperationStatus::Completed),
        ]
    );

    // The deepest path places 0, 1 and 6, then 7 is refuted
    let view = &data.partitions[0];
    assert_eq!(view.path, vec![0, 1, 6]);
    let lattice = view.lattice.as_ref().unwrap();
    for edge in &lattice.edges {
        assert!(edge.from < lattice.nodes.len());
        assert!(edge.to < lattice.nodes.len());
    }
    assert!(lattice
        .edges
        .iter()
        .any(|edge| edge.op == 7 && !edge.is_legal()));
}

/// Test that results other than Illegal are refused.
#[test]
fn test_visualize_precondition() {
    let model = RegisterModel;

    let ok_events = vec![
        Event::call(0, 0, RegisterInput::put("a")),
        Event::ret(0, 0, RegisterOutput::Put),
    ];
    let (result, info) = check_events_verbose(&model, &ok_events, None).unwrap();
    assert_eq!(result, CheckResult::Ok);
    let mut sink = Vec::new();
    let err = visualize(&model, &info, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        VisualizeError::Precondition {
            result: CheckResult::Ok
        }
    ));
    assert!(sink.is_empty());

    let info = Checker::new(&model)
        .with_config(CheckConfig::default().with_step_limit(0))
        .check_events(&cas_scenario())
        .unwrap();
    assert_eq!(info.result, CheckResult::Unknown);
    let err = visualize(&model, &info, Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        VisualizeError::Precondition {
            result: CheckResult::Unknown
        }
    ));
    assert!(err.to_string().contains("Unknown"));
}

/// Register model whose values carry the id of the event they came from.
///
/// `describe_operation` panics if it is ever handed an input and an output
/// from different operations.
struct IdCheckingModel;

impl Model for IdCheckingModel {
    type State = Option<String>;
    type Input = (usize, RegisterInput);
    type Output = (usize, RegisterOutput);

    fn init(&self) -> Self::State {
        None
    }

    fn step(
        &self,
        state: &Self::State,
        input: &Self::Input,
        output: &Self::Output,
    ) -> (bool, Self::State) {
        RegisterModel.step(state, &input.1, &output.1)
    }

    fn step_pending(&self, state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        RegisterModel.step_pending(state, &input.1)
    }

    fn describe_operation(&self, input: &Self::Input, output: &Self::Output) -> String {
        assert_eq!(input.0, output.0, "description of mismatched pair");
        RegisterModel.describe_operation(&input.1, &output.1)
    }

    fn describe_state(&self, state: &Self::State) -> String {
        RegisterModel.describe_state(state)
    }
}

/// Test that descriptions only ever pair an input with its own output.
#[test]
fn test_descriptions_use_matching_pairs() {
    let tagged: Vec<Event<(usize, RegisterInput), (usize, RegisterOutput)>> = cas_scenario()
        .into_iter()
        .map(|event| match event.kind {
            linearize::EventKind::Call(input) => Event::call(event.client_id, event.id, (event.id, input)),
            linearize::EventKind::Return(output) => {
                Event::ret(event.client_id, event.id, (event.id, output))
            }
        })
        .collect();

    let model = IdCheckingModel;
    let (result, info) = check_events_verbose(&model, &tagged, None).unwrap();
    assert_eq!(result, CheckResult::Illegal);
    let html = render_to_string(&model, &info).unwrap();
    assert!(html.contains("Result: Illegal"));
}

/// Test that documents are persisted under non-colliding names and cleaned up.
#[test]
fn test_persist_counterexamples() {
    let model = RegisterModel;
    let (_, info) = check_events_verbose(&model, &cas_scenario(), None).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let first = write_counterexample(&model, &info, dir.path(), "cas").unwrap();
    let second = write_counterexample(&model, &info, dir.path(), "cas").unwrap();
    assert_ne!(first, second);
    assert_eq!(
        next_available_path(dir.path(), "cas", "html").unwrap(),
        dir.path().join("cas.002.html")
    );

    assert_eq!(cleanup(dir.path(), "cas").unwrap(), 2);
    assert_eq!(
        next_available_path(dir.path(), "cas", "html").unwrap(),
        dir.path().join("cas.000.html")
    );
}
