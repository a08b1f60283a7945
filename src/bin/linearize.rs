//! Linearizability checker binary
//!
//! Checks a JSON file of events against one of the built-in models and, when
//! the history is not linearizable, writes an HTML counterexample.
//!
//! Usage: linearize --model register|kv [--timeout SECS] [--step-limit N] [--no-memo]
//!                  [--parallel] [--out-dir DIR] [--prefix P] <EVENTS.json>
//!
//! The events file is a JSON array, e.g. for the register model:
//!   [{"client_id": 0, "id": 0, "kind": {"call": {"op": "put", "value": "1"}}},
//!    {"client_id": 0, "id": 0, "kind": {"return": {"op": "put"}}}]
//! Key-value events add a "key" field to every call.
//!
//! Exit codes: 0 linearizable, 1 not linearizable, 2 unknown (budget exhausted),
//! 3 malformed input, 4 any other failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use tracing::{error, info};

use linearize::model::{KvModel, RegisterModel};
use linearize::testing::write_counterexample;
use linearize::{CheckConfig, CheckResult, Checker, Event, Model};

const EXIT_ILLEGAL: u8 = 1;
const EXIT_UNKNOWN: u8 = 2;
const EXIT_MALFORMED: u8 = 3;
const EXIT_FAILURE: u8 = 4;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelKind {
    /// Single string register with get, put and cas
    Register,
    /// Independent registers addressed by key
    Kv,
}

#[derive(Parser, Debug)]
#[command(name = "linearize", version)]
#[command(about = "Check a history of concurrent operations for linearizability", long_about = None)]
struct Cli {
    /// Events file (JSON array)
    #[arg(value_name = "EVENTS")]
    events: PathBuf,

    /// Sequential model to check against
    #[arg(long, value_enum)]
    model: ModelKind,

    /// Give up after this many seconds and report unknown
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Give up after this many model steps per partition
    #[arg(long, value_name = "N")]
    step_limit: Option<u64>,

    /// Disable memoization of visited states
    #[arg(long)]
    no_memo: bool,

    /// Search partitions on separate threads
    #[arg(long)]
    parallel: bool,

    /// Directory for counterexample documents
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// File name prefix for counterexample documents
    #[arg(long, default_value = "linearize")]
    prefix: String,
}

impl Cli {
    fn config(&self) -> anyhow::Result<CheckConfig> {
        let mut config = CheckConfig::default()
            .with_memoization(!self.no_memo)
            .with_parallel(self.parallel);
        if let Some(secs) = self.timeout {
            let timeout = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid timeout {}", secs))?;
            config = config.with_timeout(timeout);
        }
        if let Some(limit) = self.step_limit {
            config = config.with_step_limit(limit);
        }
        Ok(config)
    }
}

/// Input that could not be turned into a history
#[derive(Debug)]
struct Malformed(anyhow::Error);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("linearize=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.model {
        ModelKind::Register => run(&RegisterModel, &cli),
        ModelKind::Kv => run(&KvModel::new(), &cli),
    };

    match outcome {
        Ok(Ok(code)) => code,
        Ok(Err(Malformed(e))) => {
            error!("malformed input: {:#}", e);
            ExitCode::from(EXIT_MALFORMED)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Parse the events file; only a parse failure counts as malformed input
fn parse_events<I, O>(path: &Path, text: &str) -> Result<Vec<Event<I, O>>, Malformed>
where
    I: DeserializeOwned,
    O: DeserializeOwned,
{
    serde_json::from_str(text)
        .with_context(|| format!("failed to parse events in {}", path.display()))
        .map_err(Malformed)
}

fn run<M>(model: &M, cli: &Cli) -> anyhow::Result<Result<ExitCode, Malformed>>
where
    M: Model,
    M::Input: DeserializeOwned,
    M::Output: DeserializeOwned,
{
    let config = match cli.config() {
        Ok(config) => config,
        Err(e) => return Ok(Err(Malformed(e))),
    };
    let text = std::fs::read_to_string(&cli.events)
        .with_context(|| format!("failed to read {}", cli.events.display()))?;
    let events = match parse_events::<M::Input, M::Output>(&cli.events, &text) {
        Ok(events) => events,
        Err(malformed) => return Ok(Err(malformed)),
    };
    info!(events = events.len(), model = ?cli.model, "checking history");

    let info = match Checker::new(model).with_config(config).check_events(&events) {
        Ok(info) => info,
        Err(e) => return Ok(Err(Malformed(e.into()))),
    };

    let code = match info.result {
        CheckResult::Ok => {
            println!("Ok: history is linearizable");
            ExitCode::SUCCESS
        }
        CheckResult::Unknown => {
            println!("Unknown: search budget exhausted after {} steps", info.total_steps());
            ExitCode::from(EXIT_UNKNOWN)
        }
        CheckResult::Illegal => {
            let path = write_counterexample(model, &info, &cli.out_dir, &cli.prefix)
                .context("failed to write counterexample")?;
            println!("Illegal: counterexample written to {}", path.display());
            ExitCode::from(EXIT_ILLEGAL)
        }
    };
    Ok(Ok(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_for(events: PathBuf, out_dir: PathBuf) -> Cli {
        Cli {
            events,
            model: ModelKind::Register,
            timeout: None,
            step_limit: None,
            no_memo: false,
            parallel: false,
            out_dir,
            prefix: "linearize".to_string(),
        }
    }

    #[test]
    fn test_unreadable_file_is_not_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli_for(dir.path().join("missing.json"), dir.path().to_path_buf());
        assert!(run(&RegisterModel, &cli).is_err());
    }

    #[test]
    fn test_bad_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "[{\"client_id\": 0").unwrap();
        let cli = cli_for(path, dir.path().to_path_buf());
        assert!(matches!(run(&RegisterModel, &cli), Ok(Err(Malformed(_)))));
    }

    #[test]
    fn test_illegal_history_writes_counterexample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let events: Vec<Event<_, _>> = vec![
            Event::call(0, 0, linearize::model::RegisterInput::put("a")),
            Event::ret(0, 0, linearize::model::RegisterOutput::Put),
            Event::call(1, 1, linearize::model::RegisterInput::get()),
            Event::ret(1, 1, linearize::model::RegisterOutput::not_found()),
        ];
        std::fs::write(&path, serde_json::to_string(&events).unwrap()).unwrap();

        let cli = cli_for(path, dir.path().join("out"));
        assert!(matches!(run(&RegisterModel, &cli), Ok(Ok(_))));
        assert!(dir.path().join("out").join("linearize.000.html").exists());
    }
}
