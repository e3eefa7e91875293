use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use graphrun_api::GraphClient;
use graphrun_engine::{
    CycleReport, ExecutionController, GraphrunConfig, collect_inputs, config::apply_env_overrides, load_config,
    load_config_from_path, parse_assignment,
};
use graphrun_types::{ExecutionOutcome, InputValues, ThreadId, UpdatedState};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

mod render;

use render::{Renderer, print_outcome_hint};

#[derive(Debug, Parser)]
#[command(name = "graphrun", version, about = "Drive resumable remote graph executions")]
struct Cli {
    /// Base URL of the execution service; overrides config and GRAPHRUN_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Path to the config file (defaults to ~/.config/graphrun/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print every notification as a JSON event.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the inputs the service expects.
    Init,
    /// Start a new execution.
    Submit {
        #[arg(long)]
        thread: String,
        /// Input value as NAME=VALUE; NAME=@path reads the value from a file.
        #[arg(long = "input", short = 'i')]
        inputs: Vec<String>,
    },
    /// Resume an interrupted execution from a checkpoint.
    Resume {
        #[arg(long)]
        thread: String,
        #[arg(long)]
        node: String,
        #[arg(long)]
        checkpoint: Option<String>,
        /// JSON payload sent as the checkpoint data.
        #[arg(long)]
        data: Option<String>,
    },
    /// Submit, then keep resuming after every interruption until the execution completes.
    Run {
        #[arg(long)]
        thread: String,
        #[arg(long = "input", short = 'i')]
        inputs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let base_url = match &cli.base_url {
        Some(base_url) => base_url.clone(),
        None => config.base_url()?.to_string(),
    };

    let client = GraphClient::new(&base_url, config.client_options())?;
    let controller = ExecutionController::new(Arc::new(client), config.controller_options());
    let renderer = Renderer {
        json: cli.json,
        show_init: matches!(cli.command, Command::Init),
    };

    drive(&controller, renderer, run_command(&controller, cli.command)).await
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_config(cli: &Cli) -> Result<GraphrunConfig> {
    match &cli.config {
        Some(path) => {
            let mut config = load_config_from_path(path)?;
            apply_env_overrides(&mut config);
            Ok(config)
        }
        None => Ok(load_config()?),
    }
}

/// Run `work` while rendering notifications as they arrive. Ctrl-C cancels the in-flight cycle.
async fn drive(controller: &ExecutionController, renderer: Renderer, work: impl Future<Output = Result<()>>) -> Result<()> {
    let mut events = controller.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(work, ctrl_c);
    let mut interrupted = false;
    let mut events_closed = false;

    loop {
        tokio::select! {
            biased;
            event = events.recv(), if !events_closed => match event {
                Some(event) => renderer.render(&event)?,
                None => events_closed = true,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if !controller.cancel() {
                    bail!("interrupted");
                }
            }
            result = &mut work => {
                while let Ok(event) = events.try_recv() {
                    renderer.render(&event)?;
                }
                return result;
            }
        }
    }
}

async fn run_command(controller: &ExecutionController, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            controller.initialize().await?;
        }
        Command::Submit { thread, inputs } => {
            let thread_id = ThreadId::from(thread);
            let inputs = prepare_inputs(controller, &inputs).await?;
            controller.on_thread_selected(thread_id.clone());
            let report = controller.submit_selected(inputs).await?;
            report_outcome(controller, &thread_id, &report);
        }
        Command::Resume {
            thread,
            node,
            checkpoint,
            data,
        } => {
            let thread_id = ThreadId::from(thread);
            let data = match data {
                Some(raw) => serde_json::from_str(&raw).context("--data must be valid JSON")?,
                None => Value::Null,
            };
            let state = UpdatedState {
                node,
                checkpoint,
                data,
                next: None,
            };
            controller.on_thread_selected(thread_id.clone());
            let report = controller.resume(&thread_id, state).await?;
            report_outcome(controller, &thread_id, &report);
        }
        Command::Run { thread, inputs } => {
            let thread_id = ThreadId::from(thread);
            let inputs = prepare_inputs(controller, &inputs).await?;
            controller.on_thread_selected(thread_id.clone());
            run_interactive(controller, &thread_id, inputs).await?;
        }
    }
    Ok(())
}

async fn prepare_inputs(controller: &ExecutionController, raw_inputs: &[String]) -> Result<InputValues> {
    let init = controller.initialize().await.context("failed to fetch input metadata")?;
    let mut pairs = Vec::with_capacity(raw_inputs.len());
    for raw in raw_inputs {
        let (name, value) = parse_assignment(raw)?;
        let value = match value.strip_prefix('@') {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read value for '{name}' from {path}"))?
                .trim_end_matches(['\r', '\n'])
                .to_string(),
            None => value,
        };
        pairs.push((name, value));
    }
    Ok(collect_inputs(&init.args, pairs)?)
}

fn report_outcome(controller: &ExecutionController, thread_id: &ThreadId, report: &CycleReport) {
    let held = controller.updated_state();
    print_outcome_hint(thread_id, report.outcome, held.as_ref());
}

async fn run_interactive(controller: &ExecutionController, thread_id: &ThreadId, inputs: InputValues) -> Result<()> {
    let mut report = controller.submit(thread_id, inputs).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match report.outcome {
            Some(ExecutionOutcome::Completed) => return Ok(()),
            Some(ExecutionOutcome::Interrupted) => {}
            None => {
                print_outcome_hint(thread_id, None, None);
                return Ok(());
            }
        }
        let Some(mut state) = controller.updated_state() else {
            print_outcome_hint(thread_id, report.outcome, None);
            return Ok(());
        };

        eprint!("resume from '{}' with JSON data (empty line keeps the checkpoint data, q quits): ", state.node);
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let line = line.trim();
        if line == "q" {
            print_outcome_hint(thread_id, report.outcome, Some(&state));
            return Ok(());
        }
        if !line.is_empty() {
            state.data = match serde_json::from_str(line) {
                Ok(data) => data,
                Err(error) => {
                    eprintln!("invalid JSON: {error}");
                    continue;
                }
            };
        }
        report = controller.resume(thread_id, state).await?;
    }
}
