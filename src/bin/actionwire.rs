use actionwire::api::{logging::init_tracing, RuntimeClient};
use actionwire::config::Config;
use actionwire::runtime::{ActionExecutor, ExecuteOptions, StreamMode};
use actionwire::state::SessionStore;
use actionwire::types::{ActionResult, StreamFrame};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "actionwire")]
#[command(about = "Invoke runtime actions over JSON or event-stream transport")]
struct Cli {
    /// Runtime base URL
    #[arg(long, env = "ACTIONWIRE_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one action and print its result
    Run {
        action_id: String,
        /// JSON payload sent with the action
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Use the event-stream endpoint and print frames as they arrive
        #[arg(long)]
        stream: bool,
    },
    /// Load and print the UI manifest
    Manifest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let mut config = Config::load()?;
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    config.validate()?;

    let client = RuntimeClient::new(&config)?;
    let executor = ActionExecutor::new(client, Arc::new(SessionStore::new()))
        .with_action_path(config.action_path.clone());

    match cli.command {
        Command::Run {
            action_id,
            payload,
            stream,
        } => {
            let payload: Value = serde_json::from_str(&payload)
                .with_context(|| format!("--payload is not valid JSON: {payload}"))?;
            let stream_path = stream.then(|| config.stream_path.clone());
            run(&executor, &action_id, payload, stream_path).await
        }
        Command::Manifest => match executor.reconciler().refresh_manifest().await {
            Ok(manifest) => {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
                Ok(())
            }
            Err(runtime_error) => {
                for line in runtime_error.status_lines() {
                    eprintln!("{line}");
                }
                bail!("manifest load failed ({})", runtime_error.stable_code)
            }
        },
    }
}

async fn run(
    executor: &ActionExecutor,
    action_id: &str,
    payload: Value,
    stream_path: Option<String>,
) -> Result<()> {
    let mut options = ExecuteOptions::default();
    let mut printer = None;
    let mut interrupt = None;

    if let Some(path) = stream_path {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        printer = Some(tokio::spawn(print_frames(events_rx)));
        interrupt = Some(tokio::spawn(cancel_on_ctrl_c(cancel.clone())));
        options = options.with_stream(
            StreamMode::new(path)
                .with_cancel(cancel)
                .with_events(events_tx),
        );
    }

    let (result, refreshes) = executor.run_action(action_id, payload, options).await;

    if let Some(interrupt) = interrupt {
        interrupt.abort();
    }
    if let Some(printer) = printer {
        printer.await.context("frame printer task failed")?;
    }
    refreshes.join().await;

    report(action_id, &result)
}

fn report(action_id: &str, result: &ActionResult) -> Result<()> {
    if result.is_ok() {
        println!("{}", serde_json::to_string_pretty(&result.to_json())?);
        return Ok(());
    }
    for line in result.status_lines() {
        eprintln!("{line}");
    }
    if result.is_cancelled() {
        bail!("action '{action_id}' was cancelled");
    }
    bail!("action '{action_id}' failed")
}

async fn print_frames(mut events: mpsc::UnboundedReceiver<StreamFrame>) {
    while let Some(frame) = events.recv().await {
        match frame.data.get("output").and_then(Value::as_str) {
            Some(output) => println!("[{}] {output}", frame.event),
            None => println!("[{}] {}", frame.event, frame.data),
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("interrupt received; cancelling action");
        cancel.cancel();
    }
}
