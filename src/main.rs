//! graphd CLI - serialized access to an embedded SQLite graph.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use graphd::{Completion, Config, Dispatcher, Operation, Outcome, SqliteGraph};
use log::info;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("graphd")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("graphd.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn format_outcome(outcome: Outcome) -> ColoredString {
    match outcome {
        Outcome::Success => "ok".green(),
        Outcome::NotFound => "not found".yellow(),
        Outcome::InvalidInput => "invalid input".yellow(),
        Outcome::InternalError => "error".red(),
        Outcome::Unavailable => "unavailable".red(),
    }
}

fn print_completion(operation: &Operation, completion: &Completion) -> Result<()> {
    println!(
        "{} {} {}",
        format_outcome(completion.outcome),
        operation.kind().name().cyan(),
        format!("({})", completion.outcome.status_code()).dimmed()
    );
    let json = serde_json::to_string_pretty(&completion.payload).context("Failed to format payload")?;
    println!("{}", json);
    Ok(())
}

/// Read JSON-lines operations from `path`, or stdin when `None`.
fn read_script(path: Option<&Path>) -> Result<Vec<Operation>> {
    let reader: Box<dyn BufRead> = match path {
        Some(path) => Box::new(BufReader::new(
            fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut operations = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        let operation: Operation =
            serde_json::from_str(&line).with_context(|| format!("Invalid operation on line {}", n + 1))?;
        operations.push(operation);
    }

    Ok(operations)
}

/// Submit every operation up front, then report results in submission order.
/// Returns true when all succeeded.
async fn apply(dispatcher: &Dispatcher, operations: Vec<Operation>) -> Result<bool> {
    let handles: Vec<_> = operations
        .into_iter()
        .map(|op| {
            let handle = dispatcher.submit(op.clone());
            (op, handle)
        })
        .collect();

    info!("Submitted {} operations", handles.len());

    let mut all_ok = true;
    for (op, handle) in handles {
        let completion = handle.await;
        all_ok &= completion.outcome.is_success();
        print_completion(&op, &completion)?;
    }

    Ok(all_ok)
}

fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(db) = cli.db {
        config.database = db;
    }

    let operations = match (&cli.command, cli.command.operation(config.batch_size)) {
        (_, Some(op)) => vec![op],
        (Command::Apply { file }, None) => read_script(file.as_deref())?,
        (_, None) => Vec::new(),
    };

    let store = SqliteGraph::open(&config.database).context("Failed to open graph database")?;
    info!("Using database {}", config.database.display());

    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    rt.block_on(async {
        let dispatcher = Dispatcher::start(store, &config).context("Failed to start worker")?;
        let ok = apply(&dispatcher, operations).await?;
        dispatcher.shutdown().await.context("Failed to stop worker")?;
        Ok::<_, eyre::Report>(ok)
    })
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
