mod commands;
mod output;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use tempo_core::calbridge::CalBridgeClient;
use tempo_core::model::OllamaClient;
use tempo_core::pipeline::Pipeline;
use tempo_core::TempoConfig;
use tempo_db::TaskDb;

use crate::output::Output;

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "Schedule tasks on your calendar from natural language")]
#[command(version)]
struct Cli {
    /// Natural-language scheduling request, e.g. "Call mom tomorrow at 2pm"
    query: Option<String>,

    /// Read queries interactively until EOF
    #[arg(long, conflicts_with = "query")]
    interactive: bool,

    /// IANA timezone (overrides config and TIMEZONE)
    #[arg(long)]
    timezone: Option<String>,

    /// Database file path (overrides config)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Emit the final trace as JSON
    #[arg(long)]
    json: bool,

    /// List persisted tasks and their calendar events
    #[arg(long)]
    list: bool,

    /// Delete a task by id (a parent cascades to its subtasks)
    #[arg(long, value_name = "ID")]
    delete: Option<String>,

    /// Delete only the subtasks of a parent task
    #[arg(long, value_name = "ID")]
    delete_parent: Option<String>,

    /// Delete every tracked task and event (asks for confirmation)
    #[arg(long)]
    delete_all: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_appender::rolling;
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tempo")
        .join("logs");
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = rolling::daily(&log_dir, "tempo.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = if debug {
        EnvFilter::new("tempo_core=debug,tempo_db=debug,tempo_cli=debug,info")
    } else {
        EnvFilter::new("tempo_core=warn,tempo_db=warn,tempo_cli=warn,warn")
    };

    let terminal_layer = if debug {
        fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .boxed()
    } else {
        fmt::layer().with_target(false).compact().boxed()
    };

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new(
            "tempo_core=debug,tempo_db=debug,tempo_cli=debug,info",
        ));

    tracing_subscriber::registry()
        .with(terminal_layer.with_filter(env_filter))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.debug);
    let output = Output::new();

    let mut config = TempoConfig::load(cli.config.as_deref())?;
    if let Some(tz) = &cli.timezone {
        config.timezone = tz.clone();
    }
    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    // Fail fast on an unknown zone before touching anything else.
    config.tz()?;

    info!(db = %config.database.path.display(), "opening task database");
    let db = TaskDb::open(&config.database.path).await.map_err(tempo_core::CoreError::Db)?;
    let backend = CalBridgeClient::new(config.calbridge_base.clone())?;

    // Maintenance commands need no model server.
    if cli.list {
        return commands::tasks::list(&backend, &db, &output).await;
    }
    if let Some(id) = &cli.delete {
        return commands::tasks::delete(&backend, &db, id, &output).await;
    }
    if let Some(id) = &cli.delete_parent {
        return commands::tasks::delete_parent(&backend, &db, id, &output).await;
    }
    if cli.delete_all {
        return commands::tasks::delete_all(&backend, &db, &output).await;
    }

    let llm = OllamaClient::new(config.ollama_base.clone(), config.ollama_model.clone())?;
    let pipeline = Pipeline::new(llm, backend, db, config);

    let exit_code = if cli.interactive {
        run_interactive(&pipeline, cli.json, &output).await?
    } else if let Some(query) = &cli.query {
        commands::schedule::run(&pipeline, query, cli.json, &output).await
    } else {
        output.error("Provide a query, or use --interactive, --list, or --delete. See --help.");
        1
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Read queries from stdin until EOF or "quit".
async fn run_interactive(
    pipeline: &Pipeline<OllamaClient, CalBridgeClient>,
    json: bool,
    output: &Output,
) -> Result<i32> {
    output.status("Interactive mode. Type a scheduling request, or 'quit' to exit.");
    let stdin = std::io::stdin();
    let mut last_code = 0;

    loop {
        print!("tempo> ");
        std::io::stdout().flush().into_diagnostic()?;

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).into_diagnostic()?;
        if read == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        last_code = commands::schedule::run(pipeline, line, json, output).await;
    }
    Ok(last_code)
}
