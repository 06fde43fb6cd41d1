use clap::{Parser, Subcommand};
use intentql_runtime::Pipeline;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Report;
use commands::prepare::PrepareArgs;

#[derive(Parser, Debug)]
#[command(name = "intentql", version, about = "Compile and guard query intents")]
struct Cli {
    /// Configuration file. Defaults to ./intentql.yaml when present.
    #[arg(long, global = true, env = "INTENTQL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the SQL linter over a statement.
    Lint {
        sql: String,

        /// Table the statement may reference (repeatable). None means any.
        #[arg(long = "allow-table")]
        allow_tables: Vec<String>,
    },

    /// Validate and compile an intent file, without guardrails.
    Compile {
        /// Path to the intent JSON.
        intent: PathBuf,

        /// Path to a principal JSON (`{"id": .., "attrs": {..}}`).
        #[arg(long)]
        user: Option<PathBuf>,
    },

    /// Validate, compile, lint and (with --database-url) explain an intent.
    Prepare {
        intent: PathBuf,

        #[arg(long)]
        user: Option<PathBuf>,

        #[arg(long = "allow-table")]
        allow_tables: Vec<String>,

        /// Postgres URL used for EXPLAIN. Enables the explain gate.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load the configuration and print the effective settings.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the JSON report, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let report = match cli.cmd {
        Command::Lint { sql, allow_tables } => {
            let config = commands::load_config(config_path)?;
            commands::lint::run(&config, &sql, &allow_tables)?
        }

        Command::Compile { intent, user } => {
            let pipeline = Pipeline::from_config(commands::load_config(config_path)?)?;
            commands::compile::run(&pipeline, &intent, user.as_deref())?
        }

        Command::Prepare {
            intent,
            user,
            allow_tables,
            database_url,
        } => {
            let config = commands::load_config(config_path)?;
            let args = PrepareArgs {
                intent: &intent,
                user: user.as_deref(),
                allow_tables: &allow_tables,
                database_url: database_url.as_deref(),
            };
            commands::prepare::run(config, args).await?
        }

        Command::Config {
            cmd: ConfigCommand::Check,
        } => commands::config::check(config_path)?,
    };

    emit(report)
}

fn emit(report: Report) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&report.body)?);
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
