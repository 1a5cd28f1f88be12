//! # DocxAI CLI (`docxai`)
//!
//! Starts the HTTP/MCP server, or works on a local `.docx` file directly.
//!
//! ## Usage
//!
//! ```bash
//! docxai --config ./config/docxai.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docxai serve` | Start the REST API, widget and MCP endpoint |
//! | `docxai inspect <file>` | Print statistics and numbered paragraphs |
//! | `docxai analyze <file> --query "..."` | Print suggestions for a file |
//! | `docxai apply <file> --suggestions s.json --ids s1,s2` | Write a modified copy |
//!
//! ## Environment
//!
//! `OPENAI_API_KEY` enables the model path (a `.env` file is read if
//! present). `NGROK_URL` is a fallback public URL. `RUST_LOG` overrides the
//! default log filter `docxai=info,tower_http=info`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docxai::{commands, config, server};

/// DocxAI: paragraph-level editing suggestions for Word documents.
#[derive(Parser)]
#[command(
    name = "docxai",
    about = "DocxAI: paragraph-level editing suggestions for Word documents",
    version,
    long_about = "DocxAI reads .docx files, asks a chat completion model (or built-in \
    heuristics) for paragraph rewrites matching an editing request, and writes modified \
    copies with the suggestions you select. It runs as a CLI, a REST API with an embeddable \
    widget, and an MCP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docxai.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/docxai.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (REST API, widget page and MCP endpoint).
    Serve {
        /// Override `[server].bind`, e.g. `127.0.0.1:9000`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print word and paragraph counts and the numbered body paragraphs.
    Inspect {
        file: PathBuf,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Generate suggestions for a local file.
    Analyze {
        file: PathBuf,

        /// Editing request, e.g. "make it more formal".
        #[arg(long, short)]
        query: String,

        /// Print the suggestions as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Write a copy with selected suggestions applied.
    ///
    /// Pass the output of `analyze --json` with `--suggestions`. `--query`
    /// re-runs the analysis instead, which is only allowed with the built-in
    /// heuristics because model suggestions differ between runs.
    Apply {
        file: PathBuf,

        /// JSON file written by `docxai analyze --json`.
        #[arg(long, short, conflicts_with = "query", required_unless_present = "query")]
        suggestions: Option<PathBuf>,

        /// Editing request, e.g. "make it more formal".
        #[arg(long, short)]
        query: Option<String>,

        /// Comma-separated suggestion ids, as printed by `analyze`.
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,

        /// Output path. Defaults to `<stem>_modified.docx` next to the input.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docxai=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Inspecting a file needs no configuration.
    if let Commands::Inspect { file, json } = &cli.command {
        return commands::run_inspect(file, *json);
    }

    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
        Commands::Analyze { file, query, json } => {
            commands::run_analyze(&cfg, &file, &query, json).await?;
        }
        Commands::Apply {
            file,
            suggestions,
            query,
            ids,
            output,
        } => {
            let source = match (suggestions, query) {
                (Some(path), _) => commands::ApplySource::File(path),
                (None, Some(query)) => commands::ApplySource::Query(query),
                (None, None) => unreachable!("clap requires --suggestions or --query"),
            };
            commands::run_apply(&cfg, &file, source, &ids, output).await?;
        }
        Commands::Inspect { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
