use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use tracing::{debug, info};

use sentinel_qa::agents::QaAgents;
use sentinel_qa::config::ServeConfig;
use sentinel_qa::server::{self, AppState};
use sentinel_qa::{normalize, selector};

#[derive(Parser)]
#[command(name = "sentinel-qa")]
#[command(about = "Grounded test plan and Selenium script generation from docs and HTML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized view of an HTML file or stdin
    Normalize {
        /// HTML file path, or '-' for stdin
        input: String,
    },

    /// Print the selector map of an HTML file or stdin
    Selectors {
        /// HTML file path, or '-' for stdin
        input: String,

        /// Output format: text or json
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Start the HTTP API (upload, generate-tests, generate-script)
    Serve(ServeConfig),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Normalize { input } => {
            info!(input = %input, "normalize command");
            let html = read_input(&input)?;
            println!("{}", normalize::normalize(&html));
            Ok(())
        }
        Commands::Selectors { input, format } => {
            info!(input = %input, "selectors command");
            let html = read_input(&input)?;
            let map = selector::build_selector_map(&html);
            let output = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&map)?,
                OutputFormat::Text => map.to_prompt_text(),
            };
            println!("{output}");
            Ok(())
        }
        Commands::Serve(config) => {
            info!(host = %config.host, port = config.port, "starting API server");
            let store = config.content_store();
            let prompts = config.prompt_set()?;
            let agents = QaAgents::new(config.generator(), prompts);
            debug!(upload_dir = %store.base().display(), "content store ready");

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(server::run_server(
                AppState::new(store, agents).with_knowledge_base(config.knowledge_base()),
                &config.host,
                config.port,
            ))
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}
