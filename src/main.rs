//! Request pipeline CLI.
//!
//! Sends one request through the pipeline (rate limit, sanitize, CSRF,
//! retries) and prints the decoded JSON body.
//!
//! ```text
//! request-pipeline --config pipeline.toml get /budgets
//! request-pipeline post /budgets --data '{"name":"food"}'
//! request-pipeline csrf-token
//! request-pipeline --config pipeline.toml check-config
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

use request_pipeline::config::{load_config, validate_config, PipelineConfig};
use request_pipeline::observability::logging;
use request_pipeline::{RequestOptions, RetryingTransport, Shutdown};

#[derive(Parser)]
#[command(name = "request-pipeline")]
#[command(about = "Send API requests through the resilient request pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `client.base_url`
    #[arg(short, long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET an endpoint
    Get { endpoint: String },
    /// POST a JSON body
    Post {
        endpoint: String,
        #[arg(short, long)]
        data: String,
    },
    /// PUT a JSON body
    Put {
        endpoint: String,
        #[arg(short, long)]
        data: String,
    },
    /// PATCH a JSON body
    Patch {
        endpoint: String,
        #[arg(short, long)]
        data: String,
    },
    /// DELETE an endpoint
    Delete { endpoint: String },
    /// Fetch and print the current CSRF token
    CsrfToken,
    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.client.base_url = base_url;
    }

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("Warning: logging already initialized: {}", e);
    }

    if let Commands::CheckConfig = cli.command {
        return match validate_config(&config) {
            Ok(()) => {
                println!("Configuration OK");
                Ok(())
            }
            Err(errors) => {
                for error in &errors {
                    eprintln!("  {}", error);
                }
                Err(format!("{} configuration error(s)", errors.len()).into())
            }
        };
    }

    tracing::info!(
        base_url = %config.client.base_url,
        timeout_ms = config.client.timeout_ms,
        max_attempts = config.retries.max_attempts,
        "request-pipeline v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let transport = RetryingTransport::new(config)?;
    let shutdown = Shutdown::new();
    let sweeper = transport.spawn_sweeper(shutdown.subscribe());

    let result = match cli.command {
        Commands::Get { endpoint } => transport.get(&endpoint).await,
        Commands::Post { endpoint, data } => {
            transport.send(&endpoint, RequestOptions::post(parse_body(&data)?)).await
        }
        Commands::Put { endpoint, data } => {
            transport.send(&endpoint, RequestOptions::put(parse_body(&data)?)).await
        }
        Commands::Patch { endpoint, data } => {
            transport.send(&endpoint, RequestOptions::patch(parse_body(&data)?)).await
        }
        Commands::Delete { endpoint } => transport.delete(&endpoint).await,
        Commands::CsrfToken => transport.csrf().get_token().await.map(Value::String),
        Commands::CheckConfig => Ok(Value::Null),
    };

    shutdown.trigger();
    let _ = sweeper.await;

    let body = result?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn parse_body(data: &str) -> Result<Value, Box<dyn std::error::Error>> {
    serde_json::from_str(data).map_err(|e| format!("--data is not valid JSON: {}", e).into())
}
