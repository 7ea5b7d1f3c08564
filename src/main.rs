use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedfinder::config::Config;
use feedfinder::server::{self, ApiError, AppState, ErrorBody};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feedfinder", version, about = "Find the RSS, Atom and JSON feeds of a website")]
struct Cli {
    /// TOML config file (missing file means defaults)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to bind, overriding the config file
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Discover feeds for one URL and print the result as JSON
    Find {
        /// Site or page URL; `http://` is assumed when no scheme is given
        url: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    let config = config.apply_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { listen } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }
            server::run(&config).await?;
        }
        Command::Find { url } => {
            let state = AppState::from_config(&config).context("Failed to build HTTP client")?;
            match state.find(Some(&url)).await {
                Ok(envelope) => println!("{}", serde_json::to_string_pretty(&envelope)?),
                Err(ApiError::BadRequest(e)) => {
                    let body = ErrorBody {
                        error: e.to_string(),
                    };
                    println!("{}", serde_json::to_string_pretty(&body)?);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
