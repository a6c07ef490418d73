use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod serve;
pub mod tools;

use tools::ToolsCommand;

#[derive(Subcommand)]
enum Command {
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Authorize calendar access and save the token file
    Auth {},
    /// List or invoke the agent tools
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Log to stderr, `RUST_LOG` takes precedence over `default_filter`.
fn init_tracing(default_filter: String) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            // axum logs rejections from built-in extractors with the `axum::rejection`
            // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
            init_tracing(format!(
                "{}=debug,tower_http=debug,axum::rejection=trace",
                env!("CARGO_CRATE_NAME")
            ));
            serve::run(host, port).await?;
        }
        Some(Command::Auth {}) => {
            init_tracing(format!("{}=debug", env!("CARGO_CRATE_NAME")));
            auth::run().await?;
        }
        Some(Command::Tools { command }) => {
            init_tracing(format!("{}=info", env!("CARGO_CRATE_NAME")));
            tools::run(command).await?;
        }
        None => {}
    }

    Ok(())
}
