//! pageagent: runs the embedded agent against a controller, with host page
//! events read from stdin

use anyhow::Context;
use clap::{Parser, Subcommand};
use pageagent_agent::{Agent, CoverageCounters, HostPage};
use pageagent_channel::WsChannel;
use pageagent_core::{AgentConfig, AgentState};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pageagent", about = "Embedded page agent: module host and controller link")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a controller and feed host page events from stdin
    Run {
        /// Controller WebSocket URL (overrides config and PAGEAGENT_CONTROLLER)
        #[arg(long)]
        controller: Option<String>,
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also write logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print the default configuration
    Config,
    /// Show version
    Version,
}

/// One line of stdin: `{"message": ...}`, `{"unload": true}` or `{"reinstall": true}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum HostInput {
    Message(Value),
    Unload(bool),
    Reinstall(bool),
}

impl HostInput {
    fn label(&self) -> &'static str {
        match self {
            Self::Message(_) => "host.message",
            Self::Unload(_) => "host.unload",
            Self::Reinstall(_) => "host.reinstall",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            controller,
            config,
            log_file,
        } => {
            let _guard = init_logging(log_file.as_deref())?;
            run(controller, config).await?;
        }

        Commands::Config => {
            print!("{}", AgentConfig::default().to_toml());
        }

        Commands::Version => {
            println!("pageagent v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let name = path
                .file_name()
                .with_context(|| format!("log file path {} has no file name", path.display()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pageagent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

async fn run(controller: Option<String>, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => AgentConfig::load(path),
        None => AgentConfig::default(),
    };
    if let Ok(url) = std::env::var("PAGEAGENT_CONTROLLER") {
        config.controller_url = url;
    }
    if let Some(url) = controller {
        config.controller_url = url;
    }

    let channel = Arc::new(WsChannel::new(config.controller_url.clone(), &config.context));
    let coverage = Arc::new(CoverageCounters::new());
    let agent = Agent::bootstrap(config, HostPage::new(), channel.clone(), Some(coverage.clone()))
        .await
        .context("agent bootstrap failed")?;

    pump_host_events(
        &agent,
        &coverage,
        BufReader::new(tokio::io::stdin()),
        channel.closed(),
    )
    .await?;

    // End of input or a lost controller means the page is going away.
    if !agent.state().is_unloading() {
        agent.host().dispatch_unload();
    }
    channel.shutdown().await;
    info!("Agent stopped in state {}", agent.state());
    Ok(())
}

/// Feed host events from `input` until it ends, the agent starts unloading or
/// `disconnected` resolves.
async fn pump_host_events<R>(
    agent: &Agent,
    coverage: &CoverageCounters,
    input: R,
    disconnected: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let host = agent.host();
    let mut lines = input.lines();
    tokio::pin!(disconnected);
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = agent.wait_for_state(AgentState::Unloading) => {
                info!("Unload triggered by the controller");
                return Ok(());
            }
            _ = &mut disconnected => {
                warn!("Controller connection lost");
                return Ok(());
            }
        };
        let Some(line) = line else {
            debug!("Host input ended");
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let input = match serde_json::from_str::<HostInput>(line) {
            Ok(input) => input,
            Err(e) => {
                warn!("Ignoring host input: {}", e);
                continue;
            }
        };
        coverage.hit(input.label());
        debug!("Host event {:?}", input);
        match input {
            HostInput::Message(data) => {
                host.dispatch_message(data);
            }
            HostInput::Unload(true) => {
                host.dispatch_unload();
            }
            HostInput::Reinstall(true) => {
                host.dispatch_reinstall();
            }
            HostInput::Unload(false) | HostInput::Reinstall(false) => {}
        }
        if agent.state().is_unloading() {
            return Ok(());
        }
    }
}
