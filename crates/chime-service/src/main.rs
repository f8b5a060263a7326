//! Service binary: loads settings, establishes the component session,
//! runs the echo service until "quit" is read from standard input.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chime_component::{
    AddressRegistry, Component, ComponentRuntime, EchoResponder, Settings, TimeSignalBroadcaster,
};

/// Command string to quit the program.
const QUIT_COMMAND: &str = "quit";

#[derive(Debug, Parser)]
#[command(name = "chimed", about = "Echo / time-signal XMPP external component", version)]
struct Args {
    /// Path to the settings file
    #[arg(short, long, default_value = "resource/component.toml")]
    config: PathBuf,

    /// Service name (settings table and component subdomain)
    #[arg(short, long, default_value = "echo")]
    service: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    let interval = settings.service(&args.service)?.interval;

    // Fatal on connection or handshake failure: the service never runs
    // half-configured.
    let mut runtime = ComponentRuntime::connect(&settings, &args.service)
        .await
        .context("Failed to establish the component session")?;

    let sender = Arc::new(runtime.packet_sender());
    let registry = Arc::new(AddressRegistry::new());
    let responder = Arc::new(EchoResponder::new(
        args.service.clone(),
        Arc::clone(&sender),
        Arc::clone(&registry),
    ));
    info!(service = %args.service, "{}", responder.description());

    let broadcaster = TimeSignalBroadcaster::new(registry, sender, interval);
    let signal_task = broadcaster.spawn(runtime.shutdown_token().child_token());

    runtime.start(Arc::clone(&responder));

    command_loop().await?;

    runtime.stop().await;
    let _ = signal_task.await;

    Ok(())
}

/// Block until end of input or the literal quit command.
async fn command_loop() -> Result<()> {
    println!("Type \"{}\" and enter key to quit", QUIT_COMMAND);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line == QUIT_COMMAND {
            break;
        }
    }
    Ok(())
}
