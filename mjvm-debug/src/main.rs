// MJVM debug front end
//
// Drives one debug session from JSON lines on stdin and reports responses
// and device events as JSON lines on stdout.

use anyhow::{Context, Result};
use mjvm_client::config::ENV_CONFIG;
use mjvm_client::{DebuggerConfig, MjvmDebugger};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{debug, error, info};

mod handlers;
mod protocol;

use handlers::RequestHandler;
use protocol::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr only - stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjvm_debug=info".parse()?)
                .add_directive("mjvm_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    info!(
        "Starting MJVM debugger for {}:{}",
        config.host, config.port
    );

    let debugger = MjvmDebugger::from_config(config);
    let events = debugger.events();
    let mut handler = RequestHandler::new(debugger);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("Ready, waiting for requests...");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("Client disconnected");
                        break;
                    }
                    Err(e) => {
                        error!("Read error: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                debug!("Received: {}", line);
                let response = match serde_json::from_str::<Request>(line) {
                    Ok(request) => handler.handle_request(request).await,
                    Err(e) => {
                        error!("Invalid request: {}", e);
                        Response::error(serde_json::Value::Null, format!("Invalid request: {}", e))
                    }
                };
                write_line(&mut stdout, &serde_json::to_string(&response)?).await?;
            }
            Some(event) = events.recv() => {
                debug!("Event: {:?}", event);
                write_line(&mut stdout, &event_line(&event)?).await?;
            }
        }
    }

    handler.shutdown().await;
    info!("MJVM debugger shutting down");
    Ok(())
}

/// Config file from the first argument or `MJVM_DEBUG_CONFIG`, then
/// endpoint overrides from the environment
fn load_config() -> Result<DebuggerConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_CONFIG).ok());

    let mut config = match path {
        Some(path) => DebuggerConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => DebuggerConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

async fn write_line(stdout: &mut Stdout, line: &str) -> Result<()> {
    debug!("Sending: {}", line);
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
