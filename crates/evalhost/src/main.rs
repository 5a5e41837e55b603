//! evalhost - serves the calc language to a client over stdin/stdout.
//!
//! The engine and the interpreter run on one blocking thread. The async
//! runtime owns the pipes: one task reads frames and routes them into the
//! engine, another writes what the engine sends, and a third drives the
//! keep-alive.

mod transport;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use evalhost_calc::Calc;
use evalhost_engine::{Engine, EngineConfig, Exit};
use tracing_subscriber::EnvFilter;

use transport::{read_frames, write_frames, ReadEnd, StdioTransport};

/// How often the keep-alive is checked.
const KEEPALIVE_TICK: Duration = Duration::from_secs(1);

/// How long to wait for queued frames to reach stdout before exiting.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "evalhost")]
#[command(about = "Evaluation host - runs calc expressions for a client over stdio")]
#[command(version)]
struct Args {
    /// Name announced to the client
    #[arg(long, default_value = "evalhost")]
    name: String,

    /// Longest wait between checks for cancellation and shutdown
    #[arg(long, value_name = "MS", default_value_t = 50)]
    poll_interval_ms: u64,

    /// Idle time before pinging the client; 0 disables the keep-alive
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    keepalive_secs: u64,

    /// Time to wait for any traffic after a ping
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    keepalive_timeout_secs: u64,

    /// Log filter, e.g. `debug` or `evalhost_engine=trace`; overrides RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log filter '{}'", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    let config = EngineConfig::new()
        .host_name(args.name)
        .poll_interval(Duration::from_millis(args.poll_interval_ms))
        .keepalive(
            Duration::from_secs(args.keepalive_secs),
            Duration::from_secs(args.keepalive_timeout_secs),
        );
    let keepalive_enabled = args.keepalive_secs > 0;

    let (transport, outgoing) = StdioTransport::new();
    let transport = Arc::new(transport);
    let engine = Arc::new(Engine::new(config, transport.clone()));

    let writer = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            let result = write_frames(outgoing, tokio::io::stdout()).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "Failed to write to stdout");
            }
            transport.disconnect();
            result
        })
    };

    {
        let engine = Arc::clone(&engine);
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            match read_frames(tokio::io::stdin(), &engine).await {
                Ok(ReadEnd::Shutdown) | Ok(ReadEnd::Fatal) => {}
                Ok(ReadEnd::Eof) => {
                    tracing::info!("Client closed stdin");
                    transport.disconnect();
                    engine.disconnected();
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to read from stdin");
                    transport.disconnect();
                    engine.disconnected();
                }
            }
        });
    }

    if keepalive_enabled {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEPALIVE_TICK);
            loop {
                interval.tick().await;
                if engine.keepalive_tick().is_err() {
                    break;
                }
            }
        });
    }

    let result = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            let mut calc = Calc::new();
            engine.run(&mut calc)
        })
        .await
        .context("engine thread failed")?
    };

    transport.close();
    match tokio::time::timeout(FLUSH_TIMEOUT, writer).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => tracing::error!(error = %err, "Writer task failed"),
        Err(_) => tracing::warn!("Timed out flushing output"),
    }

    // The stdin reader cannot be canceled, so leave without waiting for it.
    match result {
        Ok(Exit::Shutdown) => {
            tracing::info!("Exiting");
            process::exit(0);
        }
        Err(err) => {
            tracing::error!(error = %err, "Exiting after fatal error");
            process::exit(1);
        }
    }
}
