//! CLI Entry Point for rust-hil
//!
//! Runs one remote device session end to end: allocate a board, flash it, send
//! payloads, read back what the device answers, and release it.
//!
//! # Usage
//!
//! ```bash
//! rust_hil --backend mock --platform K64F --baud 9600 --send "{{__sync;1}}" --echo
//! rust_hil --config hil.toml --image build/firmware.bin --read 512
//! ```
//!
//! Every `--flag` overrides the matching key of the `[session]` table in `--config`.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::Parser;
use rust_hil::config::{HarnessConfig, SessionConfig};
use rust_hil::logging::{self, OutputFormat, TracingConfig};
use rust_hil::registry::BackendRegistry;
use rust_hil::{ConnectorPrimitive, DeviceSession};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rust_hil")]
#[command(about = "Allocate, flash and talk to a shared lab device", long_about = None)]
struct Cli {
    /// Harness configuration file (TOML with a [session] table)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resource manager backend id
    #[arg(long)]
    backend: Option<String>,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// Platform to allocate
    #[arg(long)]
    platform: Option<String>,

    /// Pin allocation to one resource id
    #[arg(long)]
    target_id: Option<String>,

    /// Firmware image to flash
    #[arg(long)]
    image: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Payload to write, as-is (repeatable)
    #[arg(long)]
    send: Vec<String>,

    /// Bytes to read after writing
    #[arg(long, default_value_t = 256)]
    read: usize,

    /// Log written payloads on the rust_hil::txd target
    #[arg(long)]
    echo: bool,

    /// trace, debug, info, warn or error
    #[arg(long)]
    log_level: Option<String>,

    /// pretty, compact or json
    #[arg(long, default_value = "compact")]
    log_format: OutputFormat,

    /// Print the effective session configuration and exit
    #[arg(long)]
    print_config: bool,

    /// List compiled-in backends and exit
    #[arg(long)]
    list_backends: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut SessionConfig) {
        if let Some(backend) = &self.backend {
            config.manager_backend = backend.clone();
        }
        if let Some(host) = &self.host {
            config.manager_host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.manager_port = port;
        }
        if let Some(platform) = &self.platform {
            config.platform_name = Some(platform.clone());
        }
        if let Some(target) = &self.target_id {
            config.target_id = Some(target.clone());
        }
        if let Some(image) = &self.image {
            config.image_path = Some(image.clone());
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut session_config, file_level) = match &cli.config {
        Some(path) => {
            let harness = HarnessConfig::load_from(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (harness.session, Some(harness.log_level))
        }
        None => (SessionConfig::default(), None),
    };
    cli.apply_overrides(&mut session_config);
    session_config.validate()?;

    let level = cli
        .log_level
        .clone()
        .or(file_level)
        .unwrap_or_else(|| "info".to_string());
    let level = logging::parse_log_level(&level).map_err(anyhow::Error::msg)?;
    logging::init(TracingConfig::new(level).with_format(cli.log_format))
        .map_err(anyhow::Error::msg)?;

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&session_config)?);
        return Ok(());
    }

    let registry = Arc::new(BackendRegistry::with_builtin_backends());
    if cli.list_backends {
        for id in registry.list_factories() {
            if let Some(info) = registry.factory_info(&id) {
                println!("{:<12} {}", info.backend_id, info.name);
            }
        }
        return Ok(());
    }

    let payloads: Vec<Bytes> = cli.send.iter().map(|s| Bytes::from(s.clone())).collect();
    let read_count = cli.read;
    let echo = cli.echo;

    let outcome = DeviceSession::new(session_config, registry)
        .run_scoped(move |session| {
            Box::pin(async move {
                if !session.establish().await {
                    return Err(session.error());
                }
                for payload in payloads {
                    session.write(payload, echo).await;
                }
                session.flush().await;
                let received = if read_count > 0 {
                    session.read(read_count).await
                } else {
                    Bytes::new()
                };
                Ok((received, session.error()))
            })
        })
        .await;

    match outcome {
        Ok((received, last_error)) => {
            if let Some(record) = last_error {
                eprintln!("warning: {}", record);
            }
            if !received.is_empty() {
                println!("{}", String::from_utf8_lossy(&received));
            }
            Ok(())
        }
        Err(Some(record)) => bail!("session could not be established: {}", record),
        Err(None) => bail!("session could not be established"),
    }
}
