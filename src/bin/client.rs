//! fieldwatch-client binary
//!
//! Connects to the map stream and writes every lifecycle event to stdout
//! as one JSON object per line.  Logs go to stderr.
//!
//! ## Configuration
//!
//! Layered, later wins: built-in defaults → `--config <file.toml>` →
//! `FIELDWATCH_*` environment → command-line flags.
//!
//! | Key / env                       | Default                       | Description                  |
//! |---------------------------------|-------------------------------|------------------------------|
//! | `endpoint` / `FIELDWATCH_ENDPOINT` | `wss://ws.iceposeidon.com/ws` | WebSocket endpoint        |
//! | `max_retries`                   | `5`                           | Reconnects before giving up  |
//! | `retry_base_ms`                 | `1000`                        | Retry delay unit             |
//! | `jitter_min` / `jitter_max`     | `1` / `10`                    | Jitter bounds (retry units)  |
//! | `damage_window_ms`              | `10000`                       | Damage indicator lifetime    |
//! | `animation_ms`                  | `4000`                        | Marker glide duration        |
//! | `hidden_ids`                    | `[]`                          | Ids hidden from the start    |
//!
//! `RUST_LOG` overrides the default `fieldwatch=info` filter.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldwatch::frame::{brotli_decompress, decode_frame, decode_payload};
use fieldwatch::{panel_entries, ClientConfig, EventSink, MapEvent, Session};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "fieldwatch-client", about = "Live participant map client", version)]
struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// WebSocket endpoint
    #[arg(long, env = "FIELDWATCH_ENDPOINT")]
    endpoint: Option<String>,

    /// Reconnect attempts before the session is abandoned
    #[arg(long)]
    max_retries: Option<u32>,

    /// Hide an id for the whole session (repeatable)
    #[arg(long = "hide", value_name = "ID")]
    hide: Vec<String>,

    /// Treat entity coordinates as absolute
    #[arg(long)]
    no_projection: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream the live map (default)
    Run,
    /// Decode one captured frame and print it as JSON
    Decode {
        /// Frame file
        file: PathBuf,
        /// File holds the decompressed payload, not a brotli frame
        #[arg(long)]
        raw: bool,
    },
}

// ---------------------------------------------------------------------------
// Config layering
// ---------------------------------------------------------------------------

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&ClientConfig::default())?);
    if let Some(path) = &args.config {
        builder = builder.add_source(config::File::from(path.as_path()));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("FIELDWATCH")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("hidden_ids"),
    );

    let mut cfg: ClientConfig = builder
        .build()
        .context("loading configuration")?
        .try_deserialize()
        .context("parsing configuration")?;

    if let Some(endpoint) = &args.endpoint {
        cfg.endpoint = endpoint.clone();
    }
    if let Some(max_retries) = args.max_retries {
        cfg.max_retries = max_retries;
    }
    cfg.hidden_ids.extend(args.hide.iter().cloned());
    if args.no_projection {
        cfg.projection = None;
    }
    cfg.validate()?;
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Writes each event as a JSON line on stdout.
struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> EventSink for JsonLines<W> {
    fn emit(&mut self, event: MapEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Failed to serialise event: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{}", line) {
            log::warn!("Failed to write event: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn decode_file(file: &Path, raw: bool) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let batch = if raw {
        decode_payload(&String::from_utf8_lossy(&bytes))?
    } else {
        decode_frame(&bytes, brotli_decompress)?
    };
    println!("{}", serde_json::to_string_pretty(&batch)?);
    Ok(())
}

async fn stream(cfg: ClientConfig) -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        log::debug!("rustls crypto provider already installed");
    }

    log::info!(
        "Starting fieldwatch-client (endpoint='{}', max_retries={}, hidden={})",
        cfg.endpoint,
        cfg.max_retries,
        cfg.hidden_ids.len(),
    );

    let sink = JsonLines {
        out: std::io::stdout(),
    };
    let mut session = Session::new(cfg, sink);

    tokio::select! {
        _ = session.run() => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("fieldwatch-client shutting down (SIGINT)");
        }
    }

    let panel = panel_entries(session.sync().visible_roster());
    log::info!(
        "Final roster: {} visible ({} frames decoded, {} dropped)",
        panel.len(),
        session.decoder_stats().decoded,
        session.decoder_stats().dropped,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fieldwatch=info,fieldwatch_client=info")),
        )
        .init();

    let args = Args::parse();
    match &args.command {
        Some(Command::Decode { file, raw }) => decode_file(file, *raw),
        Some(Command::Run) | None => stream(load_config(&args)?).await,
    }
}
