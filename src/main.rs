use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use serde::Serialize;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kmsv4_lib::constants::{DEFAULT_PORT, DEFAULT_RESPONSE_DELAY_MS};
use kmsv4_lib::policy::{EchoPolicy, StaticPolicy};
use kmsv4_lib::{Envelope, HandlerConfig, KmsV4Handler, Shape, generate_hash};

mod server;

/// KMS V4 envelope toolkit: serve activation requests or inspect V4 records.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer V4 requests over TCP.
    Serve(ServeArgs),
    /// Print the V4 hash of a hex payload.
    Hash {
        /// Message bytes as hex.
        message: String,
    },
    /// Wrap a hex payload in a request envelope.
    BuildRequest {
        /// Request payload as hex.
        payload: String,
        /// Dump the envelope fields.
        #[arg(short, long)]
        debug: bool,
    },
    /// Wrap a hex payload in a response envelope.
    Respond {
        /// Response payload as hex.
        payload: String,
        /// Dump the envelope fields.
        #[arg(short, long)]
        debug: bool,
    },
    /// Decode a hex envelope and show its fields.
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    bind: SocketAddr,
    /// Delay before each response is sent, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_RESPONSE_DELAY_MS)]
    delay_ms: u64,
    /// Log every envelope with its field dump and wire hex.
    #[arg(short, long)]
    debug: bool,
    /// Reject requests whose tag does not match their payload.
    #[arg(long)]
    verify_tags: bool,
    /// Fixed response payload as hex; requests are echoed back when omitted.
    #[arg(long)]
    response_hex: Option<String>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Envelope bytes as hex.
    envelope: String,
    /// Decode as a response envelope (with marker) instead of a request.
    #[arg(short, long)]
    response: bool,
    /// Print a JSON summary instead of the field dump.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct EnvelopeSummary {
    shape: String,
    body_length: u32,
    padding_len: usize,
    payload: String,
    tag: String,
    tag_valid: bool,
}

impl From<&Envelope> for EnvelopeSummary {
    fn from(envelope: &Envelope) -> Self {
        Self {
            shape: envelope.shape().to_string(),
            body_length: envelope.body_length(),
            padding_len: envelope.padding_len(),
            payload: hex::encode(envelope.payload()),
            tag: envelope.tag().to_string(),
            tag_valid: envelope.verify().is_ok(),
        }
    }
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    // stdout carries command output (hex, JSON); diagnostics go to stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false);

    // the server restarts against the same log file, so append instead of truncating
    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_thread_ids(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v; RUST_LOG still wins per target
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Appending logs to {:?}", path);
    }

    Ok(guard)
}

fn parse_hex(label: &str, input: &str) -> Result<Bytes> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).with_context(|| format!("{} is not valid hex", label))?;
    Ok(Bytes::from(bytes))
}

fn one_shot_handler(debug: bool) -> KmsV4Handler<EchoPolicy> {
    KmsV4Handler::with_config(
        EchoPolicy,
        HandlerConfig {
            debug,
            ..HandlerConfig::default()
        },
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file, &cli.verbose)?;

    if let Err(e) = run(cli.command).await {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Hash { message } => {
            let message = parse_hex("message", &message)?;
            println!("{}", generate_hash(&message));
            Ok(())
        }
        Command::BuildRequest { payload, debug } => {
            let payload = parse_hex("payload", &payload)?;
            let request = one_shot_handler(debug).build_request(payload)?;
            println!("{}", hex::encode(request));
            Ok(())
        }
        Command::Respond { payload, debug } => {
            let payload = parse_hex("payload", &payload)?;
            let response = one_shot_handler(debug).generate_response(payload)?;
            println!("{}", response.to_hex());
            Ok(())
        }
        Command::Decode(args) => decode(args),
    }
}

fn decode(args: DecodeArgs) -> Result<()> {
    let bytes = parse_hex("envelope", &args.envelope)?;
    let shape = if args.response { Shape::Response } else { Shape::Request };
    let envelope = Envelope::decode(&bytes, shape).with_context(|| format!("Failed to decode V4 {}", shape))?;

    if args.json {
        let summary = EnvelopeSummary::from(&envelope);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", envelope);
        let verdict = if envelope.verify().is_ok() { "valid" } else { "INVALID" };
        println!("  tag check:   {}", verdict);
    }
    Ok(())
}

async fn run_server(args: ServeArgs) -> Result<()> {
    let config = HandlerConfig {
        response_delay: Duration::from_millis(args.delay_ms),
        debug: args.debug,
        verify_tags: args.verify_tags,
    };
    info!(
        delay_ms = args.delay_ms,
        verify_tags = args.verify_tags,
        "Starting KMS V4 server"
    );

    let serving = async move {
        match args.response_hex {
            Some(hex_payload) => {
                let response = parse_hex("response payload", &hex_payload)?;
                info!(len = response.len(), "Answering with a static payload");
                let handler = KmsV4Handler::with_config(StaticPolicy::new(response), config);
                server::serve(args.bind, Arc::new(handler)).await
            }
            None => {
                info!("Echoing request payloads");
                server::serve(args.bind, Arc::new(KmsV4Handler::with_config(EchoPolicy, config))).await
            }
        }
    };

    tokio::select! {
        res = serving => res,
        _ = signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down gracefully.");
            Ok(())
        }
    }
}
