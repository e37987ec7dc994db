//! CLI host for the geofence location-update handler.
//!
//! Pipeline: validate -> publish location -> token -> fetch memberships ->
//! diff -> publish transitions -> write membership -> acknowledge.

use clap::{Args, Parser, Subcommand};
use geofence_core::types::{Coordinates, EntityId, LocationUpdate};
use geofence_core::GeofenceConfig;
use geofence_engine::sink::json_stream::JsonStreamPublisher;
use geofence_engine::sink::pubnub::PubNubPublisher;
use geofence_engine::{GeofenceEngine, Publisher, UpdateOutcome};
use geofence_provider::{
    CredentialCache, FileStore, HttpTransport, KeyValueStore, MemoryStore, ReqwestTransport,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "geofence", version, about = "Geofence entry/exit webhook handler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one location update given as arguments.
    Update {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        id: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Process one inbound webhook message, e.g. `{"asset":"A1","lat":40.7,"lng":-73.9}`.
    Handle {
        #[command(flatten)]
        common: CommonArgs,

        /// Message JSON; read from stdin when omitted.
        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    #[arg(short, long, env = "GEOFENCE_CONFIG")]
    config: PathBuf,

    /// Entity kind as configured under `entities`.
    #[arg(short, long, default_value = "asset")]
    kind: String,

    #[arg(long, env = "GEOFENCE_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "GEOFENCE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Persist the access token in this JSON file between runs.
    #[arg(long, env = "GEOFENCE_TOKEN_CACHE")]
    token_cache: Option<PathBuf>,

    /// Notification sink: "ndjson" writes NDJSON to stdout,
    /// "ndjson:/path/to/file" writes to file, "pubnub" publishes.
    #[arg(long, default_value = "ndjson")]
    sink: String,

    /// Print the acknowledgment as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (common, input) = match cli.command {
        Commands::Update {
            common,
            id,
            lat,
            lng,
        } => (
            common,
            Input::Update(LocationUpdate::new(
                EntityId::new(id),
                Coordinates::new(lat, lng),
            )),
        ),
        Commands::Handle { common, message } => {
            let raw = match message {
                Some(raw) => raw,
                None => {
                    let mut raw = String::new();
                    std::io::stdin().read_to_string(&mut raw)?;
                    raw
                }
            };
            (common, Input::Message(serde_json::from_str(&raw)?))
        }
    };

    let t0 = Instant::now();

    // 1. Config, with credential overrides.
    let mut config = GeofenceConfig::from_file(&common.config)?;
    if let Some(id) = common.client_id.clone() {
        config.auth.client_id = id;
    }
    if let Some(secret) = common.client_secret.clone() {
        config.auth.client_secret = secret;
    }
    if let Some(path) = common.token_cache.clone() {
        config.auth.token_cache = Some(path);
    }

    // 2. Wire the engine.
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::with_timeout(
        Duration::from_secs(config.http.timeout_secs),
    )?);
    let store: Arc<dyn KeyValueStore> = match &config.auth.token_cache {
        Some(path) => {
            tracing::debug!(path = %path.display(), "token cache on disk");
            Arc::new(FileStore::new(path))
        }
        None => Arc::new(MemoryStore::new()),
    };
    let credentials = Arc::new(CredentialCache::new(
        transport.clone(),
        store,
        config.auth.clone(),
    ));
    let (publisher, sink_on_stdout) = build_sink(&common.sink, &config, transport.clone())?;
    let engine =
        GeofenceEngine::from_config(&config, &common.kind, transport, credentials, publisher)?;

    tracing::info!(kind = %common.kind, sink = %common.sink, "engine ready");

    // 3. Run the update.
    let result = match input {
        Input::Update(update) => engine.process(update).await,
        Input::Message(message) => engine.handle_message(&message).await,
    };
    engine.flush().await;

    tracing::info!(elapsed_ms = t0.elapsed().as_millis(), "finished");

    // 4. Acknowledge or abort.
    match result {
        Ok(outcome) => {
            let ack = render(&outcome, common.json)?;
            if sink_on_stdout {
                eprintln!("{ack}");
            } else {
                println!("{ack}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("aborted: {}: {e}", e.abort_reason());
            std::process::exit(1);
        }
    }
}

enum Input {
    Update(LocationUpdate),
    Message(serde_json::Value),
}

/// Returns the publisher and whether it writes to stdout.
fn build_sink(
    sink: &str,
    config: &GeofenceConfig,
    transport: Arc<dyn HttpTransport>,
) -> Result<(Arc<dyn Publisher>, bool), Box<dyn std::error::Error>> {
    if sink == "ndjson" {
        let stdout: Arc<dyn Publisher> = Arc::new(JsonStreamPublisher::stdout());
        return Ok((stdout, true));
    }

    let publisher: Arc<dyn Publisher> = if let Some(path) = sink.strip_prefix("ndjson:") {
        let file = std::fs::File::create(path)?;
        Arc::new(JsonStreamPublisher::new(file))
    } else if sink == "pubnub" {
        let pubnub = config
            .publish
            .pubnub
            .clone()
            .ok_or("sink 'pubnub' needs a publish.pubnub block in the config")?;
        Arc::new(PubNubPublisher::new(transport, pubnub))
    } else {
        return Err(format!("Unknown sink: {sink}. Use 'ndjson', 'ndjson:/path' or 'pubnub'").into());
    };
    Ok((publisher, false))
}

fn render(outcome: &UpdateOutcome, json: bool) -> Result<String, serde_json::Error> {
    if json {
        return serde_json::to_string(outcome);
    }
    let record = outcome
        .record_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".into());
    Ok(format!(
        "ok {} {} ({:?}, record {record}): regions {} entered {} exited {}",
        outcome.kind, outcome.entity, outcome.action, outcome.regions, outcome.entered, outcome.exited
    ))
}
