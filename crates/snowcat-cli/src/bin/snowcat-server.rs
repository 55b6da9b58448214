//! snowcat-server — single-process ingress + stage runner binary.
//!
//! Loads `snowcat.toml`, builds the bundled word-count topology, registers
//! every stage against an in-process [`LocalDispatcher`], and serves
//! `POST /ingest/:stream` over HTTP. Follows `eisenbahn-launcher`'s
//! `main.rs` shape (`clap` for args, `tracing-subscriber` for logging,
//! `dotenvy` for env files) scaled down to one process, since
//! `LocalDispatcher` has no separate broker to launch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use snowcat_core::{Error, QueueName, SnowcatConfig, StageName, StreamId};
use snowcat_runtime::{
    ActivationHandler, IngressDispatcher, LocalDispatcher, RunnerConfig, StageRunner,
    TaskDispatcher,
};

/// SnowCat single-process server — ingress HTTP endpoint and stage runners.
#[derive(Parser, Debug)]
#[command(name = "snowcat-server", version, about)]
struct Cli {
    /// Path to the snowcat.toml config file. Falls back to in-memory
    /// defaults if the file does not exist.
    #[arg(long, env = "SNOWCAT_CONFIG", default_value = "config/snowcat.toml")]
    config: String,

    /// Address to bind the HTTP ingress server on.
    #[arg(long, env = "SNOWCAT_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,
}

#[derive(Deserialize)]
struct IngestRequest {
    /// Raw byte values to append, one log entry per array element.
    values: Vec<String>,
    /// Queue to append to; defaults to the ingress queue ("Stream").
    queue: Option<String>,
}

struct AppState {
    ingress: IngressDispatcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match SnowcatConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded snowcat config");
            cfg
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %cli.config,
                "failed to load config, using local defaults"
            );
            SnowcatConfig::local()
        }
    };

    let backend = snowcat_cli::build_backend(&config).await?;
    let tombstone_ttl = Duration::from_secs(config.finalization.tombstone_ttl_secs);
    let topology = Arc::new(snowcat_cli::build_demo_topology(backend.clone(), tombstone_ttl)?);

    let dispatcher = Arc::new(LocalDispatcher::new());
    let runner_config = RunnerConfig {
        lease_ttl: Duration::from_secs(config.lease.ttl_secs),
        checkpoint_frequency: Duration::from_secs(config.stage.checkpoint_frequency_secs),
        buffer_length: config.stage.buffer_length,
        re_arm_delay: Duration::from_secs(config.stage.re_arm_delay_secs),
    };

    let dispatcher_dyn: Arc<dyn TaskDispatcher> = dispatcher.clone();
    for stage_name in topology.stage_names() {
        let stage_name = StageName::from(stage_name);
        let runner = Arc::new(StageRunner::new(
            backend.clone(),
            topology.clone(),
            dispatcher_dyn.clone(),
            runner_config.clone(),
            stage_name.clone(),
        ));
        let handler: Arc<dyn ActivationHandler> = runner;
        dispatcher.register(&stage_name, handler);
    }

    let ingress = IngressDispatcher::new(backend.clone(), topology.clone(), dispatcher_dyn);
    let state = Arc::new(AppState { ingress });

    let app = Router::new()
        .route("/ingest/{stream}", post(ingest_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = cli.listen_addr.parse()?;
    info!(addr = %addr, stages = ?topology.stage_names(), "snowcat-server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let stream = StreamId::from(stream);
    let queue = body.queue.map(QueueName::from);
    let values: Vec<Vec<u8>> = body.values.into_iter().map(String::into_bytes).collect();

    let new_length = state
        .ingress
        .ingest(&stream, queue.as_ref(), values)
        .await
        .map_err(to_http_error)?;

    Ok(Json(serde_json::json!({ "length": new_length })))
}

fn to_http_error(err: Error) -> (StatusCode, String) {
    tracing::error!(error = %err, "ingest failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
