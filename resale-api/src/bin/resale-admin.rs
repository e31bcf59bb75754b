//! Resale admin entry point.
//!
//! Loads configuration, reconciles the schema, then serves one JSON request
//! per stdin line and writes one response envelope per stdout line.
//!
//! Environment:
//! - `RESALE_LOG_FORMAT=json` for JSON logs on stderr
//! - `RESALE_CACHE_PATH` to keep the host cache in LMDB instead of memory
//! - `RESALE_CACHE_MAP_SIZE_MB` LMDB map size (default 64)

use std::process::ExitCode;
use std::sync::Arc;

use resale_api::{
    default_registry, init_tracing, ActionRegistry, ActionRequest, AdminResult, AppState,
    Envelope, LogFormat,
};
use resale_core::{ResaleConfig, ResaleError, ValidationError};
use resale_storage::{
    BackingStore, FixedStore, HostCache, InMemoryHostCache, InMemoryHostLock, InMemoryStore,
    LmdbHostCache, DEFAULT_MAX_VALUE_BYTES,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "resale-admin stopped");
            eprintln!("resale-admin: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn host_cache() -> AdminResult<Arc<dyn HostCache>> {
    let Ok(path) = std::env::var("RESALE_CACHE_PATH") else {
        return Ok(Arc::new(InMemoryHostCache::default()));
    };
    let map_size_mb = std::env::var("RESALE_CACHE_MAP_SIZE_MB")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(64);
    let cache = LmdbHostCache::open(&path, map_size_mb, DEFAULT_MAX_VALUE_BYTES)
        .map_err(ResaleError::from)?;
    tracing::info!(%path, map_size_mb, "Using LMDB host cache");
    Ok(Arc::new(cache))
}

async fn run() -> AdminResult<()> {
    init_tracing(LogFormat::from_env())?;

    let config = ResaleConfig::from_env();
    config.validate()?;

    let store: Arc<dyn BackingStore> = Arc::new(InMemoryStore::new());
    let state = AppState::new(
        config,
        Arc::new(FixedStore::new(store)),
        host_cache()?,
        Arc::new(InMemoryHostLock::new()),
        default_registry()?,
    )?;
    let actions = ActionRegistry::standard()?;

    let report = state.reconciler.reconcile().await?;
    for change in report.descriptions() {
        tracing::info!(%change, "Startup reconciliation");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tracing::info!("Reading requests from stdin");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope = match serde_json::from_str::<ActionRequest>(&line) {
            Ok(request) => actions.dispatch(&state, request).await,
            Err(e) => Envelope::error(&ResaleError::from(ValidationError::InvalidValue {
                field: "request".to_string(),
                reason: e.to_string(),
            })),
        };
        let mut out = serde_json::to_string(&envelope)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    tracing::info!(uptime_secs = state.start_time.elapsed().as_secs(), "stdin closed, exiting");
    Ok(())
}
