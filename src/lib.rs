pub mod camera;
pub mod db;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod settings;
pub mod stats;
mod utils;
pub mod vision;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{mpsc, Mutex},
    task::JoinSet,
};

use camera::HomeAssistantCamera;
use db::Database;
use engine::{handle_line, EngineConfig, SpotEngine};
use scheduler::AutoCheckController;
use settings::Settings;
use vision::GeminiClassifier;

pub(crate) struct AppState {
    pub(crate) engine: SpotEngine,
    pub(crate) scheduler: Arc<Mutex<AutoCheckController>>,
}

impl AppState {
    fn build(settings: &Settings) -> Result<Self> {
        let database = Database::new(settings.database_path.clone())?;

        let camera = HomeAssistantCamera::new(
            settings.home_assistant_url.clone(),
            settings.supervisor_token.clone(),
            settings.image_fetch_timeout(),
        )?;
        let classifier = GeminiClassifier::new(
            settings.gemini_model.clone(),
            settings.gemini_api_key.clone(),
            settings.classify_timeout(),
        )?;
        if settings.supervisor_token.is_none() {
            log::warn!("SUPERVISOR_TOKEN is not set; snapshots will fail");
        }
        if settings.gemini_api_key.is_none() {
            log::warn!("GEMINI_API_KEY is not set; classification will fail");
        }

        let engine = SpotEngine::new(
            database,
            Arc::new(camera),
            Arc::new(classifier),
            EngineConfig::from(settings),
        );

        Ok(Self {
            engine,
            scheduler: Arc::new(Mutex::new(AutoCheckController::new())),
        })
    }
}

/// Serve JSON-line commands from stdin until EOF or Ctrl-C.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("spotcheck starting up...");

    let settings = Settings::load()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(async move {
        let state = AppState::build(&settings)?;
        log::info!(
            "Serving {} spots from {}",
            state.engine.spot_count().await?,
            settings.database_path.display()
        );

        if let Some(period) = settings.auto_check_interval() {
            state
                .scheduler
                .lock()
                .await
                .start(state.engine.clone(), period)?;
        }

        let served = serve_stdin(&state).await;
        state.scheduler.lock().await.stop().await?;
        log::info!("spotcheck shut down");
        served
    });

    // A pending stdin read must not hold the process open.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn serve_stdin(state: &AppState) -> Result<()> {
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = reply_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut requests = JoinSet::new();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read command from stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let engine = state.engine.clone();
                let reply_tx = reply_tx.clone();
                requests.spawn(async move {
                    let reply = handle_line(&engine, &line).await;
                    // The writer only goes away on shutdown.
                    let _ = reply_tx.send(reply);
                });
            }
            Some(joined) = requests.join_next(), if !requests.is_empty() => {
                if let Err(err) = joined {
                    log::error!("Command task failed: {err}");
                }
            }
            _ = &mut interrupted => {
                log::info!("Interrupted; abandoning {} pending commands", requests.len());
                requests.abort_all();
                break;
            }
        }
    }

    // Let commands still in flight at EOF finish and reply.
    while let Some(joined) = requests.join_next().await {
        if let Err(err) = joined {
            if !err.is_cancelled() {
                log::error!("Command task failed: {err}");
            }
        }
    }

    drop(reply_tx);
    writer
        .await
        .context("stdout writer task failed to join")?
        .context("Failed to write reply to stdout")
}
