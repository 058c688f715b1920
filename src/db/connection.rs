use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const WORKER_THREAD_NAME: &str = "spotcheck-db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type StoreJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreRequest {
    Run(StoreJob),
    Close,
}

struct StoreWorker {
    requests: mpsc::Sender<StoreRequest>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        let thread = match self.thread.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(thread) = thread else {
            return;
        };

        if self.requests.send(StoreRequest::Close).is_err() {
            warn!("Spot store thread already gone at shutdown");
        }
        if let Err(panic) = thread.join() {
            error!("Spot store thread panicked: {panic:?}");
        }
    }
}

/// Open the file and get it ready for use. Cascading deletes of check history
/// depend on foreign keys, so failing to enable them is fatal.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable, keeping default journal: {err}");
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    let enforced: bool = conn
        .pragma_query_value(None, "foreign_keys", |row| row.get(0))
        .context("failed to read foreign_keys pragma")?;
    if !enforced {
        bail!("SQLite build does not enforce foreign keys");
    }

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

/// Run jobs in arrival order until asked to close or every handle is gone.
fn serve(mut conn: Connection, requests: mpsc::Receiver<StoreRequest>) {
    for request in requests {
        match request {
            StoreRequest::Run(job) => job(&mut conn),
            StoreRequest::Close => break,
        }
    }
    info!("Spot store thread shutting down");
}

/// Handle to the spot store.
///
/// A single worker thread owns the SQLite connection. Every operation is a
/// closure shipped to that thread, so mutations never interleave: each closure
/// runs to completion (inside its own transaction where it touches more than
/// one row) before the next one starts.
#[derive(Clone)]
pub struct Database {
    worker: Arc<StoreWorker>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the store at `path` and migrate it.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (request_tx, request_rx) = mpsc::channel::<StoreRequest>();
        let (opened_tx, opened_rx) = mpsc::channel::<Result<()>>();
        let worker_path = path.clone();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || match open_store(&worker_path) {
                Ok(conn) => {
                    if opened_tx.send(Ok(())).is_ok() {
                        serve(conn, request_rx);
                    }
                }
                Err(err) => {
                    let _ = opened_tx.send(Err(err));
                }
            })
            .context("failed to spawn spot store worker thread")?;

        opened_rx
            .recv()
            .context("spot store worker exited before it finished opening")??;

        info!("Spot store ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(StoreWorker {
                requests: request_tx,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `job` on the store thread and await its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = StoreRequest::Run(Box::new(move |conn| {
            // A dropped receiver means the caller was cancelled; the job's
            // own transaction already decided the outcome.
            let _ = reply_tx.send(job(conn));
        }));

        self.worker
            .requests
            .send(request)
            .map_err(|_| anyhow!("spot store thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("spot store thread stopped before replying"))?
    }
}
