//! The SQLite connection lives on one dedicated thread. Callers hand it
//! closures: `execute` waits for the result, `submit` does not. Both go
//! through the same queue, so work runs in the order it was handed over.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

struct Worker {
    queue: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };

        if self.queue.send(Message::Stop).is_err() {
            warn!("Database thread already gone at shutdown");
        }
        if handle.join().is_err() {
            error!("Database thread panicked");
        }
    }
}

/// Opens the file, applies connection pragmas and brings the schema up to date.
fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("cannot open SQLite database at {}", path.display()))?;

    // Both are best effort: an in-memory or read-only file still works without them.
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable: {err}");
    }
    if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
        warn!("Foreign key enforcement unavailable: {err}");
    }

    run_migrations(&mut conn).context("schema migration failed")?;
    Ok(conn)
}

fn serve(mut conn: Connection, inbox: mpsc::Receiver<Message>) {
    for message in inbox {
        match message {
            Message::Run(job) => job(&mut conn),
            Message::Stop => break,
        }
    }
    info!("Database thread stopped");
}

/// Cloneable handle to the database thread.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Starts the database thread and blocks until the schema is ready.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let (queue, inbox) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("detox-db".into())
            .spawn(move || match open_connection(&thread_path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(conn, inbox);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("cannot spawn database thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("database thread exited during startup"))??;

        info!("Database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                queue,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `task` on the database thread and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.enqueue(Box::new(move |conn| {
            // The caller may have given up waiting; the work still happened.
            let _ = reply.send(task(conn));
        }))?;

        result
            .await
            .map_err(|_| anyhow!("database thread dropped the request"))?
    }

    /// Queues a write without waiting for it. Failures are logged on the database thread.
    pub fn submit<F>(&self, label: &'static str, task: F)
    where
        F: FnOnce(&mut Connection) -> Result<()> + Send + 'static,
    {
        let queued = self.enqueue(Box::new(move |conn| {
            if let Err(err) = task(conn) {
                error!("{label} failed: {err:#}");
            }
        }));
        if let Err(err) = queued {
            error!("{label} dropped: {err:#}");
        }
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        self.worker
            .queue
            .send(Message::Run(job))
            .map_err(|_| anyhow!("database thread is not running"))
    }
}
