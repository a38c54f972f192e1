use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Owns the worker thread; stopping it waits for queued jobs to drain.
struct Worker {
    jobs: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn(path: PathBuf) -> Result<Self> {
        let (jobs, queue) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let thread = thread::Builder::new()
            .name("mathcanvas-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for message in queue {
                    match message {
                        Message::Run(job) => job(&mut conn),
                        Message::Stop => break,
                    }
                }
                info!("Database worker for {} stopped", path.display());
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before it was ready")??;

        Ok(Self {
            jobs,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.jobs
            .send(Message::Run(job))
            .map_err(|_| anyhow!("database worker is no longer running"))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        if self.jobs.send(Message::Stop).is_err() {
            error!("Database worker already gone at shutdown");
        }
        if let Err(err) = handle.join() {
            error!("Database worker panicked: {err:?}");
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;
    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

/// Handle to the canvas database. Statements run on one dedicated thread,
/// in submission order; clones share that thread.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let worker = Worker::spawn(path.clone())?;
        info!("Canvas database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `task` on the worker thread and hands its result back.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.worker.submit(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                log::debug!("database caller went away before the reply");
            }
        }))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_parent_directory_and_runs_statements() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("canvas.db");
        let db = Database::new(path.clone()).expect("open");

        assert_eq!(db.path(), path.as_path());
        let version: i32 = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?))
            .await
            .expect("query");
        assert_eq!(version, crate::db::migrations::CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("canvas.db")).expect("open");

        let err = db
            .execute(|conn| {
                conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
                Ok(())
            })
            .await
            .expect_err("no such table");
        assert!(err.to_string().contains("missing_table"));
    }

    #[tokio::test]
    async fn clones_share_one_worker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("canvas.db")).expect("open");
        db.execute(|conn| Ok(conn.execute_batch("CREATE TABLE log (n INTEGER)")?))
            .await
            .expect("create");

        let mut writes = Vec::new();
        for n in 0..5 {
            let db = db.clone();
            writes.push(tokio::spawn(async move {
                db.execute(move |conn| Ok(conn.execute("INSERT INTO log VALUES (?1)", [n])?))
                    .await
            }));
        }
        for write in writes {
            write.await.expect("join").expect("insert");
        }

        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM log", [], |row| row.get(0))?))
            .await
            .expect("count");
        assert_eq!(count, 5);
    }
}
