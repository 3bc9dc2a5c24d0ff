use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::{Connection, Transaction};
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the sender and the worker thread. Dropping the last `Database` clone
/// closes the channel, which ends the worker loop, and then joins it.
struct Worker {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn submit(&self, job: Job) -> Result<()> {
        let jobs = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sender = jobs
            .as_ref()
            .ok_or_else(|| anyhow!("database worker already stopped"))?;
        sender
            .send(job)
            .map_err(|_| anyhow!("database worker is gone"))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let jobs = match self.jobs.get_mut() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        drop(jobs.take());

        let thread = match self.thread.get_mut() {
            Ok(thread) => thread,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = thread.take() {
            if let Err(err) = handle.join() {
                error!("Database worker panicked: {err:?}");
            }
        }
    }
}

/// Opens the store with cascading deletes enforced and the schema current.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL unavailable, staying on the default journal: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;

    // Quest deletion relies on ON DELETE CASCADE for sub-quests.
    conn.pragma_update(None, "foreign_keys", "ON")?;
    let enforced: bool = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    if !enforced {
        bail!("SQLite build does not enforce foreign keys");
    }

    run_migrations(&mut conn)?;
    Ok(conn)
}

/// Handle to the quest and profile store. All statements run on one worker
/// thread; callers hand it closures and await the reply.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let path = db_path.clone();

        let thread = thread::Builder::new()
            .name("skill-forge-db".into())
            .spawn(move || {
                let mut conn = match open_store(&path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for job in jobs_rx {
                    job(&mut conn);
                }
                debug!("Database worker stopped");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before it was ready")?
            .context("failed to initialize the quest store")?;

        info!("Quest store ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Mutex::new(Some(jobs_tx)),
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Runs `task` on the worker thread against the raw connection.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.worker.submit(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                debug!("Database caller went away before the reply");
            }
        }))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }

    /// Runs `task` inside one transaction: committed when it returns `Ok`,
    /// rolled back otherwise.
    pub async fn transaction<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(move |conn| {
            let tx = conn.transaction().context("failed to begin transaction")?;
            let value = task(&tx)?;
            tx.commit().context("failed to commit transaction")?;
            Ok(value)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use rusqlite::params;

    use super::*;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("store.sqlite3")).unwrap();
        (dir, db)
    }

    async fn profile_count(db: &Database) -> i64 {
        db.execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back() {
        let (_dir, db) = open();

        let result: Result<()> = db
            .transaction(|tx| {
                tx.execute(
                    "INSERT INTO profiles (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    params!["u1", "2025-01-01T00:00:00+00:00"],
                )?;
                Err(anyhow!("second statement failed"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(profile_count(&db).await, 0);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let (_dir, db) = open();
        let enabled: bool = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?))
            .await
            .unwrap();
        assert!(enabled);

        let orphan = db
            .execute(|conn| {
                conn.execute(
                    "INSERT INTO quests (id, user_id, title, created_at, updated_at)
                     VALUES ('q', 'nobody', 't', 'x', 'x')",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn clones_share_one_worker() {
        let (_dir, db) = open();
        let other = db.clone();
        other
            .transaction(|tx| {
                tx.execute(
                    "INSERT INTO profiles (user_id, created_at, updated_at) VALUES ('u1', 'x', 'x')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        drop(other);

        assert_eq!(profile_count(&db).await, 1);
    }
}
