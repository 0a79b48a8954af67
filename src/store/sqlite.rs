use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{migrations::run_migrations, RemoteLogStore};
use crate::accounting::{ClickWeight, RedirectEvent, RedirectRecord, RedirectSource};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct WorkerHandle {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to log store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join log store thread: {join_err:?}");
            }
        }
    }
}

/// Fixed-width UTC so that string comparison in SQL matches time order.
fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid timestamp '{value}': {err}"))
}

/// Log store backed by a SQLite file, accessed from a single worker thread.
#[derive(Clone)]
pub struct SqliteLogStore {
    inner: Arc<WorkerHandle>,
}

impl SqliteLogStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create log store directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = path.clone();

        let worker = thread::Builder::new()
            .name("focusring-store".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite log store")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run log store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Log store opener dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&mut conn),
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Log store thread shutting down");
            })
            .context("failed to spawn log store worker thread")?;

        ready_rx
            .recv()
            .context("log store worker exited before signaling readiness")??;

        info!("Log store opened at {}", path.display());

        Ok(Self {
            inner: Arc::new(WorkerHandle {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                error!("Log store caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to log store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("log store thread terminated unexpectedly"))?
    }
}

#[async_trait]
impl RemoteLogStore for SqliteLogStore {
    async fn insert_batch(&self, user_id: &str, events: &[RedirectEvent]) -> Result<()> {
        let user_id = user_id.to_string();
        let events = events.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let created_at = format_timestamp(&Utc::now());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO focus_logs (id, user_id, timestamp, value, source, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for event in &events {
                    stmt.execute(params![
                        Uuid::new_v4().to_string(),
                        user_id,
                        format_timestamp(&event.timestamp),
                        event.value(),
                        event.source.as_str(),
                        created_at,
                    ])
                    .context("failed to insert redirect log")?;
                }
            }
            tx.commit().context("failed to commit redirect batch")?;
            Ok(())
        })
        .await
    }

    async fn query_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RedirectRecord>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, timestamp, value, source
                 FROM focus_logs
                 WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
                 ORDER BY timestamp ASC",
            )?;

            let mut rows =
                stmt.query(params![user_id, format_timestamp(&from), format_timestamp(&to)])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let value: f64 = row.get(3)?;
                let weight = ClickWeight::from_value(value)
                    .ok_or_else(|| anyhow!("invalid redirect weight {value}"))?;
                let source: String = row.get(4)?;
                records.push(RedirectRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    timestamp: parse_timestamp(&row.get::<_, String>(2)?)?,
                    value: weight.value(),
                    source: RedirectSource::parse(&source)
                        .ok_or_else(|| anyhow!("unknown redirect source '{source}'"))?,
                });
            }
            Ok(records)
        })
        .await
    }
}
