//! Change-feed watcher: turns newly inserted chat rows into creation events.

use async_trait::async_trait;
use replica_core::{error::ReplicaError, message::MessageCreated, traits::MessageSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::store::Store;

/// Rows fetched per poll.
const BATCH_SIZE: i64 = 100;
/// Upper bound for the error backoff.
const MAX_BACKOFF_SECS: u64 = 60;

/// Polls the `chats` table and emits one [`MessageCreated`] per new row.
///
/// Only rows inserted after `start()` are reported.
pub struct ChatWatcher {
    store: Store,
    poll_interval: Duration,
    last_seq: Arc<Mutex<Option<i64>>>,
    stop_tx: watch::Sender<bool>,
}

impl ChatWatcher {
    pub fn new(store: Store, poll_interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            store,
            poll_interval,
            last_seq: Arc::new(Mutex::new(None)),
            stop_tx,
        }
    }
}

#[async_trait]
impl MessageSource for ChatWatcher {
    fn name(&self) -> &str {
        "sqlite-watcher"
    }

    async fn start(&self) -> Result<mpsc::Receiver<MessageCreated>, ReplicaError> {
        let high_water = self.store.max_seq().await?;
        *self.last_seq.lock().await = Some(high_water);
        self.stop_tx.send_replace(false);

        let (tx, rx) = mpsc::channel(64);
        let store = self.store.clone();
        let poll_interval = self.poll_interval;
        let last_seq = self.last_seq.clone();
        let mut stop_rx = self.stop_tx.subscribe();

        info!("Chat watcher starting at seq {high_water}...");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;

            loop {
                if *stop_rx.borrow() {
                    break;
                }

                let after = last_seq.lock().await.unwrap_or(0);
                let wait = match store.changes_since(after, BATCH_SIZE).await {
                    Ok(rows) => {
                        backoff_secs = 1;
                        let full_batch = rows.len() as i64 == BATCH_SIZE;
                        for row in rows {
                            *last_seq.lock().await = Some(row.seq);
                            let event = match MessageCreated::from_path(&row.path, row.message) {
                                Ok(ev) => ev,
                                Err(e) => {
                                    warn!("watcher: skipping row {}: {e}", row.seq);
                                    continue;
                                }
                            };
                            debug!("watcher: new message at {}", row.path);
                            if tx.send(event).await.is_err() {
                                info!("watcher receiver dropped, stopping");
                                return;
                            }
                        }
                        // Drain a backlog without sleeping.
                        if full_batch {
                            Duration::ZERO
                        } else {
                            poll_interval
                        }
                    }
                    Err(e) => {
                        error!("watcher poll error (retry in {backoff_secs}s): {e}");
                        let wait = Duration::from_secs(backoff_secs);
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        wait
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Chat watcher stopped");
        });

        Ok(rx)
    }

    async fn stop(&self) -> Result<(), ReplicaError> {
        self.stop_tx.send_replace(true);
        Ok(())
    }
}
