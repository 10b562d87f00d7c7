//! Background task feeding relay candidates to the relay selector.
//!
//! Each round offers the configured peering peers first, then a shuffle of
//! DHT routing-table peers that have addresses, up to a per-round cap. Sends
//! wait for channel capacity on the feeder's own task and race against
//! cancellation, so shutdown never waits on a slow consumer.

use futures::FutureExt;
use meridian_core::{DhtClient, PeerAddrInfo, RoutingError};
use rand::seq::SliceRandom;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::RelayConfig;

#[derive(Debug, Clone)]
pub struct FeederSettings {
    pub interval: Duration,
    pub max_candidates: usize,
}

impl From<&RelayConfig> for FeederSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            interval: config.interval(),
            max_candidates: config.max_candidates_per_round,
        }
    }
}

/// Handle to the feeder task.
pub struct RelayFeeder {
    settings: FeederSettings,
    dht: Option<Arc<dyn DhtClient>>,
    peering: Vec<PeerAddrInfo>,
    sender: Mutex<Option<mpsc::Sender<PeerAddrInfo>>>,
    cancel: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayFeeder {
    pub fn new(
        settings: FeederSettings,
        dht: Option<Arc<dyn DhtClient>>,
        peering: Vec<PeerAddrInfo>,
        sender: mpsc::Sender<PeerAddrInfo>,
    ) -> Arc<Self> {
        let (cancel, _) = watch::channel(false);
        Arc::new(Self {
            settings,
            dht,
            peering,
            sender: Mutex::new(Some(sender)),
            cancel,
            task: Mutex::new(None),
        })
    }

    /// Spawn the feeder task. A feeder starts at most once.
    pub async fn start(&self) -> Result<(), RoutingError> {
        let sender = self
            .sender
            .lock()
            .await
            .take()
            .ok_or_else(|| RoutingError::Other("relay feeder already started".into()))?;

        let round = Round {
            settings: self.settings.clone(),
            dht: self.dht.clone(),
            peering: self.peering.clone(),
        };
        let cancel = self.cancel.subscribe();

        let task = tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(feed(round, sender, cancel))
                .catch_unwind()
                .await
            {
                tracing::error!(panic = %panic_message(&panic), "relay feeder panicked");
            }
            tracing::debug!("relay feeder exited");
        });
        *self.task.lock().await = Some(task);

        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            max_candidates = self.settings.max_candidates,
            peering = self.peering.len(),
            "relay feeder started"
        );
        Ok(())
    }

    /// Signal cancellation and wait until the task has stopped.
    pub async fn shutdown(&self) {
        let _ = self.cancel.send(true);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "relay feeder task ended abnormally");
            }
        }
        tracing::info!("relay feeder stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

/// Candidate gathering for one round.
struct Round {
    settings: FeederSettings,
    dht: Option<Arc<dyn DhtClient>>,
    peering: Vec<PeerAddrInfo>,
}

impl Round {
    async fn candidates(&self) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        let max = self.settings.max_candidates;
        let mut out: Vec<PeerAddrInfo> = self
            .peering
            .iter()
            .filter(|p| p.has_addrs())
            .take(max)
            .cloned()
            .collect();

        if let Some(dht) = &self.dht {
            let seen: HashSet<_> = out.iter().map(|p| p.peer_id).collect();
            let mut table: Vec<PeerAddrInfo> = dht
                .routing_table()
                .await?
                .into_iter()
                .filter(|p| p.has_addrs() && !seen.contains(&p.peer_id))
                .collect();
            table.shuffle(&mut rand::thread_rng());
            let room = max.saturating_sub(out.len());
            out.extend(table.into_iter().take(room));
        }
        Ok(out)
    }
}

async fn feed(round: Round, sender: mpsc::Sender<PeerAddrInfo>, mut cancel: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(round.settings.interval.max(Duration::from_millis(1)));
    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            _ = ticker.tick() => {}
        }

        let gathered = tokio::select! {
            biased;
            _ = cancel.changed() => return,
            gathered = round.candidates() => gathered,
        };
        let candidates = match gathered {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "could not read dht routing table, skipping round");
                continue;
            }
        };
        tracing::trace!(count = candidates.len(), "offering relay candidates");

        for candidate in candidates {
            tokio::select! {
                biased;
                _ = cancel.changed() => return,
                sent = sender.send(candidate) => {
                    if sent.is_err() {
                        tracing::debug!("relay candidate consumer gone");
                        return;
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}
