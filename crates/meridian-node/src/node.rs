//! The Meridian node orchestrator.
//!
//! Opens storage, creates the initial routing backend, assembles the routing
//! layer and drives the lifecycle that owns every long-lived task.

use anyhow::Result;
use libp2p::identity::Keypair;
use libp2p::{Multiaddr, PeerId};
use meridian_core::{Datastore, PubSub, RecordKey, Routing, Validator};
use meridian_network::{DhtConfig, DhtRouter, LocalPubSub, PubsubValueStore};
use meridian_routing::{NullRouter, ParallelRouter, SealedRegistry, TieredRouter};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::MeridianConfig;
use crate::lifecycle::Lifecycle;
use crate::records::{default_validator, NameRecord, PUBLIC_KEY_NAMESPACE};
use crate::routing::{assemble, RoutingDeps};
use crate::storage::RocksDatastore;

/// State key holding the sequence number of our last published name record.
const NAME_SEQUENCE_KEY: &str = "name-sequence";

/// Handles that only exist while the node runs.
struct Running {
    registry: SealedRegistry,
    value: Arc<ParallelRouter>,
    content: Arc<TieredRouter>,
    pubsub_store: Option<Arc<PubsubValueStore>>,
    datastore: Arc<RocksDatastore>,
    candidates: Option<JoinHandle<usize>>,
}

/// A Meridian node.
pub struct MeridianNode {
    config: MeridianConfig,
    keypair: Keypair,
    lifecycle: Lifecycle,
    running: Option<Running>,
}

impl MeridianNode {
    /// Create a node. The identity is loaded from (or saved to) the
    /// configured keypair file, or generated for this run only.
    pub fn new(config: MeridianConfig) -> Result<Self> {
        let keypair = if let Some(ref path) = config.identity.keypair_path {
            load_or_generate_keypair(path)?
        } else {
            tracing::info!("generating ephemeral keypair");
            Keypair::generate_ed25519()
        };

        let peer_id = PeerId::from(keypair.public());
        tracing::info!(%peer_id, offline = config.routing.offline, "meridian node created");

        Ok(Self {
            config,
            keypair,
            lifecycle: Lifecycle::new(),
            running: None,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::from(self.keypair.public())
    }

    pub fn config(&self) -> &MeridianConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The value/peer router, once started.
    pub fn value_routing(&self) -> Option<Arc<ParallelRouter>> {
        self.running.as_ref().map(|r| r.value.clone())
    }

    /// The content router, once started.
    pub fn content_routing(&self) -> Option<Arc<TieredRouter>> {
        self.running.as_ref().map(|r| r.content.clone())
    }

    pub fn registry(&self) -> Option<&SealedRegistry> {
        self.running.as_ref().map(|r| &r.registry)
    }

    pub fn pubsub_store(&self) -> Option<Arc<PubsubValueStore>> {
        self.running.as_ref().and_then(|r| r.pubsub_store.clone())
    }

    /// Open storage, assemble routing and start every lifecycle hook.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            anyhow::bail!("node already started");
        }
        tracing::info!("starting meridian node");

        let datastore = Arc::new(RocksDatastore::open(&self.config.storage.data_dir)?);
        tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");

        let peer_id = self.peer_id();
        let validator: Arc<dyn Validator> = Arc::new(default_validator());
        let initial = self.initial_router(peer_id, validator.clone())?;
        let pubsub: Option<Arc<dyn PubSub>> = self
            .config
            .pubsub
            .enabled
            .then(|| Arc::new(LocalPubSub::new(peer_id)) as Arc<dyn PubSub>);

        let deps = RoutingDeps {
            host: peer_id,
            initial,
            validator,
            datastore: datastore.clone() as Arc<dyn Datastore>,
            pubsub,
        };
        let mut assembled = assemble(&mut self.lifecycle, deps, &self.config)?;

        if let Err(e) = self.lifecycle.start().await {
            // Started hooks were rolled back; drop the rest with their resources.
            self.lifecycle = Lifecycle::new();
            return Err(e.into());
        }

        if let Err(e) = assembled.value.bootstrap().await {
            tracing::warn!(error = %e, "routing bootstrap failed");
        }

        let candidates = assembled.relay_candidates.take().map(|mut rx| {
            tokio::spawn(async move {
                let mut seen = 0usize;
                while let Some(candidate) = rx.recv().await {
                    seen += 1;
                    tracing::debug!(
                        peer = %candidate.peer_id,
                        addrs = candidate.addrs.len(),
                        "relay candidate"
                    );
                }
                seen
            })
        });

        let running = Running {
            registry: assembled.registry,
            value: assembled.value,
            content: assembled.content,
            pubsub_store: assembled.pubsub_store,
            datastore,
            candidates,
        };
        self.publish_public_key(&running.value).await;
        self.running = Some(running);

        tracing::info!(%peer_id, "meridian node started");
        Ok(())
    }

    /// Stop every lifecycle hook in reverse order and release storage.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        tracing::info!("shutting down meridian node");

        let stopped = self.lifecycle.stop().await;
        self.lifecycle = Lifecycle::new();

        if let Some(task) = running.candidates {
            match task.await {
                Ok(seen) => tracing::debug!(candidates = seen, "relay candidate consumer exited"),
                Err(e) => tracing::warn!(error = %e, "relay candidate consumer failed"),
            }
        }

        stopped?;
        tracing::info!("meridian node stopped");
        Ok(())
    }

    /// Publish `value` as our name record with the next sequence number.
    pub async fn publish_name(&self, value: &str) -> Result<NameRecord> {
        let running = self.running()?;

        let sequence = match running.datastore.get_state(NAME_SEQUENCE_KEY)? {
            Some(bytes) => last_sequence(&bytes)? + 1,
            None => 1,
        };
        let record = NameRecord::new(value, sequence);
        let key = NameRecord::key_for(&self.peer_id());

        running.value.put_value(&key, record.encode()?).await?;
        running
            .datastore
            .put_state(NAME_SEQUENCE_KEY, &sequence.to_be_bytes())?;

        tracing::info!(%key, sequence, "name record published");
        Ok(record)
    }

    /// Resolve the name record of `peer`.
    pub async fn resolve_name(&self, peer: &PeerId) -> Result<NameRecord> {
        let running = self.running()?;
        let data = running.value.get_value(&NameRecord::key_for(peer)).await?;
        Ok(NameRecord::decode(&data)?)
    }

    fn running(&self) -> Result<&Running> {
        self.running
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("node not started"))
    }

    fn initial_router(
        &self,
        peer_id: PeerId,
        validator: Arc<dyn Validator>,
    ) -> Result<Arc<dyn Routing>> {
        if self.config.routing.offline {
            tracing::info!("offline mode, no network routing");
            return Ok(Arc::new(NullRouter));
        }

        let listen: Multiaddr = self.config.p2p_multiaddr().parse()?;
        let dht = DhtRouter::spawn(
            peer_id,
            validator,
            DhtConfig {
                bootstrap_peers: self.config.network.bootstrap_peers.clone(),
                listen_addrs: vec![listen],
                command_capacity: self.config.routing.dht_command_capacity,
            },
        )?;
        Ok(dht as Arc<dyn Routing>)
    }

    /// Make our public key resolvable under `/pk/<peer>`.
    async fn publish_public_key(&self, value: &ParallelRouter) {
        let key = RecordKey::from_parts(PUBLIC_KEY_NAMESPACE, &self.peer_id().to_base58());
        if let Err(e) = value
            .put_value(&key, self.keypair.public().encode_protobuf())
            .await
        {
            tracing::warn!(%key, error = %e, "could not publish public key");
        }
    }
}

fn last_sequence(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("corrupt name sequence ({} bytes)", bytes.len()))?;
    Ok(u64::from_be_bytes(raw))
}

/// Load a keypair from disk, or generate and save a new one.
fn load_or_generate_keypair(path: &Path) -> Result<Keypair> {
    if path.exists() {
        let bytes = std::fs::read(path)?;
        let keypair = Keypair::from_protobuf_encoding(&bytes)
            .map_err(|e| anyhow::anyhow!("failed to decode keypair: {}", e))?;
        tracing::info!(path = %path.display(), "loaded keypair from disk");
        Ok(keypair)
    } else {
        let keypair = Keypair::generate_ed25519();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = keypair
            .to_protobuf_encoding()
            .map_err(|e| anyhow::anyhow!("failed to encode keypair: {}", e))?;
        std::fs::write(path, encoded)?;
        tracing::info!(path = %path.display(), "generated and saved new keypair");
        Ok(keypair)
    }
}
