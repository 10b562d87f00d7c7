//! The DHT client.
//!
//! `DhtRouter` is a cheap handle to a background task that owns the Kademlia
//! record store and the peer table. Every operation is a [`DhtCommand`] sent
//! over an mpsc channel and answered on a oneshot.

use async_trait::async_trait;
use libp2p::kad::store::{MemoryStore, RecordStore};
use libp2p::kad::{ProviderRecord, Record, RecordKey as KadKey};
use libp2p::{Multiaddr, PeerId};
use meridian_core::{
    Capabilities, Closable, ContentKey, DhtClient, PeerAddrInfo, RecordKey, Routing,
    RoutingError, Validator,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::NetworkError;

/// Configuration for the DHT client.
#[derive(Debug, Clone)]
pub struct DhtConfig {
    /// Bootstrap peers as multiaddrs ending in `/p2p/<peer>`.
    pub bootstrap_peers: Vec<String>,
    /// Addresses advertised in our own provider records.
    pub listen_addrs: Vec<Multiaddr>,
    /// Capacity of the command channel.
    pub command_capacity: usize,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            bootstrap_peers: Vec::new(),
            listen_addrs: Vec::new(),
            command_capacity: 256,
        }
    }
}

impl DhtConfig {
    /// Parse the bootstrap list.
    pub fn bootstrap_infos(&self) -> Result<Vec<PeerAddrInfo>, NetworkError> {
        self.bootstrap_peers
            .iter()
            .map(|addr| {
                PeerAddrInfo::parse(addr).map_err(|e| NetworkError::InvalidAddress {
                    addr: addr.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

/// Commands handled by the DHT task.
pub enum DhtCommand {
    PutRecord {
        key: RecordKey,
        value: Vec<u8>,
        reply: oneshot::Sender<Result<(), RoutingError>>,
    },
    GetRecord {
        key: RecordKey,
        reply: oneshot::Sender<Result<Vec<u8>, RoutingError>>,
    },
    AddProvider {
        key: ContentKey,
        announce: bool,
        reply: oneshot::Sender<Result<(), RoutingError>>,
    },
    GetProviders {
        key: ContentKey,
        limit: usize,
        reply: oneshot::Sender<Vec<PeerAddrInfo>>,
    },
    FindPeer {
        peer: PeerId,
        reply: oneshot::Sender<Option<PeerAddrInfo>>,
    },
    Bootstrap {
        reply: oneshot::Sender<usize>,
    },
    AddAddress {
        peer: PeerId,
        addr: Multiaddr,
        reply: oneshot::Sender<()>,
    },
    RoutingTable {
        reply: oneshot::Sender<Vec<PeerAddrInfo>>,
    },
}

/// State owned by the DHT task.
struct DhtState {
    local_peer_id: PeerId,
    listen_addrs: Vec<Multiaddr>,
    bootstrap: Vec<PeerAddrInfo>,
    validator: Arc<dyn Validator>,
    store: MemoryStore,
    peers: HashMap<PeerId, Vec<Multiaddr>>,
}

impl DhtState {
    fn handle_command(&mut self, cmd: DhtCommand) {
        match cmd {
            DhtCommand::PutRecord { key, value, reply } => {
                let _ = reply.send(self.put_record(&key, value));
            }
            DhtCommand::GetRecord { key, reply } => {
                let _ = reply.send(self.get_record(&key));
            }
            DhtCommand::AddProvider {
                key,
                announce,
                reply,
            } => {
                let _ = reply.send(self.add_provider(&key, announce));
            }
            DhtCommand::GetProviders { key, limit, reply } => {
                let _ = reply.send(self.providers(&key, limit));
            }
            DhtCommand::FindPeer { peer, reply } => {
                let _ = reply.send(self.find_peer(&peer));
            }
            DhtCommand::Bootstrap { reply } => {
                let _ = reply.send(self.bootstrap());
            }
            DhtCommand::AddAddress { peer, addr, reply } => {
                self.add_address(peer, addr);
                let _ = reply.send(());
            }
            DhtCommand::RoutingTable { reply } => {
                let table = self
                    .peers
                    .iter()
                    .map(|(peer, addrs)| PeerAddrInfo::new(*peer, addrs.clone()))
                    .collect();
                let _ = reply.send(table);
            }
        }
    }

    fn put_record(&mut self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        self.validator.validate(key, &value)?;
        let kad_key = key.to_kad_key();

        if let Some(existing) = self.store.get(&kad_key) {
            let candidates = vec![existing.value.clone(), value.clone()];
            if self.validator.select(key, &candidates)? == 0 {
                tracing::debug!(%key, "kept existing dht record");
                return Ok(());
            }
        }

        let mut record = Record::new(kad_key, value);
        record.publisher = Some(self.local_peer_id);
        self.store.put(record)?;
        tracing::debug!(%key, "stored dht record");
        Ok(())
    }

    fn get_record(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        let record = self
            .store
            .get(&key.to_kad_key())
            .ok_or(RoutingError::NotFound)?;
        self.validator.validate(key, &record.value)?;
        Ok(record.value.clone())
    }

    fn add_provider(&mut self, key: &ContentKey, announce: bool) -> Result<(), RoutingError> {
        let record = ProviderRecord::new(
            key.to_kad_key(),
            self.local_peer_id,
            self.listen_addrs.clone(),
        );
        self.store.add_provider(record)?;
        if announce {
            tracing::debug!(%key, peers = self.peers.len(), "announced provider record");
        }
        Ok(())
    }

    fn providers(&self, key: &ContentKey, limit: usize) -> Vec<PeerAddrInfo> {
        let kad_key: KadKey = key.to_kad_key();
        let mut out: Vec<PeerAddrInfo> = Vec::new();
        for record in self.store.providers(&kad_key) {
            if limit > 0 && out.len() >= limit {
                break;
            }
            let mut info = PeerAddrInfo::new(record.provider, record.addresses);
            if let Some(known) = self.peers.get(&info.peer_id) {
                info.merge(PeerAddrInfo::new(info.peer_id, known.clone()));
            }
            out.push(info);
        }
        out
    }

    fn find_peer(&self, peer: &PeerId) -> Option<PeerAddrInfo> {
        if *peer == self.local_peer_id {
            return Some(PeerAddrInfo::new(*peer, self.listen_addrs.clone()));
        }
        self.peers
            .get(peer)
            .map(|addrs| PeerAddrInfo::new(*peer, addrs.clone()))
    }

    fn bootstrap(&mut self) -> usize {
        let seeds = self.bootstrap.clone();
        for info in seeds {
            for addr in info.addrs {
                self.add_address(info.peer_id, addr);
            }
        }
        self.peers.len()
    }

    fn add_address(&mut self, peer: PeerId, addr: Multiaddr) {
        if peer == self.local_peer_id {
            return;
        }
        let addrs = self.peers.entry(peer).or_default();
        if !addrs.contains(&addr) {
            tracing::trace!(%peer, %addr, "dht address added");
            addrs.push(addr);
        }
    }
}

/// Handle to the DHT task.
pub struct DhtRouter {
    local_peer_id: PeerId,
    command_tx: mpsc::Sender<DhtCommand>,
    shutdown_tx: mpsc::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DhtRouter {
    /// Start the DHT task. Must be called from within a tokio runtime.
    pub fn spawn(
        local_peer_id: PeerId,
        validator: Arc<dyn Validator>,
        config: DhtConfig,
    ) -> Result<Arc<Self>, NetworkError> {
        let bootstrap = config.bootstrap_infos()?;
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let state = DhtState {
            local_peer_id,
            listen_addrs: config.listen_addrs,
            bootstrap,
            validator,
            store: MemoryStore::new(local_peer_id),
            peers: HashMap::new(),
        };

        tracing::info!(%local_peer_id, "starting dht client");
        let task = tokio::spawn(run(state, command_rx, shutdown_rx));

        Ok(Arc::new(Self {
            local_peer_id,
            command_tx,
            shutdown_tx,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn request<T, F>(&self, make: F) -> Result<T, RoutingError>
    where
        F: FnOnce(oneshot::Sender<T>) -> DhtCommand + Send,
        T: Send,
    {
        if self.is_closed() {
            return Err(RoutingError::Closed);
        }
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| RoutingError::Closed)?;
        rx.await.map_err(|_| RoutingError::Closed)
    }
}

/// The DHT event loop. Returns on shutdown or when every handle is gone.
async fn run(
    mut state: DhtState,
    mut command_rx: mpsc::Receiver<DhtCommand>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    tracing::debug!(peer_id = %state.local_peer_id, "dht event loop started");
    loop {
        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(cmd) => state.handle_command(cmd),
                None => {
                    tracing::debug!("dht command channel closed");
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                tracing::debug!("dht shutting down (signal)");
                break;
            }
        }
    }
}

#[async_trait]
impl Routing for DhtRouter {
    fn name(&self) -> &str {
        "dht"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        let key = key.clone();
        self.request(|reply| DhtCommand::PutRecord { key, value, reply })
            .await?
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        let key = key.clone();
        self.request(|reply| DhtCommand::GetRecord { key, reply })
            .await?
    }

    async fn provide(&self, key: &ContentKey, announce: bool) -> Result<(), RoutingError> {
        let key = key.clone();
        self.request(|reply| DhtCommand::AddProvider {
            key,
            announce,
            reply,
        })
        .await?
    }

    async fn find_providers(
        &self,
        key: &ContentKey,
        limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        let key = key.clone();
        self.request(|reply| DhtCommand::GetProviders { key, limit, reply })
            .await
    }

    async fn find_peer(&self, peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        let peer = *peer;
        self.request(|reply| DhtCommand::FindPeer { peer, reply })
            .await?
            .ok_or(RoutingError::NotFound)
    }

    async fn bootstrap(&self) -> Result<(), RoutingError> {
        let known = self
            .request(|reply| DhtCommand::Bootstrap { reply })
            .await?;
        tracing::info!(known_peers = known, "dht bootstrapped");
        Ok(())
    }

    fn as_dht(self: Arc<Self>) -> Option<Arc<dyn DhtClient>> {
        Some(self)
    }
}

#[async_trait]
impl Closable for DhtRouter {
    async fn close(&self) -> Result<(), RoutingError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.lock().await.take() {
            task.await.map_err(NetworkError::from)?;
        }
        tracing::info!(peer_id = %self.local_peer_id, "dht client closed");
        Ok(())
    }
}

#[async_trait]
impl DhtClient for DhtRouter {
    async fn routing_table(&self) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        self.request(|reply| DhtCommand::RoutingTable { reply })
            .await
    }

    async fn add_address(&self, peer: PeerId, addr: Multiaddr) -> Result<(), RoutingError> {
        self.request(|reply| DhtCommand::AddAddress { peer, addr, reply })
            .await
    }
}
