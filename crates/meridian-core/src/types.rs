use libp2p::multiaddr::Protocol;
use libp2p::{kad, Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RoutingError;

/// A namespaced record key such as `/ipns/<name>`.
///
/// The first path segment is the namespace; record validators and
/// namespace-limited stores dispatch on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(String);

impl RecordKey {
    /// Create a record key from its string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build `/<namespace>/<rest>`.
    pub fn from_parts(namespace: &str, rest: &str) -> Self {
        Self(format!("/{}/{}", namespace, rest))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The namespace segment, if the key has the form `/<ns>/<rest>`.
    pub fn namespace(&self) -> Option<&str> {
        let (ns, _) = self.0.strip_prefix('/')?.split_once('/')?;
        if ns.is_empty() {
            None
        } else {
            Some(ns)
        }
    }

    /// Convert to a Kademlia record key.
    pub fn to_kad_key(&self) -> kad::RecordKey {
        kad::RecordKey::new(&self.0.as_bytes())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque identifier of a piece of content (a multihash or CID in bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey(Vec<u8>);

impl ContentKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to a Kademlia record key.
    pub fn to_kad_key(&self) -> kad::RecordKey {
        kad::RecordKey::new(&self.0)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl From<Vec<u8>> for ContentKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ContentKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// A peer together with the addresses it can be reached on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddrInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerAddrInfo {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }

    /// Split a `/…/p2p/<peer>` multiaddr into peer id and transport address.
    pub fn from_p2p_multiaddr(addr: &Multiaddr) -> Result<Self, RoutingError> {
        let mut transport = addr.clone();
        match transport.pop() {
            Some(Protocol::P2p(peer_id)) => {
                let addrs = if transport.is_empty() {
                    Vec::new()
                } else {
                    vec![transport]
                };
                Ok(Self { peer_id, addrs })
            }
            _ => Err(RoutingError::Other(format!(
                "multiaddr '{}' has no trailing /p2p/ component",
                addr
            ))),
        }
    }

    /// Parse a string multiaddr ending in `/p2p/<peer>`.
    pub fn parse(addr: &str) -> Result<Self, RoutingError> {
        let multiaddr = Multiaddr::from_str(addr)
            .map_err(|e| RoutingError::Other(format!("invalid multiaddr '{}': {}", addr, e)))?;
        Self::from_p2p_multiaddr(&multiaddr)
    }

    /// Add the addresses of `other` that are not already known.
    ///
    /// Infos for a different peer are ignored.
    pub fn merge(&mut self, other: PeerAddrInfo) {
        if other.peer_id != self.peer_id {
            return;
        }
        for addr in other.addrs {
            if !self.addrs.contains(&addr) {
                self.addrs.push(addr);
            }
        }
    }

    pub fn has_addrs(&self) -> bool {
        !self.addrs.is_empty()
    }
}

/// Routing operations a backend actually serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `put_value` / `get_value`.
    pub value_store: bool,
    /// `provide` / `find_providers`.
    pub content_routing: bool,
    /// `find_peer`.
    pub peer_routing: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        value_store: false,
        content_routing: false,
        peer_routing: false,
    };

    pub const ALL: Capabilities = Capabilities {
        value_store: true,
        content_routing: true,
        peer_routing: true,
    };

    pub const VALUE_STORE: Capabilities = Capabilities {
        value_store: true,
        content_routing: false,
        peer_routing: false,
    };

    /// Capabilities offered by at least one of `self` and `other`.
    pub fn union(self, other: Capabilities) -> Capabilities {
        Capabilities {
            value_store: self.value_store || other.value_store,
            content_routing: self.content_routing || other.content_routing,
            peer_routing: self.peer_routing || other.peer_routing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_namespace() {
        assert_eq!(RecordKey::new("/ipns/abc").namespace(), Some("ipns"));
        assert_eq!(RecordKey::new("/pk/a/b/c").namespace(), Some("pk"));
        assert_eq!(RecordKey::new("/ipns").namespace(), None);
        assert_eq!(RecordKey::new("ipns/abc").namespace(), None);
        assert_eq!(RecordKey::new("//abc").namespace(), None);
    }

    #[test]
    fn test_record_key_from_parts() {
        let key = RecordKey::from_parts("ipns", "k51qzi5uqu5d");
        assert_eq!(key.as_str(), "/ipns/k51qzi5uqu5d");
        assert_eq!(key.to_string(), "/ipns/k51qzi5uqu5d");
    }

    #[test]
    fn test_content_key_display_is_hex() {
        let key = ContentKey::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(key.to_string(), "deadbeef");
        assert_eq!(key.to_kad_key().to_vec(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_peer_addr_info_parse() {
        let peer = PeerId::random();
        let info = PeerAddrInfo::parse(&format!("/ip4/10.0.0.1/tcp/4001/p2p/{}", peer))
            .expect("valid p2p multiaddr");
        assert_eq!(info.peer_id, peer);
        assert_eq!(info.addrs.len(), 1);
        assert_eq!(info.addrs[0].to_string(), "/ip4/10.0.0.1/tcp/4001");
    }

    #[test]
    fn test_peer_addr_info_parse_bare_peer() {
        let peer = PeerId::random();
        let info = PeerAddrInfo::parse(&format!("/p2p/{}", peer)).expect("bare peer");
        assert_eq!(info.peer_id, peer);
        assert!(!info.has_addrs());
    }

    #[test]
    fn test_peer_addr_info_parse_without_peer_fails() {
        assert!(PeerAddrInfo::parse("/ip4/10.0.0.1/tcp/4001").is_err());
        assert!(PeerAddrInfo::parse("garbage").is_err());
    }

    #[test]
    fn test_peer_addr_info_merge() {
        let peer = PeerId::random();
        let a: Multiaddr = "/ip4/1.1.1.1/tcp/1".parse().unwrap();
        let b: Multiaddr = "/ip4/2.2.2.2/tcp/2".parse().unwrap();

        let mut info = PeerAddrInfo::new(peer, vec![a.clone()]);
        info.merge(PeerAddrInfo::new(peer, vec![a.clone(), b.clone()]));
        assert_eq!(info.addrs, vec![a.clone(), b]);

        // A different peer never leaks its addresses in.
        info.merge(PeerAddrInfo::new(
            PeerId::random(),
            vec!["/ip4/3.3.3.3/tcp/3".parse().unwrap()],
        ));
        assert_eq!(info.addrs.len(), 2);
    }

    #[test]
    fn test_capabilities_union() {
        let caps = Capabilities::VALUE_STORE.union(Capabilities {
            peer_routing: true,
            ..Capabilities::NONE
        });
        assert!(caps.value_store);
        assert!(caps.peer_routing);
        assert!(!caps.content_routing);
        assert_eq!(Capabilities::NONE.union(Capabilities::ALL), Capabilities::ALL);
    }
}
