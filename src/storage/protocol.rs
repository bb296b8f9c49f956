//! Storage Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) exchanged between
//! the replication coordinator and every storage node.
//!
//! These structures are serialized as JSON and sent over HTTP, with object
//! bytes carried as base64 strings. Only `Store`,
//! `Retrieve` and `Delete` are driven by the coordinator; `Gossip` and
//! `GetClusterStatus` are hooks into the membership view.

use crate::membership::types::{Member, NodeId};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Persists an object version on a node, overwriting any previous one.
pub const ENDPOINT_STORE: &str = "/internal/store";
/// Fetches the object version a node holds, if any.
pub const ENDPOINT_RETRIEVE: &str = "/internal/retrieve";
/// Removes an object from a node.
pub const ENDPOINT_DELETE: &str = "/internal/delete";
/// Membership exchange between nodes.
pub const ENDPOINT_GOSSIP: &str = "/internal/gossip";
/// Health and membership snapshot of a node.
pub const ENDPOINT_CLUSTER_STATUS: &str = "/internal/status";

// --- Data Transfer Objects ---

/// Serde adapter carrying object bytes as one base64 string instead of a
/// JSON array of numbers.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Payload for writing one object version to a node.
///
/// The timestamp is assigned by the coordinator once per write and travels
/// unchanged to every replica, including read-repair writes. Nodes persist it
/// next to the bytes and never compare it themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub bucket: String,
    pub key: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub bucket: String,
    pub key: String,
}

/// The version a node holds for a key.
///
/// `found == false` carries empty data and a zero timestamp. Read-repair
/// relies on all three fields: a missing object and an older timestamp both
/// mark the replica as stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub found: bool,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub timestamp: i64,
}

impl RetrieveResponse {
    pub fn not_found() -> Self {
        Self {
            found: false,
            data: Vec::new(),
            timestamp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Membership exchange: the sender describes itself and what it knows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipMessage {
    pub from: Member,
    pub members: Vec<Member>,
}

/// Acknowledgment of a gossip message carrying the receiver's view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipResponse {
    pub ack: bool,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatusResponse {
    pub node_id: NodeId,
    pub members: Vec<Member>,
}
