//! Membership View
//!
//! The cluster membership input consumed by the storage layer: node
//! identities, their RPC endpoints and their lifecycle state.
//!
//! ## Core Concepts
//! - **Member table**: a concurrent map of known nodes, fed by the gossip hook
//!   of the storage-node RPC surface and read by the cluster-status query.
//! - **Incarnation Numbers**: resolve conflicting reports about the same node.
//!
//! Failure detection and gossip dissemination are external to this crate.

pub mod table;
pub mod types;
