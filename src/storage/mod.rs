//! Replicated Object Storage Module
//!
//! Implements the coordinator side of a replicated object store.
//!
//! ## Core Concepts
//! - **Placement**: `ConsistentHashRing` maps `bucket/key` to N distinct nodes
//!   through virtual tokens on a 64-bit ring.
//! - **Replication**: `Coordinator` fans Store out to every replica and
//!   requires a write quorum of `N/2 + 1` acknowledgments.
//! - **Reconciliation**: reads pick the highest timestamp (last-write-wins);
//!   stale replicas are brought up to date by `ReadRepairer` in the background.
//! - **Transport**: `StorageNodeClient` abstracts node RPCs; `HttpNodeClient`
//!   speaks the JSON protocol in `protocol`.

pub mod client;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod repair;
pub mod ring;
