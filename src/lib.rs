//! Replicated Object Storage Library
//!
//! This library crate defines the modules of a replicated object store. It
//! serves as the foundation for the storage node binary (`main.rs`) and for
//! any service that embeds the replication coordinator.
//!
//! ## Architecture Modules
//! - **`storage`**: The replication layer. A consistent hash ring places every
//!   object on N nodes; the coordinator writes with a majority quorum, reads
//!   with last-write-wins and repairs stale replicas in the background.
//! - **`node`**: The storage node. Persists object bytes and write timestamps
//!   on local disk and serves them over the internal HTTP protocol.
//! - **`membership`**: The member table each node keeps, fed by gossip
//!   announcements and exposed through the cluster status endpoint.
//! - **`config`**: Command-line configuration of a storage node.

pub mod config;
pub mod membership;
pub mod node;
pub mod storage;
