//! Storage Node Module
//!
//! Everything a single storage-node process runs: the local object store,
//! the RPC-facing service, and the HTTP routes that expose it to
//! coordinators.
//!
//! ## Submodules
//! - **`store`**: bytes on local disk at `<data-dir>/<bucket>/<key>` plus the
//!   per-object write timestamp.
//! - **`service`**: Store / Retrieve / Delete / Gossip / GetClusterStatus logic.
//! - **`handlers`**: Axum handlers and the node router.

pub mod handlers;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;
