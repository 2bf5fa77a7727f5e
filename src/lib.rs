//! Crash-Record Overlay Cluster Library
//!
//! This library crate defines the core modules of the distributed query
//! overlay. It serves as the foundation for the node binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems, listed here in
//! dependency order:
//!
//! - **`config`**: Typed loading of the overlay topology (node endpoints and
//!   static forwarding edges) from a JSON file.
//! - **`store`**: The in-memory, read-mostly row store owning each node's
//!   subset of crash records, and the query evaluator over it.
//! - **`cache`**: A named, TTL-bounded result cache backed by a shared
//!   memory-mapped region so co-located nodes can short-circuit repeated
//!   queries without any cross-node invalidation.
//! - **`timing`**: The per-query phase stopwatch whose serialized ledger
//!   rides along in every response, letting the portal assemble an
//!   end-to-end latency breakdown.
//! - **`rpc`**: The transport adapter: an HTTP wire protocol, an outbound
//!   stub with connectivity probing, and an inbound server with pluggable
//!   handlers.
//! - **`engine`**: The per-node request state machine: cache lookup, local
//!   evaluation, bounded fan-out along the overlay, merge, and response
//!   assembly.
//! - **`relay`**: The portal's asynchronous data-message relay, decoupling
//!   out-of-band sends from the RPC tasks.

pub mod cache;
pub mod config;
pub mod engine;
pub mod relay;
pub mod rpc;
pub mod store;
pub mod timing;
