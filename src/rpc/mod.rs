//! Transport Adapter Module
//!
//! Hides the wire from the rest of the system. The overlay speaks HTTP/JSON:
//! a unary query call, a unary fire-and-forget data send, and a chunked
//! result stream. Everything above this module treats the transport as an
//! opaque request/response channel.
//!
//! ## Submodules
//! - **`protocol`**: Endpoint constants and the DTOs crossing the wire,
//!   including the typed value `oneof` an entry is reduced to.
//! - **`client`**: The outbound stub: query/send/stream plus a best-effort
//!   connectivity probe used as a fan-out pre-filter.
//! - **`server`**: The inbound server. Each request is dispatched on its own
//!   task, so a handler blocking on downstream queries never starves other
//!   inbound calls. Handlers are attached after construction to break the
//!   engine/transport cycle.

pub mod client;
pub mod protocol;
pub mod server;
