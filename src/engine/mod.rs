//! Node Engine Module
//!
//! The per-node request state machine. Every query entering a node walks the
//! same phases: cache key, cache lookup, local evaluation, forward decision,
//! fan-out along the overlay, merge, cache store, finalize. The timing
//! ledger is stamped at each phase boundary and serialized into the
//! response.
//!
//! ## Submodules
//! - **`routing`**: The forwardable-verb set and the borough ownership table
//!   that directs `get_by_borough` to its single authoritative node.
//! - **`node`**: The engine itself: lifecycle, the query state machine, and
//!   data-message handling.

pub mod node;
pub mod routing;
