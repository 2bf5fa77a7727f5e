//! Result Cache Module
//!
//! A named, TTL-bounded key→bytes map used to memoize serialized query
//! results. The backing store is a memory-mapped file so node instances
//! co-located on one host can share hits; when the region cannot be created
//! the cache degrades to an in-process buffer with identical semantics and
//! callers cannot tell the difference.
//!
//! There is no active eviction: entries expire lazily on read, and the only
//! enforced bound is the region's byte capacity. There is deliberately no
//! cross-node invalidation of any kind.
//!
//! ## Submodules
//! - **`region`**: The named byte region (mmap + advisory file lock, heap
//!   fallback) that holds the serialized cache image.
//! - **`store`**: The cache proper: freshness, image encode/decode, the four
//!   mutually exclusive operations.
//! - **`codec`**: The two textual encodings a `QueryResult` takes inside a
//!   cache payload (line form everywhere, header-prefixed form at the
//!   portal).

pub mod codec;
pub mod region;
pub mod store;
