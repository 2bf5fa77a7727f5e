//! Query Timing Module
//!
//! Per-query, per-node phase timing. Each node stamps the phases of its own
//! request state machine, appends the serialized ledgers of its downstream
//! peers verbatim, and ships the combined block in the response so the
//! portal can print an end-to-end latency breakdown hop by hop.

pub mod ledger;

#[cfg(test)]
mod tests;
