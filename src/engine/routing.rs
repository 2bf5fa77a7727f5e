//! Forwarding and borough-routing policy.
//!
//! Two separate mechanisms decide where a query travels:
//!
//! 1. The *fan-out set*: verbs that every node replicates to all of its
//!    connected peers, because any node may own matching rows.
//! 2. The *borough table*: `get_by_borough` is never fanned out. Borough
//!    ownership is disjoint across the overlay, so the query is directed at
//!    the single authoritative node and everyone else contributes an empty
//!    success.

/// Verbs forwarded to every connected peer, besides `get_all`.
pub const FORWARDABLE_VERBS: &[&str] = &[
    "get_by_street",
    "get_by_key",
    "get_by_prefix",
    "get_by_date_range",
    "get_crashes_with_injuries",
    "get_crashes_with_fatalities",
    "get_by_time",
];

/// Whether a verb participates in the general fan-out. `get_by_borough` is
/// deliberately absent; unknown verbs are never forwarded.
pub fn should_fan_out(verb: &str) -> bool {
    verb == "get_all" || FORWARDABLE_VERBS.contains(&verb)
}

/// The portal accepts external queries and owns no borough.
pub const PORTAL_NODE: &str = "A";

pub fn is_portal(node_id: &str) -> bool {
    node_id == PORTAL_NODE
}

/// The node authoritative for a borough: the three named boroughs each have
/// a dedicated owner, and E is the catch-all for everything else (Staten
/// Island, unspecified, and misspelled boroughs alike).
pub fn borough_owner(borough: &str) -> &'static str {
    match borough.to_uppercase().as_str() {
        "BROOKLYN" => "B",
        "QUEENS" => "C",
        "BRONX" => "D",
        _ => "E",
    }
}

pub fn owns_borough(node_id: &str, borough: &str) -> bool {
    borough_owner(borough) == node_id
}

/// Where one node sends a query next.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardPlan {
    /// Replicate to every connected peer.
    FanOut,
    /// Send to exactly this peer (borough routing).
    Direct(String),
    /// Keep it local.
    None,
}

/// The forwarding decision for a query at `node_id`.
///
/// For `get_by_borough`: the owner answers and stops; the portal, owning
/// nothing, relays to its peers; any other non-owner relays only when the
/// owner is one of its direct peers, otherwise the query dead-ends with an
/// empty local contribution.
pub fn plan(node_id: &str, verb: &str, params: &[String], peer_ids: &[String]) -> ForwardPlan {
    if verb == "get_by_borough" {
        let Some(borough) = params.first() else {
            return ForwardPlan::None;
        };
        let owner = borough_owner(borough);
        if owner == node_id {
            return ForwardPlan::None;
        }
        if is_portal(node_id) {
            return ForwardPlan::FanOut;
        }
        if peer_ids.iter().any(|peer| peer == owner) {
            return ForwardPlan::Direct(owner.to_string());
        }
        return ForwardPlan::None;
    }

    if should_fan_out(verb) {
        ForwardPlan::FanOut
    } else {
        ForwardPlan::None
    }
}
