//! Links a binding request to the binding record it produced.
//!
//! Tiers, in order:
//!
//! 1. The request has a cached namespace: the first record in that namespace.
//!    When the cached namespace holds no record the request is not linked;
//!    a record elsewhere is not assumed to be the right one.
//! 2. No cached namespace: the first record in the request's own namespace.
//!
//! Record names are never compared. A record is produced under a controller
//! generated name, so only its namespace says which request it belongs to.

use serde::Serialize;

use crate::cache::CorrelationCache;
use crate::model::{BindingRecord, BindingRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Matched through the namespace recovered from the request's artifact.
    ResolvedNamespace,
    /// Matched on the request's own namespace.
    SameNamespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingMatch<'a> {
    pub record: &'a BindingRecord,
    pub tier: MatchTier,
}

/// Find the record linked to `request`, if any.
#[must_use]
pub fn match_record<'a>(
    request: &BindingRequest,
    cache: &CorrelationCache,
    records: &'a [BindingRecord],
) -> Option<BindingMatch<'a>> {
    let (namespace, tier) = match cache.get(&request.key()) {
        Some(resolved) => (resolved, MatchTier::ResolvedNamespace),
        None => (request.namespace.clone(), MatchTier::SameNamespace),
    };
    records
        .iter()
        .find(|record| record.namespace == namespace)
        .map(|record| BindingMatch { record, tier })
}
