//! Correlation resolution passes.
//!
//! A pass looks at every request that has succeeded, names an artifact and is
//! not yet cached, fetches those artifacts concurrently and records each
//! recovered namespace in the [`CorrelationCache`]. Candidates are isolated:
//! one failing fetch or decode never affects the others, and nothing about a
//! failure is remembered, so the next pass simply tries again.
//!
//! Keys already being fetched by an overlapping pass are skipped.

use std::collections::HashSet;
use std::sync::Mutex;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CorrelationCache;
use crate::config::ResolverConfig;
use crate::decoder::{self, DecodeIssue, Resolution};
use crate::error::SourceError;
use crate::model::{Artifact, ArtifactRef, BindingRequest, ObjectKey};
use crate::source::BindingSource;

/// Counts for one resolution pass.
///
/// `resolved + unresolved + missing + failed + skipped_in_flight` always
/// equals `candidates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    /// Succeeded requests with an artifact reference and no cache entry.
    pub candidates: usize,
    pub resolved: usize,
    /// Artifact decoded but no namespace found.
    pub unresolved: usize,
    /// Artifact not present in the source yet.
    pub missing: usize,
    /// Fetch error, timeout or hard decode error.
    pub failed: usize,
    /// Eligible requests already in the cache.
    pub skipped_cached: usize,
    pub skipped_in_flight: usize,
}

impl ResolveReport {
    /// Number of artifact fetches this pass performed.
    #[must_use]
    pub const fn fetched(&self) -> usize {
        self.resolved + self.unresolved + self.missing + self.failed
    }

    fn record(&mut self, outcome: &CandidateOutcome) {
        match outcome {
            CandidateOutcome::Resolved(_) => self.resolved += 1,
            CandidateOutcome::Unresolved(_) => self.unresolved += 1,
            CandidateOutcome::Missing => self.missing += 1,
            CandidateOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// What happened to a single fetched candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Resolved(String),
    Unresolved(DecodeIssue),
    Missing,
    Failed(String),
}

/// Removes its key from the in-flight set when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<ObjectKey>>,
    key: ObjectKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        match self.in_flight.lock() {
            Ok(mut guard) => guard.remove(&self.key),
            Err(poisoned) => poisoned.into_inner().remove(&self.key),
        };
    }
}

#[derive(Debug, Default)]
pub struct CorrelationResolver {
    config: ResolverConfig,
    in_flight: Mutex<HashSet<ObjectKey>>,
}

impl CorrelationResolver {
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Number of keys currently being fetched.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        match self.in_flight.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Requests a pass would fetch right now.
    #[must_use]
    pub fn candidates<'a>(
        requests: &'a [BindingRequest],
        cache: &CorrelationCache,
    ) -> Vec<&'a BindingRequest> {
        requests
            .iter()
            .filter(|r| r.is_succeeded() && r.artifact_ref.is_some() && !cache.has(&r.key()))
            .collect()
    }

    fn claim(&self, key: &ObjectKey) -> Option<InFlightGuard<'_>> {
        let inserted = match self.in_flight.lock() {
            Ok(mut guard) => guard.insert(key.clone()),
            Err(poisoned) => poisoned.into_inner().insert(key.clone()),
        };
        inserted.then(|| InFlightGuard {
            in_flight: &self.in_flight,
            key: key.clone(),
        })
    }

    /// Run one resolution pass over `requests`.
    pub async fn resolve<S: BindingSource>(
        &self,
        source: &S,
        cache: &CorrelationCache,
        requests: &[BindingRequest],
    ) -> ResolveReport {
        let mut report = ResolveReport::default();
        let mut pending = Vec::new();

        for request in requests {
            let Some(artifact_ref) = request.artifact_ref.as_ref() else {
                continue;
            };
            if !request.is_succeeded() {
                continue;
            }
            let key = request.key();
            if cache.has(&key) {
                report.skipped_cached += 1;
                continue;
            }
            report.candidates += 1;
            let Some(guard) = self.claim(&key) else {
                debug!(request = %key, "Resolution already in flight; skipping");
                report.skipped_in_flight += 1;
                continue;
            };
            pending.push(self.resolve_one(source, cache, request, artifact_ref, guard));
        }

        for outcome in join_all(pending).await {
            report.record(&outcome);
        }

        debug!(
            candidates = report.candidates,
            resolved = report.resolved,
            unresolved = report.unresolved,
            missing = report.missing,
            failed = report.failed,
            skipped_cached = report.skipped_cached,
            skipped_in_flight = report.skipped_in_flight,
            "Resolution pass complete"
        );
        report
    }

    async fn resolve_one<S: BindingSource>(
        &self,
        source: &S,
        cache: &CorrelationCache,
        request: &BindingRequest,
        artifact_ref: &ArtifactRef,
        _guard: InFlightGuard<'_>,
    ) -> CandidateOutcome {
        let key = request.key();
        // The artifact lives next to the request that produced it.
        let artifact = match self
            .fetch(source, &artifact_ref.name, &request.namespace)
            .await
        {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                debug!(request = %key, artifact = %artifact_ref.name, "Artifact not available yet");
                return CandidateOutcome::Missing;
            }
            Err(err) => {
                warn!(request = %key, artifact = %artifact_ref.name, error = %err, "Artifact fetch failed");
                return CandidateOutcome::Failed(err.to_string());
            }
        };

        let requested_key = artifact_ref
            .key
            .as_deref()
            .unwrap_or(&self.config.default_artifact_key);
        let decoded = match decoder::decode(&artifact, requested_key) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(request = %key, artifact = %artifact_ref.name, error = %err, "Artifact decode failed");
                return CandidateOutcome::Failed(err.to_string());
            }
        };

        match decoded.resolution() {
            Resolution::Resolved(namespace) => {
                cache.put(key.clone(), namespace);
                info!(
                    request = %key,
                    artifact = %artifact_ref.name,
                    namespace = %namespace,
                    "Correlation resolved"
                );
                CandidateOutcome::Resolved(namespace.to_string())
            }
            Resolution::Unresolved(issue) => {
                debug!(request = %key, artifact = %artifact_ref.name, ?issue, "Artifact carries no namespace");
                CandidateOutcome::Unresolved(issue)
            }
        }
    }

    pub(crate) async fn fetch<S: BindingSource>(
        &self,
        source: &S,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Artifact>, SourceError> {
        let fetch = source.fetch_artifact(name, namespace);
        match self.config.fetch_timeout() {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or_else(|_| {
                    Err(SourceError::Timeout {
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
            None => fetch.await,
        }
    }
}
