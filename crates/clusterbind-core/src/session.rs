//! A binding session: the collections, the correlation cache and the
//! resolver, owned together.
//!
//! Everything here is scoped to one session. Dropping the session (a full
//! reload) is the only way the cache is cleared.
//!
//! Source failures never escape a session. A failed listing becomes an empty
//! collection plus an error notice; a failed mutation returns `false` plus an
//! error notice.

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CorrelationCache;
use crate::config::ResolverConfig;
use crate::decoder::{self, DecodedArtifact};
use crate::error::SourceError;
use crate::matcher::{MatchTier, match_record};
use crate::model::{BindingRecord, BindingRequest, NewBindingRequest, ObjectKey, Phase};
use crate::notify::{Notice, Notifier};
use crate::projector::HealthProjection;
use crate::resolver::{CorrelationResolver, ResolveReport};
use crate::source::BindingSource;

/// Outcome of [`BindingSession::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub requests: usize,
    pub records: usize,
    pub resolve: ResolveReport,
}

/// Whether a request is linked to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    Linked {
        record: ObjectKey,
        tier: MatchTier,
        health: HealthProjection,
    },
    NotLinked,
}

impl LinkState {
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        matches!(self, Self::Linked { .. })
    }
}

/// One displayable request with everything derived for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingRow {
    pub request: ObjectKey,
    pub cluster_identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub phase: Option<Phase>,
    pub health: HealthProjection,
    pub resolved_namespace: Option<String>,
    pub link: LinkState,
}

/// Row counts by link state and phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowSummary {
    pub total: usize,
    pub linked: usize,
    pub linked_by_resolved_namespace: usize,
    pub linked_by_same_namespace: usize,
    pub not_linked: usize,
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub phase_unset: usize,
}

impl RowSummary {
    /// Counts over exactly `rows`, so a filtered listing gets a matching footer.
    #[must_use]
    pub fn of(rows: &[BindingRow]) -> Self {
        let mut summary = Self::default();
        for row in rows {
            summary.total += 1;
            match &row.link {
                LinkState::Linked { tier, .. } => {
                    summary.linked += 1;
                    match tier {
                        MatchTier::ResolvedNamespace => summary.linked_by_resolved_namespace += 1,
                        MatchTier::SameNamespace => summary.linked_by_same_namespace += 1,
                    }
                }
                LinkState::NotLinked => summary.not_linked += 1,
            }
            match row.phase {
                Some(Phase::Pending) => summary.pending += 1,
                Some(Phase::Succeeded) => summary.succeeded += 1,
                Some(Phase::Failed) => summary.failed += 1,
                None => summary.phase_unset += 1,
            }
        }
        summary
    }
}

pub struct BindingSession<S, N> {
    source: S,
    notifier: N,
    requests: Vec<BindingRequest>,
    records: Vec<BindingRecord>,
    namespaces: Vec<String>,
    cache: CorrelationCache,
    resolver: CorrelationResolver,
}

impl<S: BindingSource, N: Notifier> BindingSession<S, N> {
    pub fn new(source: S, notifier: N, config: ResolverConfig) -> Self {
        Self {
            source,
            notifier,
            requests: Vec::new(),
            records: Vec::new(),
            namespaces: Vec::new(),
            cache: CorrelationCache::new(),
            resolver: CorrelationResolver::new(config),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn cache(&self) -> &CorrelationCache {
        &self.cache
    }

    pub fn requests(&self) -> &[BindingRequest] {
        &self.requests
    }

    pub fn records(&self) -> &[BindingRecord] {
        &self.records
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Reload requests and records, then run a resolution pass.
    pub async fn refresh(&mut self) -> RefreshSummary {
        let (requests, records) =
            futures::join!(self.source.list_requests(), self.source.list_records());
        self.requests = self.settle_listing("binding requests", requests);
        self.records = self.settle_listing("binding records", records);

        let resolve = self.resolve().await;
        debug!(
            requests = self.requests.len(),
            records = self.records.len(),
            cached = self.cache.len(),
            "Session refreshed"
        );
        RefreshSummary {
            requests: self.requests.len(),
            records: self.records.len(),
            resolve,
        }
    }

    pub async fn load_namespaces(&mut self) -> &[String] {
        let namespaces = self.source.list_namespaces().await;
        self.namespaces = self.settle_listing("namespaces", namespaces);
        &self.namespaces
    }

    /// Resolution pass over the current requests. Safe to call repeatedly.
    pub async fn resolve(&self) -> ResolveReport {
        self.resolver
            .resolve(&self.source, &self.cache, &self.requests)
            .await
    }

    fn settle_listing<T>(&self, what: &str, result: Result<Vec<T>, SourceError>) -> Vec<T> {
        result.unwrap_or_else(|err| {
            warn!(error = %err, "Failed to load {what}");
            self.notifier
                .notify(Notice::error(format!("Failed to load {what}: {err}")));
            Vec::new()
        })
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// One row per request, optionally limited to requests in `namespace`.
    pub fn rows(&self, namespace: Option<&str>) -> Vec<BindingRow> {
        self.requests
            .iter()
            .filter(|r| namespace.is_none_or(|ns| r.namespace == ns))
            .map(|request| self.row(request))
            .collect()
    }

    fn row(&self, request: &BindingRequest) -> BindingRow {
        let link = match match_record(request, &self.cache, &self.records) {
            Some(found) => LinkState::Linked {
                record: found.record.key(),
                tier: found.tier,
                health: found.record.health(),
            },
            None => LinkState::NotLinked,
        };
        BindingRow {
            request: request.key(),
            cluster_identity: request.cluster_identity.clone(),
            author: request.author.clone(),
            phase: request.phase,
            health: request.health(),
            resolved_namespace: self.cache.get(&request.key()),
            link,
        }
    }

    pub fn summary(&self) -> RowSummary {
        RowSummary::of(&self.rows(None))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn create_request(&mut self, request: NewBindingRequest) -> bool {
        let key = request.key();
        let outcome = self.source.create_request(request).await;
        self.settle_mutation(
            outcome,
            format!("Created binding request {key}"),
            format!("Binding request {key} already exists"),
            format!("Failed to create binding request {key}"),
        )
        .await
    }

    pub async fn delete_request(&mut self, key: &ObjectKey) -> bool {
        let outcome = self.source.delete_request(key).await;
        self.settle_mutation(
            outcome,
            format!("Deleted binding request {key}"),
            format!("Binding request {key} not found"),
            format!("Failed to delete binding request {key}"),
        )
        .await
    }

    pub async fn delete_record(&mut self, key: &ObjectKey) -> bool {
        let outcome = self.source.delete_record(key).await;
        self.settle_mutation(
            outcome,
            format!("Deleted binding record {key}"),
            format!("Binding record {key} not found"),
            format!("Failed to delete binding record {key}"),
        )
        .await
    }

    async fn settle_mutation(
        &mut self,
        outcome: Result<bool, SourceError>,
        done: String,
        declined: String,
        failed: String,
    ) -> bool {
        match outcome {
            Ok(true) => {
                self.notifier.notify(Notice::success(done));
                self.refresh().await;
                true
            }
            Ok(false) => {
                self.notifier.notify(Notice::warning(declined));
                false
            }
            Err(err) => {
                warn!(error = %err, "{failed}");
                self.notifier.notify(Notice::error(format!("{failed}: {err}")));
                false
            }
        }
    }

    // =========================================================================
    // Artifact export
    // =========================================================================

    /// Fetch and decode the artifact of the request `key`.
    pub async fn artifact_for(&self, key: &ObjectKey) -> Option<DecodedArtifact> {
        let Some(request) = self.requests.iter().find(|r| &r.key() == key) else {
            self.notifier
                .notify(Notice::warning(format!("Binding request {key} not found")));
            return None;
        };
        let Some(artifact_ref) = request.artifact_ref.as_ref() else {
            self.notifier.notify(Notice::warning(format!(
                "Binding request {key} has no credential artifact yet"
            )));
            return None;
        };

        let artifact = match self
            .resolver
            .fetch(&self.source, &artifact_ref.name, &request.namespace)
            .await
        {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                self.notifier.notify(Notice::warning(format!(
                    "Artifact {} not found in {}",
                    artifact_ref.name, request.namespace
                )));
                return None;
            }
            Err(err) => {
                warn!(request = %key, artifact = %artifact_ref.name, error = %err, "Artifact fetch failed");
                self.notifier.notify(Notice::error(format!(
                    "Failed to fetch artifact {}: {err}",
                    artifact_ref.name
                )));
                return None;
            }
        };

        let requested_key = artifact_ref
            .key
            .as_deref()
            .unwrap_or(&self.resolver.config().default_artifact_key);
        match decoder::decode(&artifact, requested_key) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                self.notifier.notify(Notice::warning(format!(
                    "Artifact {}: {err}",
                    artifact_ref.name
                )));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactRef, Condition, ConditionStatus};
    use crate::notify::{CollectingNotifier, NoticeLevel};
    use crate::source::{Snapshot, SnapshotSource};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use indexmap::IndexMap;

    fn wrapped(namespace: &str) -> String {
        let inner = format!("contexts:\n- context:\n    namespace: {namespace}\n");
        let document = serde_json::json!({ "kubeconfig": STANDARD.encode(inner) });
        STANDARD.encode(document.to_string())
    }

    fn request(namespace: &str, name: &str, phase: Option<Phase>, artifact: Option<&str>) -> BindingRequest {
        BindingRequest {
            namespace: namespace.to_string(),
            name: name.to_string(),
            creation_timestamp: None,
            cluster_identity: format!("{name}-cluster"),
            author: None,
            ttl_seconds: None,
            artifact_ref: artifact.map(|a| ArtifactRef {
                name: a.to_string(),
                key: None,
            }),
            phase,
            conditions: Vec::new(),
        }
    }

    fn record(namespace: &str, name: &str, ready: bool) -> BindingRecord {
        BindingRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            creation_timestamp: None,
            last_heartbeat_time: None,
            heartbeat_interval_seconds: None,
            consumer_secret_ref: None,
            conditions: vec![Condition::new(
                "Ready",
                if ready {
                    ConditionStatus::True
                } else {
                    ConditionStatus::False
                },
            )],
        }
    }

    fn artifact(namespace: &str, name: &str, value: &str) -> crate::model::Artifact {
        let mut data = IndexMap::new();
        data.insert("binding-response".to_string(), value.to_string());
        crate::model::Artifact {
            name: name.to_string(),
            namespace: namespace.to_string(),
            data: Some(data),
        }
    }

    fn session() -> BindingSession<SnapshotSource, CollectingNotifier> {
        let snapshot = Snapshot {
            namespaces: Vec::new(),
            requests: vec![
                request("ns1", "req-a", Some(Phase::Succeeded), Some("req-a-secret")),
                request("ns1", "req-b", Some(Phase::Pending), None),
                request("ns2", "req-c", None, None),
            ],
            records: vec![record("target", "rec1", true), record("ns1", "rec-local", false)],
            artifacts: vec![artifact("ns1", "req-a-secret", &wrapped("target"))],
        };
        BindingSession::new(
            SnapshotSource::new(snapshot),
            CollectingNotifier::new(),
            ResolverConfig::default(),
        )
    }

    #[tokio::test]
    async fn refresh_loads_and_resolves() {
        let mut session = session();
        let summary = session.refresh().await;

        assert_eq!(summary.requests, 3);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.resolve.resolved, 1);
        assert_eq!(
            session.cache().get(&ObjectKey::new("ns1", "req-a")).as_deref(),
            Some("target")
        );
        assert!(session.notifier().notices().is_empty());
    }

    #[tokio::test]
    async fn rows_link_through_resolved_namespace() {
        let mut session = session();
        session.refresh().await;
        let rows = session.rows(None);

        let a = &rows[0];
        assert_eq!(a.resolved_namespace.as_deref(), Some("target"));
        match &a.link {
            LinkState::Linked { record, tier, health } => {
                assert_eq!(record.name, "rec1");
                assert_eq!(*tier, MatchTier::ResolvedNamespace);
                assert_eq!(health.label, "Ready");
            }
            LinkState::NotLinked => panic!("req-a should be linked"),
        }

        // Unresolved request in ns1 falls back to the local record.
        match &rows[1].link {
            LinkState::Linked { record, tier, health } => {
                assert_eq!(record.name, "rec-local");
                assert_eq!(*tier, MatchTier::SameNamespace);
                assert_eq!(health.label, "Not Ready");
            }
            LinkState::NotLinked => panic!("req-b should fall back"),
        }
        assert_eq!(rows[2].link, LinkState::NotLinked);
        assert_eq!(rows[2].health.label, "Unknown");
    }

    #[tokio::test]
    async fn rows_filter_by_namespace() {
        let mut session = session();
        session.refresh().await;
        assert_eq!(session.rows(Some("ns2")).len(), 1);
        assert!(session.rows(Some("nowhere")).is_empty());
    }

    #[tokio::test]
    async fn summary_counts_links_and_phases() {
        let mut session = session();
        session.refresh().await;
        let summary = session.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.linked, 2);
        assert_eq!(summary.linked_by_resolved_namespace, 1);
        assert_eq!(summary.linked_by_same_namespace, 1);
        assert_eq!(summary.not_linked, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.phase_unset, 1);
    }

    #[tokio::test]
    async fn summary_of_filtered_rows_counts_only_those_rows() {
        let mut session = session();
        session.refresh().await;

        let ns2 = RowSummary::of(&session.rows(Some("ns2")));
        assert_eq!(ns2.total, 1);
        assert_eq!(ns2.linked, 0);
        assert_eq!(ns2.not_linked, 1);
        assert_eq!(ns2.phase_unset, 1);

        let ns1 = RowSummary::of(&session.rows(Some("ns1")));
        assert_eq!(ns1.total, 2);
        assert_eq!(ns1.linked, 2);
        assert_eq!(RowSummary::of(&[]), RowSummary::default());
    }

    #[tokio::test]
    async fn mutations_notify_and_refresh() {
        let mut session = session();
        session.refresh().await;

        let created = session
            .create_request(NewBindingRequest {
                name: "req-d".to_string(),
                namespace: "ns3".to_string(),
                cluster_identity: "edge-9".to_string(),
                author: None,
                ttl_seconds: None,
            })
            .await;
        assert!(created);
        assert_eq!(session.requests().len(), 4);

        assert!(!session.delete_record(&ObjectKey::new("ns9", "ghost")).await);
        assert!(session.delete_record(&ObjectKey::new("target", "rec1")).await);
        assert_eq!(session.records().len(), 1);

        let levels: Vec<NoticeLevel> = session
            .notifier()
            .drain()
            .into_iter()
            .map(|n| n.level)
            .collect();
        assert_eq!(
            levels,
            vec![NoticeLevel::Success, NoticeLevel::Warning, NoticeLevel::Success]
        );
    }

    #[tokio::test]
    async fn namespaces_fall_back_to_those_in_use() {
        let mut session = session();
        session.refresh().await;
        let namespaces = session.load_namespaces().await.to_vec();
        assert_eq!(namespaces, vec!["ns1", "ns2", "target"]);
    }

    #[tokio::test]
    async fn artifact_for_decodes_on_demand() {
        let mut session = session();
        session.refresh().await;

        let decoded = session
            .artifact_for(&ObjectKey::new("ns1", "req-a"))
            .await
            .unwrap();
        assert_eq!(decoded.namespace.as_deref(), Some("target"));
        assert!(decoded.embedded.unwrap().contains("namespace: target"));

        assert!(session.artifact_for(&ObjectKey::new("ns1", "req-b")).await.is_none());
        assert!(session.artifact_for(&ObjectKey::new("ns1", "ghost")).await.is_none());
        let notices = session.notifier().drain();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.level == NoticeLevel::Warning));
    }
}
