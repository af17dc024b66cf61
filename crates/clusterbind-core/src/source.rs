//! Request/record source boundary.
//!
//! [`BindingSource`] is everything the engine consumes from the external,
//! partially consistent store. Implementations report failures as
//! [`SourceError`]; the session layer turns those into empty results plus a
//! notice.
//!
//! [`SnapshotSource`] serves a snapshot document (YAML or JSON) from memory
//! and writes mutations back to the file it was opened from.

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::model::{Artifact, BindingRecord, BindingRequest, NewBindingRequest, ObjectKey};

/// External source of requests, records and artifacts.
#[allow(async_fn_in_trait)]
pub trait BindingSource: Send + Sync {
    async fn list_requests(&self) -> Result<Vec<BindingRequest>, SourceError>;

    async fn list_records(&self) -> Result<Vec<BindingRecord>, SourceError>;

    async fn list_namespaces(&self) -> Result<Vec<String>, SourceError>;

    /// Fetch an artifact. `Ok(None)` means it does not exist (yet).
    async fn fetch_artifact(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Artifact>, SourceError>;

    /// Returns `false` when the store declined (e.g. the key already exists).
    async fn create_request(&self, request: NewBindingRequest) -> Result<bool, SourceError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_request(&self, key: &ObjectKey) -> Result<bool, SourceError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_record(&self, key: &ObjectKey) -> Result<bool, SourceError>;
}

// =============================================================================
// Snapshot documents
// =============================================================================

/// On-disk encoding of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Yaml,
    Json,
}

impl SnapshotFormat {
    /// `.json` is JSON; everything else is treated as YAML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }

    fn malformed(self, err: impl std::fmt::Display) -> SourceError {
        SourceError::Document {
            format: self.as_str(),
            message: err.to_string(),
        }
    }
}

/// Parse a YAML or JSON document of any shape.
pub fn parse_document<T: DeserializeOwned>(
    text: &str,
    format: SnapshotFormat,
) -> Result<T, SourceError> {
    match format {
        SnapshotFormat::Json => serde_json::from_str(text).map_err(|e| format.malformed(e)),
        SnapshotFormat::Yaml => serde_yaml::from_str(text).map_err(|e| format.malformed(e)),
    }
}

/// Point-in-time view of the external store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub namespaces: Vec<String>,
    pub requests: Vec<BindingRequest>,
    pub records: Vec<BindingRecord>,
    pub artifacts: Vec<Artifact>,
}

impl Snapshot {
    pub fn parse(text: &str, format: SnapshotFormat) -> Result<Self, SourceError> {
        parse_document(text, format)
    }

    pub fn render(&self, format: SnapshotFormat) -> Result<String, SourceError> {
        match format {
            SnapshotFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| format.malformed(e))
            }
            SnapshotFormat::Yaml => serde_yaml::to_string(self).map_err(|e| format.malformed(e)),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SourceError> {
        load_document(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), SourceError> {
        let text = self
            .render(SnapshotFormat::from_path(path))
            .map_err(|e| snapshot_error(path, e))?;
        std::fs::write(path, text).map_err(|e| snapshot_error(path, e))
    }

    /// Declared namespaces, or the distinct namespaces in use when none are declared.
    #[must_use]
    pub fn effective_namespaces(&self) -> Vec<String> {
        if !self.namespaces.is_empty() {
            return self.namespaces.clone();
        }
        let mut namespaces: Vec<String> = self
            .requests
            .iter()
            .map(|r| r.namespace.clone())
            .chain(self.records.iter().map(|r| r.namespace.clone()))
            .collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }
}

/// Read a YAML or JSON document (by extension) from `path`.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let text = std::fs::read_to_string(path).map_err(|e| snapshot_error(path, e))?;
    parse_document(&text, SnapshotFormat::from_path(path)).map_err(|e| snapshot_error(path, e))
}

fn snapshot_error(path: &Path, err: impl std::fmt::Display) -> SourceError {
    SourceError::Snapshot {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

// =============================================================================
// SnapshotSource
// =============================================================================

/// In-process [`BindingSource`] over a [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotSource {
    state: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

impl SnapshotSource {
    /// Serve `snapshot` from memory only.
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            path: None,
        }
    }

    /// Serve the snapshot stored at `path`, persisting mutations back to it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let snapshot = Snapshot::load(&path)?;
        debug!(
            path = %path.display(),
            requests = snapshot.requests.len(),
            records = snapshot.records.len(),
            artifacts = snapshot.artifacts.len(),
            "Snapshot loaded"
        );
        Ok(Self {
            state: RwLock::new(snapshot),
            path: Some(path),
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), SourceError> {
        match &self.path {
            Some(path) => snapshot.save(path),
            None => Ok(()),
        }
    }

    /// Apply `mutate` and persist if it changed anything.
    ///
    /// The file write is synchronous and happens under the write lock, so
    /// concurrent mutations reach disk one at a time and the in-memory state
    /// never runs ahead of the file. Snapshots are small local files; a remote
    /// store belongs behind its own [`BindingSource`].
    fn mutate(&self, mutate: impl FnOnce(&mut Snapshot) -> bool) -> Result<bool, SourceError> {
        let mut guard = self.write();
        let mut next = guard.clone();
        if !mutate(&mut next) {
            return Ok(false);
        }
        self.persist(&next)?;
        *guard = next;
        Ok(true)
    }
}

impl BindingSource for SnapshotSource {
    async fn list_requests(&self) -> Result<Vec<BindingRequest>, SourceError> {
        Ok(self.read().requests.clone())
    }

    async fn list_records(&self) -> Result<Vec<BindingRecord>, SourceError> {
        Ok(self.read().records.clone())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.read().effective_namespaces())
    }

    async fn fetch_artifact(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Artifact>, SourceError> {
        Ok(self
            .read()
            .artifacts
            .iter()
            .find(|a| a.name == name && a.namespace == namespace)
            .cloned())
    }

    async fn create_request(&self, request: NewBindingRequest) -> Result<bool, SourceError> {
        let key = request.key();
        self.mutate(|snapshot| {
            if snapshot.requests.iter().any(|r| r.key() == key) {
                return false;
            }
            snapshot.requests.push(request.into_request(Utc::now()));
            true
        })
    }

    async fn delete_request(&self, key: &ObjectKey) -> Result<bool, SourceError> {
        self.mutate(|snapshot| {
            let before = snapshot.requests.len();
            snapshot.requests.retain(|r| &r.key() != key);
            snapshot.requests.len() != before
        })
    }

    async fn delete_record(&self, key: &ObjectKey) -> Result<bool, SourceError> {
        self.mutate(|snapshot| {
            let before = snapshot.records.len();
            snapshot.records.retain(|r| &r.key() != key);
            snapshot.records.len() != before
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
requests:
  - namespace: ns1
    name: req-a
    clusterIdentity: edge-1
    phase: Succeeded
    artifactRef:
      name: req-a-secret
records:
  - namespace: target
    name: rec1
    lastHeartbeatTime: "2026-01-01T00:00:00Z"
artifacts:
  - name: req-a-secret
    namespace: ns1
    data:
      binding-response: abc
"#;

    fn new_request(name: &str) -> NewBindingRequest {
        NewBindingRequest {
            name: name.to_string(),
            namespace: "ns1".to_string(),
            cluster_identity: "edge-2".to_string(),
            author: None,
            ttl_seconds: Some(600),
        }
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(SnapshotFormat::from_path(Path::new("a.json")), SnapshotFormat::Json);
        assert_eq!(SnapshotFormat::from_path(Path::new("a.JSON")), SnapshotFormat::Json);
        assert_eq!(SnapshotFormat::from_path(Path::new("a.yaml")), SnapshotFormat::Yaml);
        assert_eq!(SnapshotFormat::from_path(Path::new("a")), SnapshotFormat::Yaml);
    }

    #[test]
    fn parses_yaml_snapshot() {
        let snapshot = Snapshot::parse(YAML, SnapshotFormat::Yaml).unwrap();
        assert_eq!(snapshot.requests.len(), 1);
        assert!(snapshot.requests[0].is_succeeded());
        assert_eq!(snapshot.records[0].key().to_string(), "target/rec1");
        assert_eq!(snapshot.effective_namespaces(), vec!["ns1", "target"]);
    }

    #[test]
    fn blank_timestamp_keeps_the_rest_of_the_snapshot() {
        let yaml = r#"
requests:
  - namespace: ns1
    name: req-a
    phase: Succeeded
  - namespace: ns1
    name: req-b
    creationTimestamp: ""
    conditions:
      - type: Ready
        status: "True"
        lastTransitionTime: n/a
records:
  - namespace: target
    name: rec1
    creationTimestamp: "not a time"
"#;
        let snapshot = Snapshot::parse(yaml, SnapshotFormat::Yaml).unwrap();
        assert_eq!(snapshot.requests.len(), 2);
        assert!(snapshot.requests[1].creation_timestamp.is_none());
        assert!(snapshot.requests[1].conditions[0].last_transition_time.is_none());
        assert!(snapshot.requests[1].conditions[0].is_true());
        assert_eq!(snapshot.records.len(), 1);
    }

    #[test]
    fn malformed_document_is_source_error() {
        let err = Snapshot::parse("requests: [", SnapshotFormat::Yaml).unwrap_err();
        assert!(matches!(err, SourceError::Document { format: "yaml", .. }));

        let err = Snapshot::parse("{", SnapshotFormat::Json).unwrap_err();
        assert!(err.to_string().starts_with("Malformed json document"));
    }

    #[test]
    fn load_document_reports_path_of_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "not json").unwrap();

        let err = Snapshot::load(&path).unwrap_err();
        match err {
            SourceError::Snapshot { path: reported, message } => {
                assert_eq!(reported, path.display().to_string());
                assert!(message.contains("Malformed json document"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn render_then_parse_preserves_snapshot() {
        let snapshot = Snapshot::parse(YAML, SnapshotFormat::Yaml).unwrap();
        for format in [SnapshotFormat::Yaml, SnapshotFormat::Json] {
            let text = snapshot.render(format).unwrap();
            assert_eq!(Snapshot::parse(&text, format).unwrap(), snapshot);
        }
    }

    #[test]
    fn declared_namespaces_take_precedence() {
        let snapshot = Snapshot {
            namespaces: vec!["zeta".to_string()],
            ..Snapshot::parse(YAML, SnapshotFormat::Yaml).unwrap()
        };
        assert_eq!(snapshot.effective_namespaces(), vec!["zeta"]);
    }

    #[tokio::test]
    async fn fetch_artifact_by_name_and_namespace() {
        let source = SnapshotSource::new(Snapshot::parse(YAML, SnapshotFormat::Yaml).unwrap());
        assert!(source.fetch_artifact("req-a-secret", "ns1").await.unwrap().is_some());
        assert!(source.fetch_artifact("req-a-secret", "ns2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let source = SnapshotSource::new(Snapshot::default());
        assert!(source.create_request(new_request("req-b")).await.unwrap());
        assert!(!source.create_request(new_request("req-b")).await.unwrap());
        let requests = source.list_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].creation_timestamp.is_some());
        assert_eq!(requests[0].ttl_seconds, Some(600));
    }

    #[tokio::test]
    async fn delete_reports_absence() {
        let source = SnapshotSource::new(Snapshot::parse(YAML, SnapshotFormat::Yaml).unwrap());
        let record = ObjectKey::new("target", "rec1");
        assert!(source.delete_record(&record).await.unwrap());
        assert!(!source.delete_record(&record).await.unwrap());
        assert!(!source.delete_request(&ObjectKey::new("ns1", "missing")).await.unwrap());
    }

    #[tokio::test]
    async fn mutations_persist_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        Snapshot::parse(YAML, SnapshotFormat::Yaml)
            .unwrap()
            .save(&path)
            .unwrap();

        let source = SnapshotSource::open(&path).unwrap();
        assert!(source.delete_request(&ObjectKey::new("ns1", "req-a")).await.unwrap());

        let reloaded = Snapshot::load(&path).unwrap();
        assert!(reloaded.requests.is_empty());
        assert_eq!(reloaded.records.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_mutations_all_reach_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshot.yaml");
        Snapshot::default().save(&path).unwrap();
        let source = SnapshotSource::open(&path).unwrap();

        let (a, b, c) = tokio::join!(
            source.create_request(new_request("req-a")),
            source.create_request(new_request("req-b")),
            source.create_request(new_request("req-c")),
        );
        assert!(a.unwrap() && b.unwrap() && c.unwrap());

        let on_disk = Snapshot::load(&path).unwrap();
        assert_eq!(on_disk, source.snapshot());
        assert_eq!(on_disk.requests.len(), 3);
    }

    #[test]
    fn open_missing_file_is_snapshot_error() {
        let err = SnapshotSource::open("/nonexistent/clusterbind/snapshot.yaml").unwrap_err();
        assert!(matches!(err, SourceError::Snapshot { .. }));
    }
}
