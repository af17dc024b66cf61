//! Artifact decoding: recover the namespace a binding record lives in.
//!
//! A credential artifact holds base64 values. The selected value decodes to a
//! JSON document whose `kubeconfig` field is itself base64 text; that inner
//! document mentions the target namespace as free text (`namespace: <ns>`).
//!
//! Decoding is layered and best-effort. Only an artifact without data is a
//! hard error; every other defect yields a [`DecodedArtifact`] whose
//! `content` is the best text available and whose `namespace` is `None`.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;
use serde::Serialize;

pub use crate::error::DecodeError;
use crate::model::Artifact;

/// Key used when an artifact reference does not name one.
pub const DEFAULT_ARTIFACT_KEY: &str = "binding-response";

/// JSON field of the outer document that carries the nested document.
pub const EMBEDDED_DOCUMENT_FIELD: &str = "kubeconfig";

/// Accepts padded and unpadded input; sources are inconsistent about it.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static NAMESPACE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"namespace:\s*(\S+)").unwrap());

/// Why a decoded artifact did not yield a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeIssue {
    /// The outer text is not JSON or lacks the embedded document field.
    NoEmbeddedDocument,
    /// The embedded document has no `namespace:` token.
    NoNamespaceToken,
}

/// Result of a decode that found data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedArtifact {
    /// Key whose value was decoded.
    pub key: String,
    /// True when the requested key was absent and the first key was used.
    pub fell_back: bool,
    /// Outer decoded text (or the raw value when it was not base64).
    pub content: String,
    /// Decoded embedded document, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded: Option<String>,
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<DecodeIssue>,
}

/// Whether a decoded artifact resolved to a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved(&'a str),
    Unresolved(DecodeIssue),
}

impl DecodedArtifact {
    #[must_use]
    pub fn resolution(&self) -> Resolution<'_> {
        match (&self.namespace, self.issue) {
            (Some(namespace), _) => Resolution::Resolved(namespace),
            (None, Some(issue)) => Resolution::Unresolved(issue),
            (None, None) => Resolution::Unresolved(DecodeIssue::NoNamespaceToken),
        }
    }
}

/// Decode `artifact`, preferring the value stored under `requested_key`.
pub fn decode(artifact: &Artifact, requested_key: &str) -> Result<DecodedArtifact, DecodeError> {
    let data = artifact
        .data
        .as_ref()
        .filter(|data| !data.is_empty())
        .ok_or(DecodeError::NoData)?;

    let (key, raw, fell_back) = match data.get_key_value(requested_key) {
        Some((key, raw)) => (key, raw, false),
        None => {
            let (key, raw) = data.first().ok_or(DecodeError::KeyNotFound)?;
            (key, raw, true)
        }
    };

    let content = decode_base64_lossy(raw);
    let embedded = embedded_document(&content).map(|blob| decode_base64_lossy(&blob));
    let namespace = embedded.as_deref().and_then(extract_namespace);
    let issue = match (&embedded, &namespace) {
        (None, _) => Some(DecodeIssue::NoEmbeddedDocument),
        (Some(_), None) => Some(DecodeIssue::NoNamespaceToken),
        (Some(_), Some(_)) => None,
    };

    Ok(DecodedArtifact {
        key: key.clone(),
        fell_back,
        content,
        embedded,
        namespace,
        issue,
    })
}

/// Base64-decode `raw`, falling back to `raw` itself when it is not base64
/// of UTF-8 text. ASCII whitespace inside the encoding is ignored.
#[must_use]
pub fn decode_base64_lossy(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT_BASE64
        .decode(compact.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// The still-encoded embedded document of an outer JSON document.
#[must_use]
pub fn embedded_document(content: &str) -> Option<String> {
    let document: serde_json::Value = serde_json::from_str(content).ok()?;
    document
        .get(EMBEDDED_DOCUMENT_FIELD)?
        .as_str()
        .map(str::to_string)
}

/// First `namespace:` token in `text`.
///
/// Plain text scraping, not structural parsing: the first occurrence wins,
/// whatever section of the document it appears in.
#[must_use]
pub fn extract_namespace(text: &str) -> Option<String> {
    NAMESPACE_TOKEN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use indexmap::IndexMap;

    fn artifact(entries: &[(&str, &str)]) -> Artifact {
        Artifact {
            name: "req-a-secret".to_string(),
            namespace: "ns1".to_string(),
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<IndexMap<_, _>>(),
            ),
        }
    }

    fn wrap(inner: &str) -> String {
        let document = serde_json::json!({ "kubeconfig": STANDARD.encode(inner) });
        STANDARD.encode(document.to_string())
    }

    const KUBECONFIG: &str = "apiVersion: v1\nclusters:\n- name: hub\ncontexts:\n- context:\n    cluster: hub\n    namespace: acme-ns\n  name: default\n";

    #[test]
    fn recovers_embedded_namespace() {
        let decoded = decode(&artifact(&[("binding-response", &wrap(KUBECONFIG))]), DEFAULT_ARTIFACT_KEY)
            .unwrap();
        assert_eq!(decoded.key, "binding-response");
        assert!(!decoded.fell_back);
        assert_eq!(decoded.namespace.as_deref(), Some("acme-ns"));
        assert_eq!(decoded.embedded.as_deref(), Some(KUBECONFIG));
        assert!(decoded.issue.is_none());
        assert_eq!(decoded.resolution(), Resolution::Resolved("acme-ns"));
    }

    #[test]
    fn missing_data_is_hard_error() {
        let mut a = artifact(&[]);
        assert_eq!(decode(&a, "x"), Err(DecodeError::NoData));
        a.data = None;
        assert_eq!(decode(&a, "x"), Err(DecodeError::NoData));
    }

    #[test]
    fn falls_back_to_first_key() {
        let a = artifact(&[("other", &wrap("namespace: second\n")), ("more", "x")]);
        let decoded = decode(&a, DEFAULT_ARTIFACT_KEY).unwrap();
        assert_eq!(decoded.key, "other");
        assert!(decoded.fell_back);
        assert_eq!(decoded.namespace.as_deref(), Some("second"));
    }

    #[test]
    fn malformed_outer_base64_returns_raw_content() {
        let raw = "%%% not base64 %%%";
        let decoded = decode(&artifact(&[("binding-response", raw)]), DEFAULT_ARTIFACT_KEY).unwrap();
        assert_eq!(decoded.content, raw);
        assert!(decoded.namespace.is_none());
        assert_eq!(decoded.issue, Some(DecodeIssue::NoEmbeddedDocument));
    }

    #[test]
    fn unencoded_json_is_accepted_as_plaintext() {
        let outer = serde_json::json!({ "kubeconfig": "namespace: plain-ns" }).to_string();
        let decoded = decode(&artifact(&[("binding-response", &outer)]), DEFAULT_ARTIFACT_KEY).unwrap();
        assert_eq!(decoded.content, outer);
        assert_eq!(decoded.namespace.as_deref(), Some("plain-ns"));
    }

    #[test]
    fn json_without_embedded_field_keeps_content() {
        let outer = STANDARD.encode(r#"{"token":"abc"}"#);
        let decoded = decode(&artifact(&[("binding-response", &outer)]), DEFAULT_ARTIFACT_KEY).unwrap();
        assert_eq!(decoded.content, r#"{"token":"abc"}"#);
        assert!(decoded.embedded.is_none());
        assert_eq!(
            decoded.resolution(),
            Resolution::Unresolved(DecodeIssue::NoEmbeddedDocument)
        );
    }

    #[test]
    fn embedded_document_without_namespace() {
        let decoded = decode(
            &artifact(&[("binding-response", &wrap("apiVersion: v1\nkind: Config\n"))]),
            DEFAULT_ARTIFACT_KEY,
        )
        .unwrap();
        assert!(decoded.namespace.is_none());
        assert_eq!(decoded.issue, Some(DecodeIssue::NoNamespaceToken));
    }

    #[test]
    fn extract_namespace_tolerates_whitespace() {
        assert_eq!(extract_namespace("namespace: acme-ns\n").as_deref(), Some("acme-ns"));
        assert_eq!(extract_namespace("namespace:acme-ns").as_deref(), Some("acme-ns"));
        assert_eq!(extract_namespace("  namespace:\t acme-ns  \r\n").as_deref(), Some("acme-ns"));
        assert_eq!(extract_namespace("namespace: a\nnamespace: b").as_deref(), Some("a"));
        assert_eq!(extract_namespace("name: x"), None);
    }

    #[test]
    fn decode_base64_lossy_ignores_line_wrapping() {
        let encoded = STANDARD.encode("hello world, this is wrapped");
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
        assert_eq!(decode_base64_lossy(&wrapped), "hello world, this is wrapped");
    }

    #[test]
    fn decode_base64_lossy_rejects_non_utf8() {
        let encoded = STANDARD.encode([0xff_u8, 0xfe, 0xfd]);
        assert_eq!(decode_base64_lossy(&encoded), encoded);
    }
}
