//! Error types for clusterbind-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
    /// Optional reference for more details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learn_more: Option<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
            learn_more: None,
        }
    }

    /// Add a command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Add a learn-more reference
    #[must_use]
    pub fn learn_more(mut self, link: impl Into<String>) -> Self {
        self.learn_more = Some(link.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        if let Some(learn_more) = &self.learn_more {
            let _ = writeln!(output, "  Learn more: {learn_more}");
        }

        output
    }
}

const JSON_REFERENCE: &str = "https://www.json.org/json-en.html";
const YAML_REFERENCE: &str = "https://yaml.org/spec/1.2.2/";
const TOML_REFERENCE: &str = "https://toml.io/en/v1.0.0";

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clusterbind-core
#[derive(Error, Debug)]
pub enum Error {
    /// Request/record source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Artifact decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Source(err) => Some(err.remediation()),
            Self::Decode(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .command("Show namespaces", "cbind namespaces")
                    .alternative("Verify the snapshot file exists and is readable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .command("Validate JSON", "python -m json.tool < input.json")
                    .alternative("Check for trailing commas or invalid UTF-8.")
                    .learn_more(JSON_REFERENCE),
            ),
        }
    }
}

/// Errors raised by a [`crate::source::BindingSource`].
///
/// The session layer never propagates these; it substitutes an empty or
/// absent result and emits an error notice instead.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The backing store could not be reached or rejected the call
    #[error("Transport failed: {0}")]
    Transport(String),

    /// The call did not complete in time
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// A snapshot document could not be read or written
    #[error("Snapshot {path}: {message}")]
    Snapshot { path: String, message: String },

    /// Document text that is not valid YAML/JSON for the expected shape
    #[error("Malformed {format} document: {message}")]
    Document {
        format: &'static str,
        message: String,
    },
}

impl SourceError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Transport(_) => Remediation::new(
                "The binding source is unreachable. Retry once it is available again.",
            )
            .command("List requests", "cbind requests")
            .alternative("Point --snapshot at a local snapshot file to inspect offline."),
            Self::Timeout { timeout_ms } => Remediation::new(format!(
                "The binding source did not answer within {timeout_ms} ms."
            ))
            .command("Retry", "cbind list")
            .alternative("Raise resolver.fetch_timeout_ms in clusterbind.toml."),
            Self::Snapshot { path, .. } => {
                Remediation::new(format!("Fix or regenerate the snapshot file: {path}"))
                    .command("Check path", format!("ls -l \"{path}\""))
                    .alternative("Snapshots may be YAML (.yaml/.yml) or JSON (.json).")
            }
            Self::Document { format, .. } => {
                Remediation::new(format!("Fix the {format} syntax of the document and retry."))
                    .command("Decode an artifact file", "cbind decode --file <artifact>")
                    .alternative("The file extension selects the parser: .json is JSON, anything else YAML.")
                    .learn_more(if *format == "json" { JSON_REFERENCE } else { YAML_REFERENCE })
            }
        }
    }
}

/// Hard failures of the Artifact Decoder.
///
/// Everything short of "no data at all" degrades to a partial
/// [`crate::decoder::DecodedArtifact`] instead of an error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("artifact carries no data")]
    NoData,

    #[error("artifact data has no usable key")]
    KeyNotFound,
}

impl DecodeError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::NoData => Remediation::new(
                "The credential artifact is empty. Wait for the controller to populate it.",
            )
            .command("Re-run resolution", "cbind list")
            .alternative("Check the request's conditions for a failure reason."),
            Self::KeyNotFound => Remediation::new("The artifact has no entry to decode.")
                .command("Decode with an explicit key", "cbind decode --file <artifact> --key <key>"),
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\""))
            .alternative("Ensure the file is readable by the current user."),
            Self::ParseFailed(_) => Remediation::new("Config parse failed. Fix the syntax and retry.")
                .command("Run with defaults", "CLUSTERBIND_CONFIG=/dev/null cbind list")
                .alternative("Validate the TOML syntax of clusterbind.toml.")
                .learn_more(TOML_REFERENCE),
            Self::ValidationError(_) => {
                Remediation::new("Config validation failed. Fix the invalid fields and retry.")
                    .command("Run with defaults", "CLUSTERBIND_CONFIG=/dev/null cbind list")
                    .alternative("Review validation errors and adjust clusterbind.toml.")
            }
        }
    }
}

/// Format an error with remediation guidance for display.
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}
