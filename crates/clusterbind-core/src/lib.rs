//! clusterbind-core: Correlation engine for cluster bindings
//!
//! A binding request onboards an external cluster. Once it succeeds, an
//! external controller creates a binding record in a namespace that cannot be
//! derived from the request. This crate recovers that namespace from the
//! request's credential artifact and links requests to their records.
//!
//! # Architecture
//!
//! ```text
//! BindingSource ──► BindingSession ──► CorrelationResolver ──► decoder
//!                        │                    │
//!                        │                    ▼
//!                        └──► matcher ◄── CorrelationCache
//!                                │
//!                                ▼
//!                            projector ──► BindingRow
//! ```
//!
//! # Modules
//!
//! - `model`: Requests, records, artifacts and conditions
//! - `projector`: Health projection from status conditions
//! - `decoder`: Layered artifact decoding and namespace extraction
//! - `cache`: Write-once correlation cache
//! - `resolver`: Concurrent, failure-isolated resolution passes
//! - `matcher`: Two-tier request → record matching
//! - `source`: Source boundary trait and the snapshot-backed source
//! - `notify`: Transient user notices
//! - `session`: Session owning collections, cache and resolver
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//! - `error`: Error types with remediation hints
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod notify;
pub mod projector;
pub mod resolver;
pub mod session;
pub mod source;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
