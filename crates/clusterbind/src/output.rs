//! Plain and JSON renderers for `cbind` output.
//!
//! Plain output is tab-separated and never colored, so it can be piped.

use std::io::{self, Write};

use clap::ValueEnum;
use clusterbind_core::decoder::DecodedArtifact;
use clusterbind_core::matcher::MatchTier;
use clusterbind_core::model::{BindingRecord, BindingRequest, Phase};
use clusterbind_core::session::{BindingRow, LinkState, RowSummary};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

const NONE: &str = "-";

fn phase_label(phase: Option<Phase>) -> &'static str {
    phase.map_or(NONE, |p| p.as_str())
}

pub fn json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

pub fn rows(out: &mut impl Write, rows: &[BindingRow], summary: &RowSummary) -> io::Result<()> {
    writeln!(
        out,
        "REQUEST\tPHASE\tHEALTH\tNAMESPACE\tRECORD\tRECORD_HEALTH\tLINK"
    )?;
    for row in rows {
        let (record, record_health, link) = match &row.link {
            LinkState::Linked {
                record,
                tier,
                health,
            } => {
                let link = match tier {
                    MatchTier::ResolvedNamespace => "resolved",
                    MatchTier::SameNamespace => "same-namespace",
                };
                (record.to_string(), health.label, link)
            }
            LinkState::NotLinked => (NONE.to_string(), NONE, "not-linked"),
        };
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.request,
            phase_label(row.phase),
            row.health.label,
            row.resolved_namespace.as_deref().unwrap_or(NONE),
            record,
            record_health,
            link
        )?;
    }
    writeln!(
        out,
        "{} requests, {} linked, {} not linked",
        summary.total, summary.linked, summary.not_linked
    )
}

pub fn requests(out: &mut impl Write, requests: &[BindingRequest]) -> io::Result<()> {
    writeln!(out, "REQUEST\tPHASE\tHEALTH\tCLUSTER\tARTIFACT")?;
    for request in requests {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            request.key(),
            phase_label(request.phase),
            request.health().label,
            request.cluster_identity,
            request
                .artifact_ref
                .as_ref()
                .map_or(NONE, |a| a.name.as_str())
        )?;
    }
    Ok(())
}

pub fn records(out: &mut impl Write, records: &[BindingRecord]) -> io::Result<()> {
    writeln!(out, "RECORD\tHEALTH\tLAST_HEARTBEAT")?;
    for record in records {
        writeln!(
            out,
            "{}\t{}\t{}",
            record.key(),
            record.health().label,
            record.last_heartbeat_time.as_deref().unwrap_or(NONE)
        )?;
    }
    Ok(())
}

pub fn namespaces(out: &mut impl Write, namespaces: &[String]) -> io::Result<()> {
    for namespace in namespaces {
        writeln!(out, "{namespace}")?;
    }
    Ok(())
}

pub fn decoded(out: &mut impl Write, decoded: &DecodedArtifact) -> io::Result<()> {
    let key_note = if decoded.fell_back { " (fallback)" } else { "" };
    writeln!(out, "key: {}{key_note}", decoded.key)?;
    writeln!(
        out,
        "namespace: {}",
        decoded.namespace.as_deref().unwrap_or(NONE)
    )?;
    if let Some(issue) = decoded.issue {
        writeln!(out, "issue: {issue:?}")?;
    }
    Ok(())
}

/// The credential document itself, for export.
pub fn document(out: &mut impl Write, decoded: &DecodedArtifact) -> io::Result<()> {
    let text = decoded.embedded.as_deref().unwrap_or(&decoded.content);
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}
