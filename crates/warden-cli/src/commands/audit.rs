//! Audit command - query and verify the audit log.

use std::path::Path;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use warden_audit::{AuditFilter, AuditLog};
use warden_config::{AuditBackend, Config};
use warden_core::{CorrelationId, ExecutionStatus, Timestamp};

use crate::theme::Theme;

/// Raw filter flags from the command line.
pub(crate) struct FilterArgs {
    pub(crate) principal: Option<String>,
    pub(crate) tool: Option<String>,
    pub(crate) status: Option<ExecutionStatus>,
    pub(crate) since: Option<String>,
    pub(crate) until: Option<String>,
    pub(crate) correlation_id: Option<String>,
    pub(crate) limit: Option<usize>,
}

/// Parse a status name as written in records, e.g. `Denied`.
pub(crate) fn parse_status(s: &str) -> Result<ExecutionStatus, String> {
    serde_json::from_value(serde_json::Value::String(s.to_owned()))
        .map_err(|_| format!("unknown status '{s}'"))
}

fn parse_timestamp(flag: &str, s: &str) -> anyhow::Result<Timestamp> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("--{flag} must be an RFC 3339 timestamp"))?;
    Ok(Timestamp(parsed.with_timezone(&Utc)))
}

/// Turn command-line flags into a filter.
pub(crate) fn build_filter(args: FilterArgs) -> anyhow::Result<AuditFilter> {
    let mut filter = AuditFilter::new();
    if let Some(principal) = args.principal {
        filter = filter.principal(principal);
    }
    if let Some(tool) = args.tool {
        filter = filter.tool(tool);
    }
    if let Some(status) = args.status {
        filter = filter.status(status);
    }
    if let Some(since) = args.since {
        filter = filter.since(parse_timestamp("since", &since)?);
    }
    if let Some(until) = args.until {
        filter = filter.until(parse_timestamp("until", &until)?);
    }
    if let Some(id) = args.correlation_id {
        filter = filter.correlation_id(CorrelationId::from_string(id));
    }
    if let Some(limit) = args.limit {
        filter = filter.limit(limit);
    }
    Ok(filter)
}

fn open_log(config_path: Option<&Path>) -> anyhow::Result<AuditLog> {
    let cfg = Config::load(config_path)?.config;
    if cfg.audit.backend == AuditBackend::Memory {
        bail!("audit backend is 'memory'; nothing is persisted to query");
    }
    let path = cfg.audit.resolved_path();
    if !path.exists() {
        bail!("no audit log at {}", path.display());
    }
    AuditLog::open(&path, false)
        .with_context(|| format!("failed to open audit log {}", path.display()))
}

/// Print records matching `filter`, oldest first.
pub(crate) fn query(config_path: Option<&Path>, filter: AuditFilter, json: bool) -> anyhow::Result<()> {
    let log = open_log(config_path)?;
    let query = log.query(filter);

    if json {
        for record in query.iter() {
            println!("{}", serde_json::to_string(&record?)?);
        }
        return Ok(());
    }

    println!("\n{}", Theme::header("Audit Records"));
    println!(
        "{:>6} {:<20} {:<12} {:<20} {:<14} CORRELATION",
        "SEQ", "TIMESTAMP", "PRINCIPAL", "TOOL", "STATUS"
    );
    println!("{}", Theme::separator());

    let mut shown: usize = 0;
    for record in query.iter() {
        let record = record?;
        println!(
            "{:>6} {:<20} {:<12} {:<20} {:<14} {}",
            record.sequence,
            record.timestamp.0.format("%Y-%m-%d %H:%M:%S"),
            record.principal_id.as_str(),
            record.tool_name,
            Theme::status(record.status),
            record.correlation_id
        );
        shown = shown.saturating_add(1);
    }

    if shown == 0 {
        println!("{}", Theme::info("No matching records"));
    }
    println!();
    Ok(())
}

/// Replay the hash chain and report any break.
pub(crate) fn verify(config_path: Option<&Path>) -> anyhow::Result<()> {
    let log = open_log(config_path)?;
    let report = log.verify()?;

    if report.valid {
        println!(
            "{}",
            Theme::success(&format!(
                "Audit chain verified: {} records, no issues",
                report.records_verified
            ))
        );
        return Ok(());
    }

    println!(
        "{}",
        Theme::error(&format!(
            "Audit chain has {} issues in {} records:",
            report.issues.len(),
            report.records_verified
        ))
    );
    for issue in &report.issues {
        println!("  - {issue}");
    }
    bail!("audit chain verification failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> FilterArgs {
        FilterArgs {
            principal: None,
            tool: None,
            status: None,
            since: None,
            until: None,
            correlation_id: None,
            limit: None,
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("Denied"), Ok(ExecutionStatus::Denied));
        assert!(parse_status("denied-ish").is_err());
    }

    #[test]
    fn test_build_filter() {
        let filter = build_filter(FilterArgs {
            principal: Some("bob".into()),
            since: Some("2026-01-01T00:00:00Z".into()),
            limit: Some(5),
            ..empty()
        })
        .unwrap();
        assert_eq!(filter.principal.as_ref().map(|p| p.as_str()), Some("bob"));
        assert!(filter.since.is_some());
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn test_bad_timestamp() {
        let err = build_filter(FilterArgs {
            until: Some("yesterday".into()),
            ..empty()
        });
        assert!(err.is_err());
    }
}
