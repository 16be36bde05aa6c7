use std::fmt::Write as _;

use anyhow::{Context, Result};
use opsctx_aggregator::{total_occurrences, ContextReport, SectionStatus, Snapshot, SourceFailure};
use opsctx_sources::{Identity, SourceKind, TrackerIssue};
use reqwest::Url;

use crate::cli_args::CliOutputFormat;

const BANNER: &str = "============================================================";
const COLUMN_GAP: usize = 3;
const PRODUCTION_AUDIT_INDEX: &str = "openshift_managed_audit";
const STAGE_AUDIT_INDEX: &str = "openshift_managed_audit_stage";

/// Link bases and detail level for the long format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub jira_browse_url: String,
    pub ticket_project: String,
    pub audit_search_url: String,
    pub dashboard_url: String,
    /// Dump service logs as JSON instead of one summary line each.
    pub verbose: bool,
}

/// Renders `report` in the requested format.
pub fn render_report(
    report: &ContextReport,
    format: CliOutputFormat,
    settings: &RenderSettings,
) -> Result<String> {
    match format {
        CliOutputFormat::Long => Ok(render_long(&report.snapshot, settings)),
        CliOutputFormat::Short => Ok(render_short(&report.snapshot)),
        CliOutputFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &ContextReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to encode report as json")
}

/// Stderr notice listing every source that could not be collected.
pub fn render_failures(failures: &[SourceFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let mut out =
        String::from("Encountered errors during data collection. Displayed data may be incomplete:\n");
    for failure in failures {
        let _ = writeln!(out, "  - {failure}");
        if failure.configuration {
            let _ = writeln!(out, "    (check credentials in the opsctx config or flags)");
        }
    }
    Some(out)
}

pub fn render_long(snapshot: &Snapshot, settings: &RenderSettings) -> String {
    let jira_browse_url = settings.jira_browse_url.as_str();
    let mut out = String::new();
    write_cluster_info(&mut out, snapshot);
    write_support_status(&mut out, snapshot);
    write_service_logs(&mut out, snapshot, settings.verbose);
    write_issues(
        &mut out,
        "Cluster Support Tickets",
        "No support tickets found",
        snapshot.tickets.as_deref(),
        snapshot.section(SourceKind::Tickets),
        jira_browse_url,
    );
    write_issues(
        &mut out,
        "Organization Support Exceptions",
        "No support exceptions found",
        snapshot.support_exceptions.as_deref(),
        snapshot.section(SourceKind::SupportExceptions),
        jira_browse_url,
    );
    write_current_incidents(&mut out, snapshot);
    write_incident_history(&mut out, snapshot);
    write_audit_events(&mut out, snapshot);
    write_external_links(&mut out, &snapshot.identity, settings);
    out
}

pub fn render_short(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BANNER}");
    let _ = writeln!(
        out,
        "{} -- {}",
        snapshot.identity.name, snapshot.identity.cluster_id
    );
    let _ = writeln!(out, "{BANNER}");

    let current = snapshot.current_incidents.as_ref().map(|by_service| {
        let (high, low) = by_service
            .values()
            .flatten()
            .fold((0usize, 0usize), |(high, low), incident| {
                if incident.urgency.eq_ignore_ascii_case("high") {
                    (high + 1, low)
                } else {
                    (high, low + 1)
                }
            });
        format!("H: {high} | L: {low}")
    });
    let history = snapshot.incident_history.as_ref().map(|by_service| {
        by_service
            .values()
            .map(|occurrences| total_occurrences(occurrences))
            .sum::<usize>()
            .to_string()
    });
    let days = snapshot.window_days;
    let rows = vec![
        vec![
            "Version".to_string(),
            "Supported?".to_string(),
            format!("SLs (last {days} d)"),
            "Tickets".to_string(),
            "Current Alerts".to_string(),
            format!("Historical Alerts (last {days} d)"),
        ],
        vec![
            snapshot.identity.version.clone(),
            or_na(snapshot.is_fully_supported().map(|supported| supported.to_string())),
            or_na(snapshot.service_logs.as_ref().map(|logs| logs.len().to_string())),
            or_na(snapshot.tickets.as_ref().map(|issues| issues.len().to_string())),
            or_na(current),
            or_na(history),
        ],
    ];
    out.push_str(&render_table(&rows));
    out
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "N/A".to_string())
}

fn write_banner(out: &mut String, title: &str) {
    let _ = writeln!(out, "{BANNER}\n{title}\n{BANNER}");
}

/// Explains an empty slot from its section status.
fn write_unavailable(out: &mut String, status: Option<&SectionStatus>) {
    match status {
        Some(SectionStatus::Failed { error }) => {
            let _ = writeln!(out, "Unavailable: {error}\n");
        }
        Some(SectionStatus::Skipped { reason }) => {
            let _ = writeln!(out, "Skipped: {reason}\n");
        }
        _ => {
            let _ = writeln!(out, "Unavailable\n");
        }
    }
}

fn write_cluster_info(out: &mut String, snapshot: &Snapshot) {
    let identity = &snapshot.identity;
    write_banner(out, "Cluster Info");
    let fields = [
        ("Name", identity.name.as_str()),
        ("Cluster ID", identity.cluster_id.as_str()),
        ("External ID", identity.external_id.as_str()),
        ("Version", identity.version.as_str()),
        ("Base domain", identity.base_domain.as_str()),
        ("Infra ID", identity.infra_id.as_str()),
        (
            "Organization",
            identity.organization_id.as_deref().unwrap_or("unknown"),
        ),
        (
            "Environment",
            identity.environment.as_deref().unwrap_or("unknown"),
        ),
    ];
    for (label, value) in fields {
        let _ = writeln!(out, "{:<14}{value}", format!("{label}:"));
    }
    let _ = writeln!(out);
}

fn write_support_status(out: &mut String, snapshot: &Snapshot) {
    write_banner(out, "Limited Support Status");
    match snapshot.limited_support.as_deref() {
        None => write_unavailable(out, snapshot.section(SourceKind::LimitedSupport)),
        Some([]) => {
            let _ = writeln!(out, "Cluster is fully supported\n");
        }
        Some(reasons) => {
            let mut rows = vec![vec![
                "Reason ID".to_string(),
                "Summary".to_string(),
                "Details".to_string(),
            ]];
            rows.extend(reasons.iter().map(|reason| {
                vec![
                    reason.id.clone(),
                    reason.summary.clone(),
                    reason.details.clone(),
                ]
            }));
            out.push_str(&render_table(&rows));
            let _ = writeln!(out);
        }
    }
}

fn write_service_logs(out: &mut String, snapshot: &Snapshot, verbose: bool) {
    write_banner(
        out,
        &format!("Service Logs sent in the past {} days", snapshot.window_days),
    );
    match snapshot.service_logs.as_deref() {
        None => write_unavailable(out, snapshot.section(SourceKind::ServiceLogs)),
        Some(logs) if verbose => match serde_json::to_string_pretty(logs) {
            Ok(json) => {
                let _ = writeln!(out, "{json}\n");
            }
            Err(error) => {
                let _ = writeln!(out, "Unavailable: failed to encode service logs: {error}\n");
            }
        },
        Some(logs) => {
            for (index, log) in logs.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{index}. {} ({})",
                    log.summary,
                    log.created_at.to_rfc3339()
                );
            }
            let _ = writeln!(out);
        }
    }
}

fn write_issues(
    out: &mut String,
    title: &str,
    empty_message: &str,
    issues: Option<&[TrackerIssue]>,
    status: Option<&SectionStatus>,
    jira_browse_url: &str,
) {
    write_banner(out, title);
    match issues {
        None => write_unavailable(out, status),
        Some([]) => {
            let _ = writeln!(out, "{empty_message}\n");
        }
        Some(issues) => {
            for issue in issues {
                let _ = writeln!(
                    out,
                    "[{}]({}/{}): {}",
                    issue.key, issue.issue_type, issue.priority, issue.summary
                );
                let _ = writeln!(out, "- Created: {}\tStatus: {}", issue.created, issue.status);
                let _ = writeln!(out, "- Link: {jira_browse_url}/browse/{}\n", issue.key);
            }
        }
    }
}

fn write_current_incidents(out: &mut String, snapshot: &Snapshot) {
    write_banner(out, "Current Incidents for the Cluster");
    let Some(by_service) = snapshot.current_incidents.as_ref() else {
        write_unavailable(out, snapshot.section(SourceKind::CurrentIncidents));
        return;
    };
    if by_service.is_empty() {
        let _ = writeln!(out, "No incident services matched the cluster\n");
        return;
    }
    for (service_id, incidents) in by_service {
        let _ = writeln!(out, "Service: {service_id}");
        let mut rows = vec![vec![
            "Urgency".to_string(),
            "Title".to_string(),
            "Created At".to_string(),
        ]];
        rows.extend(incidents.iter().map(|incident| {
            vec![
                incident.urgency.clone(),
                incident.title.clone(),
                incident.created_at.clone(),
            ]
        }));
        out.push_str(&render_table(&rows));
        let _ = writeln!(out);
    }
}

fn write_incident_history(out: &mut String, snapshot: &Snapshot) {
    write_banner(out, "Historical Incident Summary");
    let Some(by_service) = snapshot.incident_history.as_ref() else {
        write_unavailable(out, snapshot.section(SourceKind::IncidentHistory));
        return;
    };
    for (service_id, occurrences) in by_service {
        let _ = writeln!(out, "Service: {service_id}");
        let mut rows = vec![vec![
            "Type".to_string(),
            "Count".to_string(),
            "Last Occurrence".to_string(),
        ]];
        rows.extend(occurrences.iter().map(|occurrence| {
            vec![
                occurrence.name.clone(),
                occurrence.count.to_string(),
                occurrence.last_occurrence.to_rfc3339(),
            ]
        }));
        out.push_str(&render_table(&rows));
        let _ = writeln!(
            out,
            "Total number of incidents [{}] in [{}] days\n",
            total_occurrences(occurrences),
            snapshot.window_days
        );
    }
}

fn write_audit_events(out: &mut String, snapshot: &Snapshot) {
    write_banner(out, "Potentially interesting audit events for the Cluster");
    let Some(events) = snapshot.audit_events.as_ref() else {
        match snapshot.section(SourceKind::AuditLog) {
            Some(SectionStatus::Skipped { .. }) => {
                let _ = writeln!(out, "Not polling audit events, use --full to do so.\n");
            }
            status => write_unavailable(out, status),
        }
        return;
    };
    let mut rows = vec![vec![
        "EventId".to_string(),
        "EventName".to_string(),
        "Username".to_string(),
        "EventTime".to_string(),
    ]];
    rows.extend(events.iter().map(|event| {
        vec![
            event.event_id.clone(),
            event.event_name.clone(),
            event.username.clone().unwrap_or_default(),
            event.event_time.to_rfc3339(),
        ]
    }));
    out.push_str(&render_table(&rows));
    let _ = writeln!(out);
}

fn write_external_links(out: &mut String, identity: &Identity, settings: &RenderSettings) {
    write_banner(out, "External resources containing related cluster data");
    for (label, link) in external_links(identity, settings) {
        let _ = writeln!(out, "{label}: {link}\n");
    }
}

/// Audit search, ticket search and dashboard links for the cluster. The
/// audit link is omitted for integration clusters, which do not forward
/// audit logs. Links with an unparsable base are dropped.
fn external_links(identity: &Identity, settings: &RenderSettings) -> Vec<(&'static str, Url)> {
    let mut links = Vec::new();
    let audit_index = match identity.environment.as_deref() {
        Some("integration") => None,
        Some("stage") => Some(STAGE_AUDIT_INDEX),
        _ => Some(PRODUCTION_AUDIT_INDEX),
    };
    if let Some(index) = audit_index {
        let query = format!(
            "search index=\"{index}\" clusterid=\"{}\"",
            identity.infra_id
        );
        let params = [("q", query.as_str())];
        if let Some(url) = link_with_query(&settings.audit_search_url, &params) {
            links.push(("Audit logs (set the time range in the search)", url));
        }
    }

    let jql = format!(
        "project = \"{}\" AND (\"Cluster ID\" ~ \"{}\" OR \"Cluster ID\" ~ \"{}\")",
        settings.ticket_project, identity.cluster_id, identity.external_id
    );
    let ticket_search = format!("{}/issues/", settings.jira_browse_url);
    if let Some(url) = link_with_query(&ticket_search, &[("jql", jql.as_str())]) {
        links.push(("Support tickets", url));
    }

    let dashboard = format!(
        "{}/{}",
        settings.dashboard_url.trim_end_matches('/'),
        identity.external_id
    );
    if let Some(url) = link_with_query(&dashboard, &[]) {
        links.push(("Cluster dashboard", url));
    }
    links
}

fn link_with_query(base: &str, params: &[(&str, &str)]) -> Option<Url> {
    let parsed = if params.is_empty() {
        Url::parse(base)
    } else {
        Url::parse_with_params(base, params)
    };
    match parsed {
        Ok(url) => Some(url),
        Err(error) => {
            tracing::warn!(base, %error, "skipping external link with invalid base url");
            None
        }
    }
}

/// Left-aligned columns separated by a fixed gap.
fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|column| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();
    let mut out = String::new();
    for row in rows {
        let mut line = String::new();
        for (column, cell) in row.iter().enumerate() {
            if column + 1 == row.len() {
                line.push_str(cell);
            } else {
                let _ = write!(line, "{cell:<width$}", width = widths[column] + COLUMN_GAP);
            }
        }
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use opsctx_aggregator::{
        ContextReport, IncidentOccurrence, SectionStatus, Snapshot, SourceFailure,
    };
    use opsctx_sources::{Identity, Incident, ServiceLogEntry, SourceKind};

    use reqwest::Url;

    use super::{
        external_links, render_failures, render_json, render_long, render_short, render_table,
        RenderSettings,
    };

    fn settings() -> RenderSettings {
        RenderSettings {
            jira_browse_url: "https://issues.example.com".to_string(),
            ticket_project: "OHSS".to_string(),
            audit_search_url: "https://audit.example.com/search".to_string(),
            dashboard_url: "https://dashboard.example.com/clusters/".to_string(),
            verbose: false,
        }
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    fn snapshot() -> Snapshot {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let mut sections = BTreeMap::new();
        sections.insert(SourceKind::LimitedSupport, SectionStatus::Collected { records: 0 });
        sections.insert(SourceKind::ServiceLogs, SectionStatus::Collected { records: 1 });
        sections.insert(
            SourceKind::Tickets,
            SectionStatus::Failed {
                error: "ticket tracker: missing configuration jira_token".to_string(),
            },
        );
        sections.insert(
            SourceKind::AuditLog,
            SectionStatus::Skipped {
                reason: "expensive source not requested".to_string(),
            },
        );
        let mut current = BTreeMap::new();
        current.insert(
            "SVC1".to_string(),
            vec![
                Incident {
                    id: "Q1".to_string(),
                    title: "NodeDown worker".to_string(),
                    urgency: "high".to_string(),
                    status: "triggered".to_string(),
                    created_at: "2024-03-30T08:00:00Z".to_string(),
                    service_id: "SVC1".to_string(),
                },
                Incident {
                    id: "Q2".to_string(),
                    title: "DiskFull".to_string(),
                    urgency: "low".to_string(),
                    status: "triggered".to_string(),
                    created_at: "2024-03-30T09:00:00Z".to_string(),
                    service_id: "SVC1".to_string(),
                },
            ],
        );
        let mut history = BTreeMap::new();
        history.insert(
            "SVC1".to_string(),
            vec![
                IncidentOccurrence {
                    name: "DiskFull".to_string(),
                    count: 1,
                    last_occurrence: now,
                },
                IncidentOccurrence {
                    name: "NodeDown".to_string(),
                    count: 4,
                    last_occurrence: now,
                },
            ],
        );
        Snapshot {
            generated_at: now,
            window_days: 30,
            identity: Identity {
                cluster_id: "abc123".to_string(),
                external_id: "ext-1".to_string(),
                name: "prod-east".to_string(),
                version: "4.15.3".to_string(),
                base_domain: "east.example.com".to_string(),
                infra_id: "infra".to_string(),
                organization_id: None,
                environment: Some("production".to_string()),
            },
            sections,
            limited_support: Some(Vec::new()),
            service_logs: Some(vec![ServiceLogEntry {
                id: "sl-1".to_string(),
                summary: "Cluster upgrade scheduled".to_string(),
                description: String::new(),
                severity: "Info".to_string(),
                created_at: now,
            }]),
            tickets: None,
            support_exceptions: Some(Vec::new()),
            incident_services: None,
            current_incidents: Some(current),
            incident_history: Some(history),
            audit_events: None,
        }
    }

    #[test]
    fn functional_render_long_explains_missing_sections() {
        let text = render_long(&snapshot(), &settings());
        assert!(text.contains("Cluster is fully supported"));
        assert!(text.contains("0. Cluster upgrade scheduled (2024-03-31T12:00:00+00:00)"));
        assert!(text.contains("Unavailable: ticket tracker: missing configuration jira_token"));
        assert!(text.contains("No support exceptions found"));
        assert!(text.contains("Total number of incidents [5] in [30] days"));
        assert!(text.contains("Not polling audit events, use --full to do so."));
        assert!(text.contains("Organization: unknown"));
    }

    #[test]
    fn functional_render_short_counts_alerts_and_marks_unknowns() {
        let text = render_short(&snapshot());
        assert!(text.contains("prod-east -- abc123"));
        assert!(text.contains("H: 1 | L: 1"));
        assert!(text.contains("Historical Alerts (last 30 d)"));
        let values = text.lines().last().expect("value row");
        assert!(values.starts_with("4.15.3"));
        assert!(values.contains("true"));
        assert!(values.contains("N/A"));
    }

    #[test]
    fn unit_render_json_includes_failures() {
        let report = ContextReport {
            snapshot: snapshot(),
            failures: vec![SourceFailure {
                source: SourceKind::Tickets,
                message: "missing token".to_string(),
                configuration: true,
            }],
        };
        let value: serde_json::Value =
            serde_json::from_str(&render_json(&report).expect("json")).expect("parse");
        assert_eq!(value["failures"][0]["source"], "tickets");
        assert_eq!(value["snapshot"]["identity"]["cluster_id"], "abc123");
        assert!(value["snapshot"]["tickets"].is_null());
    }

    #[test]
    fn unit_render_failures_is_silent_when_complete() {
        assert!(render_failures(&[]).is_none());
        let notice = render_failures(&[SourceFailure {
            source: SourceKind::AuditLog,
            message: "503".to_string(),
            configuration: false,
        }])
        .expect("notice");
        assert!(notice.contains("Displayed data may be incomplete"));
        assert!(notice.contains("audit log events: 503"));
    }

    #[test]
    fn unit_render_table_pads_columns_to_widest_cell() {
        let table = render_table(&[
            vec!["A".to_string(), "B".to_string()],
            vec!["longer".to_string(), "x".to_string()],
        ]);
        assert_eq!(table, "A        B\nlonger   x\n");
    }

    #[test]
    fn functional_render_long_ends_with_external_resources() {
        let text = render_long(&snapshot(), &settings());
        let links = text
            .split("External resources containing related cluster data")
            .nth(1)
            .expect("links section");
        assert!(links.contains("Audit logs (set the time range in the search): https://audit.example.com/search?q="));
        assert!(links.contains("Support tickets: https://issues.example.com/issues/?jql="));
        assert!(links.contains("Cluster dashboard: https://dashboard.example.com/clusters/ext-1"));
    }

    #[test]
    fn unit_external_links_pick_audit_index_by_environment() {
        let mut identity = snapshot().identity;
        let links = external_links(&identity, &settings());
        assert_eq!(
            query(&links[0].1, "q").as_deref(),
            Some("search index=\"openshift_managed_audit\" clusterid=\"infra\"")
        );

        identity.environment = Some("stage".to_string());
        let links = external_links(&identity, &settings());
        assert_eq!(
            query(&links[0].1, "q").as_deref(),
            Some("search index=\"openshift_managed_audit_stage\" clusterid=\"infra\"")
        );

        identity.environment = Some("integration".to_string());
        let labels: Vec<_> = external_links(&identity, &settings())
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["Support tickets", "Cluster dashboard"]);
    }

    #[test]
    fn unit_ticket_link_searches_both_cluster_ids() {
        let links = external_links(&snapshot().identity, &settings());
        let (label, url) = &links[1];
        assert_eq!(*label, "Support tickets");
        assert_eq!(
            query(url, "jql").as_deref(),
            Some("project = \"OHSS\" AND (\"Cluster ID\" ~ \"abc123\" OR \"Cluster ID\" ~ \"ext-1\")")
        );
    }

    #[test]
    fn regression_invalid_link_base_is_dropped() {
        let broken = RenderSettings {
            audit_search_url: "not a url".to_string(),
            ..settings()
        };
        let labels: Vec<_> = external_links(&snapshot().identity, &broken)
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["Support tickets", "Cluster dashboard"]);
    }

    #[test]
    fn functional_verbose_long_output_dumps_service_logs_as_json() {
        let verbose = RenderSettings {
            verbose: true,
            ..settings()
        };
        let text = render_long(&snapshot(), &verbose);
        assert!(text.contains("\"id\": \"sl-1\""));
        assert!(!text.contains("0. Cluster upgrade scheduled"));
    }
}
