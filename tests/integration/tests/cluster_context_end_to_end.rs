use std::sync::Arc;

use chrono::{TimeZone, Utc};
use clap::Parser;
use httpmock::prelude::*;
use opsctx_aggregator::SectionStatus;
use opsctx_cli::{collect_context, Cli, CliCommand, ContextArgs, ContextConfig, ContextOutput};
use opsctx_core::FixedClock;
use opsctx_sources::SourceKind;
use serde_json::{json, Value};
use tempfile::tempdir;

fn context_args(args: &[&str]) -> ContextArgs {
    match Cli::try_parse_from(args).expect("parse").command {
        CliCommand::Context(args) => args,
    }
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap(),
    ))
}

/// Every system served from one mock server; paths do not overlap.
fn config_for(server: &MockServer, with_audit: bool) -> ContextConfig {
    ContextConfig {
        registry_url: Some(server.base_url()),
        registry_token: Some("registry-token".to_string()),
        jira_url: Some(server.base_url()),
        jira_token: Some("jira-token".to_string()),
        pagerduty_url: Some(server.base_url()),
        pd_user_token: Some("pd-token".to_string()),
        audit_url: with_audit.then(|| server.base_url()),
        audit_token: with_audit.then(|| "audit-token".to_string()),
        request_timeout_ms: Some(2_000),
        retry_max_attempts: Some(1),
        retry_base_delay_ms: Some(1),
        ..ContextConfig::default()
    }
}

async fn run(config: &ContextConfig, args: &ContextArgs) -> anyhow::Result<ContextOutput> {
    collect_context(config, &config.render_settings(false), args, clock()).await
}

fn mock_registry(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/api/clusters_mgmt/v1/clusters");
        then.status(200).json_body(json!({
            "items": [{
                "id": "abc123",
                "external_id": "ext-1",
                "name": "prod-east",
                "version": { "raw_id": "4.15.3" },
                "dns": { "base_domain": "east.example.com" },
                "infra_id": "prod-east-x7k2p",
                "subscription": { "id": "sub-1" }
            }],
            "page": 1,
            "total": 1
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/accounts_mgmt/v1/subscriptions/sub-1");
        then.status(200)
            .json_body(json!({ "organization_id": "org-1" }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/clusters_mgmt/v1/clusters/abc123/limited_support_reasons");
        then.status(200)
            .json_body(json!({ "items": [], "page": 1, "total": 0 }));
    });
}

fn mock_service_logs(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/api/service_logs/v1/cluster_logs");
        then.status(200).json_body(json!({
            "items": [
                {
                    "id": "sl-1",
                    "summary": "Cluster upgrade scheduled",
                    "severity": "Info",
                    "created_at": "2024-03-29T10:00:00Z"
                },
                {
                    "id": "sl-old",
                    "summary": "Old notice",
                    "severity": "Info",
                    "created_at": "2024-01-02T10:00:00Z"
                }
            ],
            "page": 1,
            "total": 2
        }));
    });
}

fn mock_tickets(server: &MockServer, healthy: bool) {
    server.mock(|when, then| {
        when.method(GET).path("/rest/api/2/search");
        if healthy {
            then.status(200).json_body(json!({
                "startAt": 0,
                "maxResults": 50,
                "total": 1,
                "issues": [{
                    "key": "OHSS-42",
                    "fields": {
                        "summary": "API unreachable",
                        "issuetype": { "name": "Incident" },
                        "priority": { "name": "Critical" },
                        "status": { "name": "In Progress" },
                        "created": "2024-03-28T10:00:00.000+0000"
                    }
                }]
            }));
        } else {
            then.status(500).body("search backend down");
        }
    });
}

fn mock_incidents(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/services")
            .query_param("query", "east.example.com");
        then.status(200).json_body(json!({
            "services": [{ "id": "SVC1", "name": "prod-east-hive" }],
            "more": false
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/incidents")
            .query_param("sort_by", "urgency:desc");
        then.status(200).json_body(json!({
            "incidents": [{
                "id": "Q1",
                "title": "ClusterOperatorDown dns",
                "urgency": "high",
                "status": "triggered",
                "created_at": "2024-03-31T08:00:00Z"
            }],
            "more": false
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/incidents")
            .query_param("sort_by", "created_at:desc");
        then.status(200).json_body(json!({
            "incidents": [
                { "id": "H1", "title": "NodeDown worker-1", "created_at": "2024-03-30T08:00:00Z" },
                { "id": "H2", "title": "NodeDown worker-2", "created_at": "2024-03-25T08:00:00Z" },
                { "id": "H3", "title": "DiskFull /var", "created_at": "2024-03-20T08:00:00Z" }
            ],
            "more": false
        }));
    });
}

fn mock_audit(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/lookup-events");
        then.status(200).json_body(json!({
            "events": [
                { "event_id": "e1", "event_name": "TerminateInstances", "username": "customer", "event_time": "2024-03-30T08:00:00Z" },
                { "event_id": "e2", "event_name": "DescribeInstances", "username": "customer", "event_time": "2024-03-30T08:01:00Z" }
            ]
        }));
    });
}

#[tokio::test]
async fn integration_full_context_collects_every_source_and_exports_json() {
    let server = MockServer::start();
    mock_registry(&server);
    mock_service_logs(&server);
    mock_tickets(&server, true);
    mock_incidents(&server);
    mock_audit(&server);

    let dir = tempdir().expect("tempdir");
    let export = dir.path().join("reports/context.json");
    let export_arg = export.to_string_lossy().to_string();
    let args = context_args(&[
        "opsctx",
        "context",
        "prod-east",
        "--full",
        "-o",
        "short",
        "--output-file",
        export_arg.as_str(),
    ]);

    let output = run(&config_for(&server, true), &args)
        .await
        .expect("context");

    assert!(output.report.is_complete(), "{:?}", output.report.failures);
    assert!(output.stderr.is_none());
    let snapshot = &output.report.snapshot;
    assert_eq!(snapshot.identity.organization_id.as_deref(), Some("org-1"));
    assert_eq!(snapshot.is_fully_supported(), Some(true));
    assert_eq!(snapshot.service_logs.as_ref().map(Vec::len), Some(1));
    assert_eq!(snapshot.audit_events.as_ref().map(Vec::len), Some(1));
    let history = snapshot.incident_history.as_ref().expect("history");
    let summary: Vec<_> = history["SVC1"]
        .iter()
        .map(|occurrence| (occurrence.name.as_str(), occurrence.count))
        .collect();
    assert_eq!(summary, vec![("DiskFull", 1), ("NodeDown", 2)]);

    assert!(output.stdout.contains("prod-east -- abc123"));
    assert!(output.stdout.contains("H: 1 | L: 0"));

    let exported: Value =
        serde_json::from_str(&std::fs::read_to_string(&export).expect("export")).expect("json");
    assert_eq!(exported["snapshot"]["identity"]["cluster_id"], "abc123");
    assert_eq!(exported["failures"], json!([]));
}

#[tokio::test]
async fn integration_failing_sources_are_reported_without_losing_the_rest() {
    let server = MockServer::start();
    mock_registry(&server);
    mock_service_logs(&server);
    mock_tickets(&server, false);
    mock_incidents(&server);

    let args = context_args(&["opsctx", "context", "abc123", "--full"]);
    let output = run(&config_for(&server, false), &args)
        .await
        .expect("partial context");

    let failed: Vec<_> = output
        .report
        .failures
        .iter()
        .map(|failure| (failure.source, failure.configuration))
        .collect();
    assert_eq!(
        failed,
        vec![
            (SourceKind::Tickets, false),
            (SourceKind::SupportExceptions, false),
            (SourceKind::AuditLog, true),
        ]
    );
    let snapshot = &output.report.snapshot;
    assert!(snapshot.tickets.is_none());
    assert!(snapshot.service_logs.is_some());
    assert!(snapshot.incident_history.is_some());
    assert!(matches!(
        snapshot.section(SourceKind::Tickets),
        Some(SectionStatus::Failed { .. })
    ));

    let notice = output.stderr.expect("failure notice");
    assert!(notice.contains("Displayed data may be incomplete"));
    assert!(output.stdout.contains("Unavailable: "));
    assert!(output.stdout.contains("Historical Incident Summary"));
    assert!(output
        .stdout
        .contains("External resources containing related cluster data"));
    assert!(output.stdout.contains("Cluster dashboard: https://kraken.psi.redhat.com/clusters/ext-1"));
}

#[tokio::test]
async fn integration_page_ceiling_bounds_requests_to_endless_source() {
    let server = MockServer::start();
    mock_registry(&server);
    mock_tickets(&server, true);
    mock_incidents(&server);
    let endless = server.mock(|when, then| {
        when.method(GET).path("/api/service_logs/v1/cluster_logs");
        then.status(200).json_body(json!({
            "items": [{
                "id": "sl-loop",
                "summary": "Repeated",
                "created_at": "2024-03-30T10:00:00Z"
            }],
            "page": 0,
            "total": 1_000_000
        }));
    });

    let args = context_args(&["opsctx", "context", "abc123", "--pages", "3", "-o", "json"]);
    let output = run(&config_for(&server, false), &args)
        .await
        .expect("context");

    assert_eq!(endless.calls(), 3);
    assert_eq!(
        output.report.snapshot.section(SourceKind::ServiceLogs),
        Some(&SectionStatus::Collected { records: 3 })
    );
    let rendered: Value = serde_json::from_str(&output.stdout).expect("json output");
    assert_eq!(rendered["snapshot"]["window_days"], 30);
}

#[tokio::test]
async fn integration_unknown_cluster_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/clusters_mgmt/v1/clusters");
        then.status(200)
            .json_body(json!({ "items": [], "page": 1, "total": 0 }));
    });

    let args = context_args(&["opsctx", "context", "ghost"]);
    let error = run(&config_for(&server, false), &args)
        .await
        .expect_err("unknown cluster");
    assert!(format!("{error:#}").contains("no match found for 'ghost'"));
}
