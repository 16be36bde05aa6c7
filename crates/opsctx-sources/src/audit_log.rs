use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::http_client::{HttpSettings, SourceAuth, SourceHttpClient};
use crate::paging::collect_pages;
use crate::{
    AuditEvent, FetchOutcome, FetchScope, Identity, Page, SourceAdapter, SourceError, SourceKind,
};

const SYSTEM: &str = "audit log";
const PAGE_SIZE: usize = 50;
pub const DEFAULT_OPERATOR_USER_PREFIX: &str = "RH-SRE-";

/// Event names containing these fragments never modify the account.
const READ_ONLY_EVENT_FRAGMENTS: &[&str] = &[
    "Get",
    "List",
    "Describe",
    "AssumeRole",
    "Encrypt",
    "Decrypt",
    "LookupEvents",
    "GenerateDataKey",
];

/// Connection settings for the audit-log lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogSettings {
    pub base_url: Option<String>,
    pub token: Option<String>,
    /// Events by users whose name contains this prefix are operator activity.
    pub operator_user_prefix: String,
}

impl Default for AuditLogSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            operator_user_prefix: DEFAULT_OPERATOR_USER_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    events: Vec<EventItem>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    event_id: String,
    event_name: String,
    username: Option<String>,
    event_time: DateTime<Utc>,
}

/// Change events recorded for the cluster's cloud account, with read-only
/// calls and operator activity dropped.
#[derive(Clone)]
pub struct AuditLogClient {
    http: Result<SourceHttpClient, &'static str>,
    operator_user_prefix: String,
}

impl AuditLogClient {
    pub fn new(settings: &AuditLogSettings, http: &HttpSettings) -> Result<Self, SourceError> {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };
        let client = match (non_empty(&settings.base_url), non_empty(&settings.token)) {
            (None, _) => Err("audit_url"),
            (_, None) => Err("audit_token"),
            (Some(base_url), Some(token)) => Ok(SourceHttpClient::new(
                SYSTEM,
                &base_url,
                &SourceAuth::Bearer(token),
                http,
            )?),
        };
        Ok(Self {
            http: client,
            operator_user_prefix: settings.operator_user_prefix.clone(),
        })
    }

    fn http(&self) -> Result<&SourceHttpClient, SourceError> {
        self.http
            .as_ref()
            .map_err(|key| SourceError::MissingConfig { system: SYSTEM, key })
    }

    fn is_interesting(&self, event: &AuditEvent) -> bool {
        if is_read_only_event(&event.event_name) {
            return false;
        }
        let prefix = self.operator_user_prefix.trim();
        !matches!(
            event.username.as_deref(),
            Some(username) if !prefix.is_empty() && username.contains(prefix)
        )
    }
}

#[async_trait]
impl SourceAdapter for AuditLogClient {
    type Record = AuditEvent;

    fn kind(&self) -> SourceKind {
        SourceKind::AuditLog
    }

    async fn fetch(&self, identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        let http = self.http()?;
        let cluster_id = identity.cluster_id.as_str();
        let events = collect_pages("audit events", scope.max_pages, |token| async move {
            let payload = json!({
                "cluster_id": cluster_id,
                "max_results": PAGE_SIZE,
                "next_token": token,
            });
            let response: LookupResponse = http
                .request_json("lookup events", || http.post("/lookup-events").json(&payload))
                .await?;
            let records = response
                .events
                .into_iter()
                .map(|item| AuditEvent {
                    event_id: item.event_id,
                    event_name: item.event_name,
                    username: item.username,
                    event_time: item.event_time,
                })
                .collect();
            Ok(match response.next_token.filter(|next| !next.is_empty()) {
                Some(next) => Page::with_next(records, next),
                None => Page::last(records),
            })
        })
        .await?;
        Ok(events
            .into_iter()
            .filter(|event| self.is_interesting(event))
            .collect())
    }
}

/// Returns true for event names that only read state.
pub fn is_read_only_event(event_name: &str) -> bool {
    READ_ONLY_EVENT_FRAGMENTS
        .iter()
        .any(|fragment| event_name.contains(fragment))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{is_read_only_event, AuditLogClient, AuditLogSettings};
    use crate::{FetchScope, HttpSettings, Identity, SourceAdapter, SourceError};

    fn identity() -> Identity {
        Identity {
            cluster_id: "abc123".to_string(),
            external_id: "ext-1".to_string(),
            name: "prod-east".to_string(),
            version: "4.15.3".to_string(),
            base_domain: "east.example.com".to_string(),
            infra_id: "infra".to_string(),
            organization_id: None,
            environment: None,
        }
    }

    fn scope(max_pages: usize) -> FetchScope {
        FetchScope {
            window_days: 30,
            since: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            max_pages,
            team_ids: Vec::new(),
            service_ids: Vec::new(),
        }
    }

    fn client_for(base_url: Option<String>) -> AuditLogClient {
        AuditLogClient::new(
            &AuditLogSettings {
                base_url,
                token: Some("audit-token".to_string()),
                ..AuditLogSettings::default()
            },
            &HttpSettings {
                request_timeout_ms: 2_000,
                retry_max_attempts: 1,
                retry_base_delay_ms: 1,
            },
        )
        .expect("client")
    }

    #[test]
    fn unit_is_read_only_event_matches_known_verbs() {
        assert!(is_read_only_event("DescribeInstances"));
        assert!(is_read_only_event("AssumeRoleWithWebIdentity"));
        assert!(!is_read_only_event("TerminateInstances"));
        assert!(!is_read_only_event("PutBucketPolicy"));
    }

    #[tokio::test]
    async fn integration_fetch_filters_read_only_and_operator_events() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/lookup-events");
            then.status(200).json_body(json!({
                "events": [
                    { "event_id": "e1", "event_name": "TerminateInstances", "username": "customer-admin", "event_time": "2024-03-20T08:00:00Z" },
                    { "event_id": "e2", "event_name": "DescribeInstances", "username": "customer-admin", "event_time": "2024-03-20T08:01:00Z" },
                    { "event_id": "e3", "event_name": "DeleteSecurityGroup", "username": "RH-SRE-jdoe", "event_time": "2024-03-20T08:02:00Z" },
                    { "event_id": "e4", "event_name": "DeleteBucket", "event_time": "2024-03-20T08:03:00Z" }
                ]
            }));
        });

        let events = client_for(Some(server.base_url()))
            .fetch(&identity(), &scope(5))
            .await
            .expect("events");
        let ids: Vec<_> = events.iter().map(|event| event.event_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e4"]);
    }

    #[tokio::test]
    async fn regression_fetch_stops_at_page_ceiling_when_tokens_never_end() {
        let server = MockServer::start();
        let endless = server.mock(|when, then| {
            when.method(POST).path("/lookup-events");
            then.status(200).json_body(json!({
                "events": [
                    { "event_id": "e", "event_name": "RunInstances", "event_time": "2024-03-20T08:00:00Z" }
                ],
                "next_token": "again"
            }));
        });

        let events = client_for(Some(server.base_url()))
            .fetch(&identity(), &scope(4))
            .await
            .expect("ceiling is success");
        assert_eq!(events.len(), 4);
        assert_eq!(endless.calls(), 4);
    }

    #[tokio::test]
    async fn unit_fetch_without_endpoint_reports_missing_config() {
        let error = client_for(None)
            .fetch(&identity(), &scope(4))
            .await
            .expect_err("no endpoint");
        assert!(matches!(
            error,
            SourceError::MissingConfig {
                key: "audit_url",
                ..
            }
        ));
    }
}
