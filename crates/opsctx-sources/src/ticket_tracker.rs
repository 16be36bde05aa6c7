use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::http_client::{HttpSettings, SourceAuth, SourceHttpClient};
use crate::paging::{collect_pages, offset_token, parse_offset_token};
use crate::{
    FetchOutcome, FetchScope, Identity, Page, SourceAdapter, SourceError, SourceKind, TrackerIssue,
};

const SYSTEM: &str = "ticket tracker";
const PAGE_SIZE: usize = 50;
const SEARCH_FIELDS: &str = "summary,issuetype,priority,status,created";
pub const DEFAULT_TICKET_PROJECT: &str = "OpenShift Hosted SRE Support";
pub const DEFAULT_EXCEPTION_PROJECT: &str = "Support Exceptions";

/// Connection settings for the ticket tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketTrackerSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub ticket_project: String,
    pub exception_project: String,
}

impl Default for TicketTrackerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            ticket_project: DEFAULT_TICKET_PROJECT.to_string(),
            exception_project: DEFAULT_EXCEPTION_PROJECT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    start_at: usize,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<IssueItem>,
}

#[derive(Debug, Deserialize)]
struct IssueItem {
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct NamedField {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    issuetype: Option<NamedField>,
    #[serde(default)]
    priority: Option<NamedField>,
    #[serde(default)]
    status: Option<NamedField>,
    #[serde(default)]
    created: String,
}

impl From<IssueItem> for TrackerIssue {
    fn from(item: IssueItem) -> Self {
        let name = |field: Option<NamedField>| field.map(|value| value.name).unwrap_or_default();
        Self {
            key: item.key,
            summary: item.fields.summary,
            issue_type: name(item.fields.issuetype),
            priority: name(item.fields.priority),
            status: name(item.fields.status),
            created: item.fields.created,
        }
    }
}

/// Query-language search client for the ticket tracker.
#[derive(Clone)]
pub struct TicketTrackerClient {
    http: Option<SourceHttpClient>,
    ticket_project: String,
    exception_project: String,
}

impl TicketTrackerClient {
    pub fn new(settings: &TicketTrackerSettings, http: &HttpSettings) -> Result<Self, SourceError> {
        let client = settings
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                SourceHttpClient::new(
                    SYSTEM,
                    &settings.base_url,
                    &SourceAuth::Bearer(token.to_string()),
                    http,
                )
            })
            .transpose()?;
        Ok(Self {
            http: client,
            ticket_project: settings.ticket_project.clone(),
            exception_project: settings.exception_project.clone(),
        })
    }

    fn http(&self) -> Result<&SourceHttpClient, SourceError> {
        self.http.as_ref().ok_or(SourceError::MissingConfig {
            system: SYSTEM,
            key: "jira_token",
        })
    }

    /// Runs `jql` to completion, `PAGE_SIZE` issues per request.
    pub async fn search(&self, jql: &str, max_pages: usize) -> FetchOutcome<TrackerIssue> {
        let http = self.http()?;
        collect_pages("ticket search", max_pages, |token| async move {
            let start_at = parse_offset_token(token.as_deref());
            let response: SearchResponse = http
                .request_json("search issues", || {
                    http.get("/rest/api/2/search").query(&[
                        ("jql", jql.to_string()),
                        ("startAt", start_at.to_string()),
                        ("maxResults", PAGE_SIZE.to_string()),
                        ("fields", SEARCH_FIELDS.to_string()),
                    ])
                })
                .await?;
            let next_start = response.start_at.max(start_at) + response.issues.len();
            let has_more = !response.issues.is_empty() && next_start < response.total;
            let records = response.issues.into_iter().map(TrackerIssue::from).collect();
            Ok(if has_more {
                Page::with_next(records, offset_token(next_start))
            } else {
                Page::last(records)
            })
        })
        .await
    }

    /// Support tickets filed against either cluster identifier, newest first.
    pub fn cluster_tickets_query(&self, identity: &Identity) -> String {
        let project = escape_jql(&self.ticket_project);
        format!(
            "(project = \"{project}\" AND \"Cluster ID\" ~ \"{}\") OR (project = \"{project}\" AND \"Cluster ID\" ~ \"{}\") ORDER BY created DESC",
            escape_jql(&identity.external_id),
            escape_jql(&identity.cluster_id),
        )
    }

    /// Approved, unresolved support exceptions for the organization.
    pub fn support_exceptions_query(&self, organization_id: &str) -> String {
        format!(
            "project = \"{}\" AND type = Story AND Status = Approved AND Resolution = Unresolved AND \"Customer Name\" ~ \"{}\"",
            escape_jql(&self.exception_project),
            escape_jql(organization_id),
        )
    }
}

/// Support tickets for the cluster.
#[derive(Clone)]
pub struct ClusterTicketSource {
    client: Arc<TicketTrackerClient>,
}

impl ClusterTicketSource {
    pub fn new(client: Arc<TicketTrackerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for ClusterTicketSource {
    type Record = TrackerIssue;

    fn kind(&self) -> SourceKind {
        SourceKind::Tickets
    }

    async fn fetch(&self, identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        let jql = self.client.cluster_tickets_query(identity);
        self.client.search(&jql, scope.max_pages).await
    }
}

/// Support exceptions for the cluster's organization.
#[derive(Clone)]
pub struct SupportExceptionSource {
    client: Arc<TicketTrackerClient>,
}

impl SupportExceptionSource {
    pub fn new(client: Arc<TicketTrackerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for SupportExceptionSource {
    type Record = TrackerIssue;

    fn kind(&self) -> SourceKind {
        SourceKind::SupportExceptions
    }

    async fn fetch(&self, identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        let organization_id = identity
            .organization_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                SourceError::MissingScope("organization id was not resolved".to_string())
            })?;
        let jql = self.client.support_exceptions_query(organization_id);
        self.client.search(&jql, scope.max_pages).await
    }
}

fn escape_jql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
