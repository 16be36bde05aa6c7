use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::http_client::{HttpSettings, SourceAuth, SourceHttpClient};
use crate::paging::{collect_pages, offset_token, parse_offset_token};
use crate::{
    FetchOutcome, FetchScope, Identity, Incident, IncidentService, Page, SourceAdapter,
    SourceError, SourceKind,
};

const SYSTEM: &str = "incident tracker";
const SERVICE_PAGE_SIZE: usize = 100;
const CURRENT_PAGE_SIZE: usize = 25;
const HISTORY_PAGE_SIZE: usize = 100;

/// Connection settings for the incident tracker. A user token wins over an
/// OAuth token when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentTrackerSettings {
    pub base_url: String,
    pub user_token: Option<String>,
    pub oauth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceListResponse {
    #[serde(default)]
    services: Vec<ServiceItem>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct ServiceItem {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct IncidentListResponse {
    #[serde(default)]
    incidents: Vec<IncidentItem>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct IncidentItem {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    created_at: String,
}

/// Which incidents a listing asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentQuery {
    /// Open incidents, most urgent first.
    Current,
    /// Every incident created after the window start, newest first.
    History,
}

impl IncidentQuery {
    fn statuses(self) -> &'static [&'static str] {
        match self {
            Self::Current => &["triggered", "acknowledged"],
            Self::History => &["resolved", "triggered", "acknowledged"],
        }
    }

    fn sort_by(self) -> &'static str {
        match self {
            Self::Current => "urgency:desc",
            Self::History => "created_at:desc",
        }
    }

    fn page_size(self) -> usize {
        match self {
            Self::Current => CURRENT_PAGE_SIZE,
            Self::History => HISTORY_PAGE_SIZE,
        }
    }
}

/// Service and incident listing client for the incident tracker.
#[derive(Clone)]
pub struct IncidentTrackerClient {
    http: Option<SourceHttpClient>,
}

impl IncidentTrackerClient {
    pub fn new(
        settings: &IncidentTrackerSettings,
        http: &HttpSettings,
    ) -> Result<Self, SourceError> {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        };
        let auth = non_empty(&settings.user_token)
            .map(SourceAuth::Token)
            .or_else(|| non_empty(&settings.oauth_token).map(SourceAuth::Bearer));
        let client = auth
            .map(|auth| SourceHttpClient::new(SYSTEM, &settings.base_url, &auth, http))
            .transpose()?;
        Ok(Self { http: client })
    }

    fn http(&self) -> Result<&SourceHttpClient, SourceError> {
        self.http.as_ref().ok_or(SourceError::MissingConfig {
            system: SYSTEM,
            key: "pd_user_token or pd_oauth_token",
        })
    }

    /// Services whose name matches `query`, optionally limited to teams.
    pub async fn services(
        &self,
        query: &str,
        team_ids: &[String],
        max_pages: usize,
    ) -> FetchOutcome<IncidentService> {
        let http = self.http()?;
        collect_pages("incident services", max_pages, |token| async move {
            let offset = parse_offset_token(token.as_deref());
            let response: ServiceListResponse = http
                .request_json("list services", || {
                    let mut params = vec![
                        ("query", query.to_string()),
                        ("limit", SERVICE_PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ];
                    params.extend(team_ids.iter().map(|id| ("team_ids[]", id.clone())));
                    http.get("/services").query(&params)
                })
                .await?;
            let next_offset = offset + response.services.len();
            let has_more = response.more && !response.services.is_empty();
            let records = response
                .services
                .into_iter()
                .map(|item| IncidentService {
                    id: item.id,
                    name: item.name,
                })
                .collect();
            Ok(if has_more {
                Page::with_next(records, offset_token(next_offset))
            } else {
                Page::last(records)
            })
        })
        .await
    }

    /// Incidents of one service.
    pub async fn incidents(
        &self,
        service_id: &str,
        query: IncidentQuery,
        since: Option<DateTime<Utc>>,
        max_pages: usize,
    ) -> FetchOutcome<Incident> {
        let http = self.http()?;
        let since_text = since.map(|value| value.to_rfc3339_opts(SecondsFormat::Secs, true));
        let since = since_text.as_deref();
        collect_pages("incidents", max_pages, |token| async move {
            let offset = parse_offset_token(token.as_deref());
            let response: IncidentListResponse = http
                .request_json("list incidents", || {
                    let mut params = vec![
                        ("service_ids[]", service_id.to_string()),
                        ("sort_by", query.sort_by().to_string()),
                        ("limit", query.page_size().to_string()),
                        ("offset", offset.to_string()),
                    ];
                    params.extend(
                        query
                            .statuses()
                            .iter()
                            .map(|status| ("statuses[]", status.to_string())),
                    );
                    if let Some(since) = since {
                        params.push(("since", since.to_string()));
                    }
                    http.get("/incidents").query(&params)
                })
                .await?;
            let next_offset = offset + response.incidents.len();
            let has_more = response.more && !response.incidents.is_empty();
            let records = response
                .incidents
                .into_iter()
                .map(|item| Incident {
                    id: item.id,
                    title: item.title,
                    urgency: item.urgency,
                    status: item.status,
                    created_at: item.created_at,
                    service_id: service_id.to_string(),
                })
                .collect();
            Ok(if has_more {
                Page::with_next(records, offset_token(next_offset))
            } else {
                Page::last(records)
            })
        })
        .await
    }

    async fn incidents_for_services(
        &self,
        service_ids: &[String],
        query: IncidentQuery,
        since: Option<DateTime<Utc>>,
        max_pages: usize,
    ) -> FetchOutcome<Incident> {
        let mut incidents = Vec::new();
        for service_id in service_ids {
            incidents.extend(self.incidents(service_id, query, since, max_pages).await?);
        }
        Ok(incidents)
    }
}

/// Incident services matching the cluster's base domain.
#[derive(Clone)]
pub struct IncidentServiceSource {
    client: Arc<IncidentTrackerClient>,
}

impl IncidentServiceSource {
    pub fn new(client: Arc<IncidentTrackerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for IncidentServiceSource {
    type Record = IncidentService;

    fn kind(&self) -> SourceKind {
        SourceKind::IncidentServices
    }

    async fn fetch(&self, identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        if identity.base_domain.trim().is_empty() {
            return Err(SourceError::MissingScope(
                "cluster has no base domain to match services".to_string(),
            ));
        }
        self.client
            .services(&identity.base_domain, &scope.team_ids, scope.max_pages)
            .await
    }
}

/// Open incidents for every service in the scope.
#[derive(Clone)]
pub struct CurrentIncidentSource {
    client: Arc<IncidentTrackerClient>,
}

impl CurrentIncidentSource {
    pub fn new(client: Arc<IncidentTrackerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for CurrentIncidentSource {
    type Record = Incident;

    fn kind(&self) -> SourceKind {
        SourceKind::CurrentIncidents
    }

    async fn fetch(&self, _identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        self.client
            .incidents_for_services(&scope.service_ids, IncidentQuery::Current, None, scope.max_pages)
            .await
    }
}

/// Incidents of every service in the scope created since the window start.
#[derive(Clone)]
pub struct IncidentHistorySource {
    client: Arc<IncidentTrackerClient>,
}

impl IncidentHistorySource {
    pub fn new(client: Arc<IncidentTrackerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for IncidentHistorySource {
    type Record = Incident;

    fn kind(&self) -> SourceKind {
        SourceKind::IncidentHistory
    }

    async fn fetch(&self, _identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        self.client
            .incidents_for_services(
                &scope.service_ids,
                IncidentQuery::History,
                Some(scope.since),
                scope.max_pages,
            )
            .await
    }
}
