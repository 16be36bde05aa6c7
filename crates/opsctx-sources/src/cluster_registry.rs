use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::http_client::{HttpSettings, SourceAuth, SourceHttpClient};
use crate::paging::collect_pages;
use crate::{
    FetchOutcome, FetchScope, Identity, IdentityResolver, LimitedSupportReason, Page,
    ServiceLogEntry, SourceAdapter, SourceError, SourceKind,
};

const SYSTEM: &str = "cluster registry";
const PAGE_SIZE: usize = 100;

/// Connection settings for the cluster registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySettings {
    pub base_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    page: usize,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterVersion {
    #[serde(default)]
    raw_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterDns {
    #[serde(default)]
    base_domain: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionLink {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ClusterItem {
    id: String,
    #[serde(default)]
    external_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: ClusterVersion,
    #[serde(default)]
    dns: ClusterDns,
    #[serde(default)]
    infra_id: String,
    subscription: Option<SubscriptionLink>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitedSupportItem {
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    details: String,
}

#[derive(Debug, Deserialize)]
struct ServiceLogItem {
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: String,
    created_at: DateTime<Utc>,
}

/// Client for cluster lookups, support status and service logs.
#[derive(Clone)]
pub struct ClusterRegistryClient {
    http: Option<SourceHttpClient>,
    environment: String,
}

impl ClusterRegistryClient {
    pub fn new(settings: &RegistrySettings, http: &HttpSettings) -> Result<Self, SourceError> {
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
            environment: environment_for_url(&settings.base_url).to_string(),
        })
    }

    fn http(&self) -> Result<&SourceHttpClient, SourceError> {
        self.http.as_ref().ok_or(SourceError::MissingConfig {
            system: SYSTEM,
            key: "registry_token",
        })
    }

    async fn organization_for(&self, subscription_id: &str) -> Result<String, SourceError> {
        let http = self.http()?;
        let path = format!("/api/accounts_mgmt/v1/subscriptions/{subscription_id}");
        let subscription: Subscription = http
            .request_json("get subscription", || http.get(&path))
            .await?;
        subscription
            .organization_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SourceError::NotFound(format!("organization of {subscription_id}")))
    }

    /// Lists every limited-support reason recorded for the cluster.
    pub async fn limited_support_reasons(
        &self,
        cluster_id: &str,
        max_pages: usize,
    ) -> FetchOutcome<LimitedSupportReason> {
        let http = self.http()?;
        let path = format!("/api/clusters_mgmt/v1/clusters/{cluster_id}/limited_support_reasons");
        collect_pages("limited support reasons", max_pages, |token| {
            let path = path.clone();
            async move {
                let page_number = page_from_token(token.as_deref());
                let response: ListResponse<LimitedSupportItem> = http
                    .request_json("list limited support reasons", || {
                        http.get(&path).query(&[
                            ("page", page_number.to_string()),
                            ("size", PAGE_SIZE.to_string()),
                        ])
                    })
                    .await?;
                Ok(list_page(response, page_number, |item| LimitedSupportReason {
                    id: item.id,
                    summary: item.summary,
                    details: item.details,
                }))
            }
        })
        .await
    }

    /// Lists the service logs sent to the cluster, newest first.
    pub async fn service_logs(
        &self,
        external_id: &str,
        max_pages: usize,
    ) -> FetchOutcome<ServiceLogEntry> {
        let http = self.http()?;
        let search = format!("cluster_uuid = '{}'", escape_search_literal(external_id));
        collect_pages("service logs", max_pages, |token| {
            let search = search.clone();
            async move {
                let page_number = page_from_token(token.as_deref());
                let response: ListResponse<ServiceLogItem> = http
                    .request_json("list service logs", || {
                        http.get("/api/service_logs/v1/cluster_logs").query(&[
                            ("search", search.clone()),
                            ("orderBy", "created_at desc".to_string()),
                            ("page", page_number.to_string()),
                            ("size", PAGE_SIZE.to_string()),
                        ])
                    })
                    .await?;
                Ok(list_page(response, page_number, |item| ServiceLogEntry {
                    id: item.id,
                    summary: item.summary,
                    description: item.description,
                    severity: item.severity,
                    created_at: item.created_at,
                }))
            }
        })
        .await
    }
}

#[async_trait]
impl IdentityResolver for ClusterRegistryClient {
    async fn resolve(&self, key: &str) -> Result<Identity, SourceError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SourceError::MissingScope("cluster key is empty".to_string()));
        }
        let http = self.http()?;
        let literal = escape_search_literal(key);
        let search = format!("id = '{literal}' or external_id = '{literal}' or name = '{literal}'");
        let response: ListResponse<ClusterItem> = http
            .request_json("search clusters", || {
                http.get("/api/clusters_mgmt/v1/clusters")
                    .query(&[("search", search.as_str()), ("size", "2")])
            })
            .await?;

        let matches = response.total.max(response.items.len());
        let mut items = response.items;
        let cluster = match (items.pop(), items.is_empty(), matches) {
            (None, _, _) => return Err(SourceError::NotFound(key.to_string())),
            (Some(cluster), true, 1) => cluster,
            _ => {
                return Err(SourceError::Ambiguous {
                    key: key.to_string(),
                    matches,
                })
            }
        };

        let organization_id = match cluster.subscription.as_ref() {
            Some(subscription) => match self.organization_for(&subscription.id).await {
                Ok(organization_id) => Some(organization_id),
                Err(error) => {
                    tracing::warn!(cluster_id = cluster.id.as_str(), %error, "failed to resolve organization");
                    None
                }
            },
            None => None,
        };

        Ok(Identity {
            cluster_id: cluster.id,
            external_id: cluster.external_id,
            name: cluster.name,
            version: cluster.version.raw_id,
            base_domain: cluster.dns.base_domain,
            infra_id: cluster.infra_id,
            organization_id,
            environment: Some(self.environment.clone()),
        })
    }
}

/// Adapter over [`ClusterRegistryClient::limited_support_reasons`].
#[derive(Clone)]
pub struct LimitedSupportSource {
    client: Arc<ClusterRegistryClient>,
}

impl LimitedSupportSource {
    pub fn new(client: Arc<ClusterRegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for LimitedSupportSource {
    type Record = LimitedSupportReason;

    fn kind(&self) -> SourceKind {
        SourceKind::LimitedSupport
    }

    async fn fetch(&self, identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        self.client
            .limited_support_reasons(&identity.cluster_id, scope.max_pages)
            .await
    }
}

/// Adapter over [`ClusterRegistryClient::service_logs`].
#[derive(Clone)]
pub struct ServiceLogSource {
    client: Arc<ClusterRegistryClient>,
}

impl ServiceLogSource {
    pub fn new(client: Arc<ClusterRegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for ServiceLogSource {
    type Record = ServiceLogEntry;

    fn kind(&self) -> SourceKind {
        SourceKind::ServiceLogs
    }

    async fn fetch(&self, identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record> {
        self.client
            .service_logs(&identity.external_id, scope.max_pages)
            .await
    }
}

/// Names the registry environment from its API URL.
pub fn environment_for_url(base_url: &str) -> &'static str {
    let lowered = base_url.to_ascii_lowercase();
    if lowered.contains("integration") {
        "integration"
    } else if lowered.contains("stage") {
        "stage"
    } else {
        "production"
    }
}

fn page_from_token(token: Option<&str>) -> usize {
    token
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|page| *page > 0)
        .unwrap_or(1)
}

fn list_page<I, T>(
    response: ListResponse<I>,
    requested_page: usize,
    convert: impl FnMut(I) -> T,
) -> Page<T> {
    let page_number = if response.page == 0 {
        requested_page
    } else {
        response.page
    };
    let seen = page_number.saturating_mul(PAGE_SIZE);
    let has_more = !response.items.is_empty() && seen < response.total;
    let records = response.items.into_iter().map(convert).collect();
    if has_more {
        Page::with_next(records, (page_number + 1).to_string())
    } else {
        Page::last(records)
    }
}

fn escape_search_literal(value: &str) -> String {
    value.replace('\'', "''")
}
