use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use opsctx_sources::audit_log::DEFAULT_OPERATOR_USER_PREFIX;
use opsctx_sources::ticket_tracker::{DEFAULT_EXCEPTION_PROJECT, DEFAULT_TICKET_PROJECT};
use opsctx_sources::{
    AuditLogSettings, HttpSettings, IncidentTrackerSettings, RegistrySettings,
    TicketTrackerSettings,
};
use serde::Deserialize;

use crate::report_render::RenderSettings;

pub const CONFIG_ENV: &str = "OPSCTX_CONFIG";
pub const DEFAULT_REGISTRY_URL: &str = "https://api.openshift.com";
pub const DEFAULT_JIRA_URL: &str = "https://issues.redhat.com";
pub const DEFAULT_PAGERDUTY_URL: &str = "https://api.pagerduty.com";
pub const DEFAULT_AUDIT_SEARCH_URL: &str =
    "https://osdsecuritylogs.splunkcloud.com/en-US/app/search/search";
pub const DEFAULT_DASHBOARD_URL: &str = "https://kraken.psi.redhat.com/clusters";

/// Endpoints and credentials for every source, as read from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    pub registry_url: Option<String>,
    pub registry_token: Option<String>,
    pub jira_url: Option<String>,
    pub jira_token: Option<String>,
    pub ticket_project: Option<String>,
    pub exception_project: Option<String>,
    pub pagerduty_url: Option<String>,
    pub pd_user_token: Option<String>,
    pub pd_oauth_token: Option<String>,
    pub team_ids: Vec<String>,
    pub audit_url: Option<String>,
    pub audit_token: Option<String>,
    pub operator_user_prefix: Option<String>,
    pub audit_search_url: Option<String>,
    pub dashboard_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub retry_max_attempts: Option<usize>,
    pub retry_base_delay_ms: Option<u64>,
}

/// Adapter constructor inputs derived from a [`ContextConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub http: HttpSettings,
    pub registry: RegistrySettings,
    pub tickets: TicketTrackerSettings,
    pub incidents: IncidentTrackerSettings,
    pub audit: AuditLogSettings,
}

impl ContextConfig {
    pub fn source_settings(&self) -> SourceSettings {
        let defaults = HttpSettings::default();
        SourceSettings {
            http: HttpSettings {
                request_timeout_ms: self
                    .request_timeout_ms
                    .unwrap_or(defaults.request_timeout_ms),
                retry_max_attempts: self
                    .retry_max_attempts
                    .unwrap_or(defaults.retry_max_attempts),
                retry_base_delay_ms: self
                    .retry_base_delay_ms
                    .unwrap_or(defaults.retry_base_delay_ms),
            },
            registry: RegistrySettings {
                base_url: url_or(&self.registry_url, DEFAULT_REGISTRY_URL),
                token: self.registry_token.clone(),
            },
            tickets: TicketTrackerSettings {
                base_url: url_or(&self.jira_url, DEFAULT_JIRA_URL),
                token: self.jira_token.clone(),
                ticket_project: self
                    .ticket_project
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TICKET_PROJECT.to_string()),
                exception_project: self
                    .exception_project
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EXCEPTION_PROJECT.to_string()),
            },
            incidents: IncidentTrackerSettings {
                base_url: url_or(&self.pagerduty_url, DEFAULT_PAGERDUTY_URL),
                user_token: self.pd_user_token.clone(),
                oauth_token: self.pd_oauth_token.clone(),
            },
            audit: AuditLogSettings {
                base_url: self.audit_url.clone(),
                token: self.audit_token.clone(),
                operator_user_prefix: self
                    .operator_user_prefix
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPERATOR_USER_PREFIX.to_string()),
            },
        }
    }

    /// Link bases for the long format.
    pub fn render_settings(&self, verbose: bool) -> RenderSettings {
        RenderSettings {
            jira_browse_url: url_or(&self.jira_url, DEFAULT_JIRA_URL),
            ticket_project: self
                .ticket_project
                .clone()
                .unwrap_or_else(|| DEFAULT_TICKET_PROJECT.to_string()),
            audit_search_url: url_or(&self.audit_search_url, DEFAULT_AUDIT_SEARCH_URL),
            dashboard_url: url_or(&self.dashboard_url, DEFAULT_DASHBOARD_URL),
            verbose,
        }
    }
}

fn url_or(value: &Option<String>, fallback: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(fallback)
        .trim_end_matches('/')
        .to_string()
}

/// `$HOME/.config/opsctx/config.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".config/opsctx/config.toml"))
}

pub fn parse_context_config(raw: &str) -> Result<ContextConfig> {
    toml::from_str(raw).context("failed to parse opsctx config")
}

/// Loads the config file. An explicit path must exist; a missing default
/// file yields an empty config so every source reports its own missing
/// credentials.
pub fn load_context_config(explicit: Option<&Path>) -> Result<ContextConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.is_file() => path,
            _ => {
                tracing::info!("no opsctx config file found; using defaults");
                return Ok(ContextConfig::default());
            }
        },
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = parse_context_config(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded opsctx config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{
        load_context_config, parse_context_config, ContextConfig, DEFAULT_DASHBOARD_URL,
        DEFAULT_REGISTRY_URL,
    };

    #[test]
    fn unit_parse_context_config_reads_known_keys() {
        let config = parse_context_config(
            r#"
registry_url = "https://api.stage.example.com/"
registry_token = "ocm"
pd_user_token = "pd"
team_ids = ["TEAM1", "TEAM2"]
retry_max_attempts = 5
"#,
        )
        .expect("config");
        assert_eq!(config.team_ids, vec!["TEAM1", "TEAM2"]);
        let settings = config.source_settings();
        assert_eq!(settings.registry.base_url, "https://api.stage.example.com");
        assert_eq!(settings.registry.token.as_deref(), Some("ocm"));
        assert_eq!(settings.incidents.user_token.as_deref(), Some("pd"));
        assert_eq!(settings.http.retry_max_attempts, 5);
        assert_eq!(settings.http.request_timeout_ms, 30_000);
    }

    #[test]
    fn regression_parse_context_config_rejects_unknown_keys() {
        let error = parse_context_config("jira_tokn = \"typo\"").expect_err("unknown key");
        assert!(format!("{error:#}").contains("jira_tokn"));
    }

    #[test]
    fn unit_empty_config_falls_back_to_public_endpoints() {
        let settings = ContextConfig::default().source_settings();
        assert_eq!(settings.registry.base_url, DEFAULT_REGISTRY_URL);
        assert!(settings.registry.token.is_none());
        assert!(settings.audit.base_url.is_none());
        assert_eq!(settings.audit.operator_user_prefix, "RH-SRE-");
    }

    #[test]
    fn unit_render_settings_use_configured_link_bases() {
        let config = parse_context_config(
            r#"
jira_url = "https://jira.internal.example.com/"
audit_search_url = "https://audit.internal.example.com/search"
"#,
        )
        .expect("config");
        let settings = config.render_settings(true);
        assert_eq!(settings.jira_browse_url, "https://jira.internal.example.com");
        assert_eq!(
            settings.audit_search_url,
            "https://audit.internal.example.com/search"
        );
        assert_eq!(settings.dashboard_url, DEFAULT_DASHBOARD_URL);
        assert!(settings.verbose);
    }

    #[test]
    fn functional_load_context_config_reads_explicit_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "jira_token = \"jira\"\n").expect("write");
        let config = load_context_config(Some(&path)).expect("load");
        assert_eq!(config.jira_token.as_deref(), Some("jira"));
    }

    #[test]
    fn regression_load_context_config_requires_explicit_file_to_exist() {
        let dir = tempdir().expect("tempdir");
        let error = load_context_config(Some(&dir.path().join("missing.toml")))
            .expect_err("missing file");
        assert!(format!("{error:#}").contains("failed to read config"));
    }
}
