use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The resolved subject of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub cluster_id: String,
    pub external_id: String,
    pub name: String,
    pub version: String,
    pub base_domain: String,
    pub infra_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitedSupportReason {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLogEntry {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    pub created_at: DateTime<Utc>,
}

/// A ticket-tracker issue. `created` keeps the tracker's own timestamp text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub key: String,
    pub summary: String,
    pub issue_type: String,
    pub priority: String,
    pub status: String,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentService {
    pub id: String,
    pub name: String,
}

/// A raw incident. `created_at` is the provider's RFC 3339 text, parsed only
/// when summarizing so malformed values surface as errors there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub urgency: String,
    #[serde(default)]
    pub status: String,
    pub created_at: String,
    pub service_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub event_time: DateTime<Utc>,
}

/// Records that carry a creation time usable for window filtering.
pub trait WindowedRecord {
    /// Creation time, or `None` when the record's timestamp cannot be read.
    fn created_at(&self) -> Option<DateTime<Utc>>;
}

impl WindowedRecord for ServiceLogEntry {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl WindowedRecord for Incident {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.created_at.trim())
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }
}

/// Names every data section of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LimitedSupport,
    ServiceLogs,
    Tickets,
    SupportExceptions,
    IncidentServices,
    CurrentIncidents,
    IncidentHistory,
    AuditLog,
}

impl SourceKind {
    pub const ALL: [SourceKind; 8] = [
        Self::LimitedSupport,
        Self::ServiceLogs,
        Self::Tickets,
        Self::SupportExceptions,
        Self::IncidentServices,
        Self::CurrentIncidents,
        Self::IncidentHistory,
        Self::AuditLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LimitedSupport => "limited_support",
            Self::ServiceLogs => "service_logs",
            Self::Tickets => "tickets",
            Self::SupportExceptions => "support_exceptions",
            Self::IncidentServices => "incident_services",
            Self::CurrentIncidents => "current_incidents",
            Self::IncidentHistory => "incident_history",
            Self::AuditLog => "audit_log",
        }
    }

    /// Human readable section title.
    pub fn label(self) -> &'static str {
        match self {
            Self::LimitedSupport => "limited support reasons",
            Self::ServiceLogs => "service logs",
            Self::Tickets => "support tickets",
            Self::SupportExceptions => "support exceptions",
            Self::IncidentServices => "incident services",
            Self::CurrentIncidents => "current incidents",
            Self::IncidentHistory => "historical incidents",
            Self::AuditLog => "audit log events",
        }
    }

    /// Expensive sources only run when the caller opts in.
    pub fn is_expensive(self) -> bool {
        matches!(self, Self::IncidentHistory | Self::AuditLog)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call query parameters shared by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchScope {
    pub window_days: i64,
    /// Records must be created strictly after this instant.
    pub since: DateTime<Utc>,
    /// Hard ceiling on pages requested by one adapter call.
    pub max_pages: usize,
    pub team_ids: Vec<String>,
    /// Incident services discovered for the identity.
    pub service_ids: Vec<String>,
}
