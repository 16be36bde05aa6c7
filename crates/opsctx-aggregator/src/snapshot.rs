use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use opsctx_sources::{
    AuditEvent, Identity, Incident, IncidentService, LimitedSupportReason, ServiceLogEntry,
    SourceError, SourceKind, TrackerIssue,
};
use serde::{Deserialize, Serialize};

use crate::IncidentOccurrence;

/// What happened to one section during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionStatus {
    Collected { records: usize },
    Failed { error: String },
    Skipped { reason: String },
}

impl SectionStatus {
    pub fn is_collected(&self) -> bool {
        matches!(self, Self::Collected { .. })
    }
}

/// A source that could not contribute to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub message: String,
    /// Missing or rejected credentials rather than an outage.
    pub configuration: bool,
}

impl SourceFailure {
    pub fn from_error(source: SourceKind, error: &SourceError) -> Self {
        Self {
            source,
            message: error.to_string(),
            configuration: error.is_configuration(),
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source.label(), self.message)
    }
}

/// The assembled context of one cluster.
///
/// A `None` slot means the source did not contribute; `sections` records why.
/// `Some(vec![])` is a successful fetch that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub window_days: i64,
    pub identity: Identity,
    pub sections: BTreeMap<SourceKind, SectionStatus>,
    pub limited_support: Option<Vec<LimitedSupportReason>>,
    pub service_logs: Option<Vec<ServiceLogEntry>>,
    pub tickets: Option<Vec<TrackerIssue>>,
    pub support_exceptions: Option<Vec<TrackerIssue>>,
    pub incident_services: Option<Vec<IncidentService>>,
    /// Open incidents keyed by service id.
    pub current_incidents: Option<BTreeMap<String, Vec<Incident>>>,
    /// Windowed incident summary keyed by service id.
    pub incident_history: Option<BTreeMap<String, Vec<IncidentOccurrence>>>,
    pub audit_events: Option<Vec<AuditEvent>>,
}

impl Snapshot {
    pub(crate) fn empty(identity: Identity, generated_at: DateTime<Utc>, window_days: i64) -> Self {
        Self {
            generated_at,
            window_days,
            identity,
            sections: BTreeMap::new(),
            limited_support: None,
            service_logs: None,
            tickets: None,
            support_exceptions: None,
            incident_services: None,
            current_incidents: None,
            incident_history: None,
            audit_events: None,
        }
    }

    pub fn section(&self, kind: SourceKind) -> Option<&SectionStatus> {
        self.sections.get(&kind)
    }

    /// `Some(true)` when the limited-support listing came back empty, `None`
    /// when it could not be fetched.
    pub fn is_fully_supported(&self) -> Option<bool> {
        self.limited_support.as_ref().map(Vec::is_empty)
    }

    pub fn collected_count(&self) -> usize {
        self.sections
            .values()
            .filter(|status| status.is_collected())
            .count()
    }
}

/// A snapshot plus every failure met while building it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReport {
    pub snapshot: Snapshot,
    pub failures: Vec<SourceFailure>,
}

impl ContextReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_configuration_failures(&self) -> bool {
        self.failures.iter().any(|failure| failure.configuration)
    }
}
