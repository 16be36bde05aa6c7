use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opsctx_core::{is_within_window, window_start, Clock};
use opsctx_sources::{
    AuditEvent, FetchOutcome, FetchScope, Identity, IdentityResolver, Incident, IncidentService,
    LimitedSupportReason, ServiceLogEntry, SourceAdapter, SourceError, SourceKind, TrackerIssue,
    WindowedRecord,
};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::incident_summary::{group_by_scope, summarize_incidents};
use crate::snapshot::{ContextReport, SectionStatus, Snapshot, SourceFailure};

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_MAX_PAGES: usize = 40;

const EXPENSIVE_SKIP_REASON: &str = "expensive source not requested";
const NO_SERVICES_SKIP_REASON: &str = "incident services unavailable";

/// Caller-controlled knobs for one aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Look-back window in days; must be positive.
    pub window_days: i64,
    /// Page ceiling applied to every paged source; must be positive.
    pub max_pages: usize,
    pub team_ids: Vec<String>,
    /// Also run incident history and audit log.
    pub include_expensive: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            max_pages: DEFAULT_MAX_PAGES,
            team_ids: Vec::new(),
            include_expensive: false,
        }
    }
}

impl AggregateOptions {
    pub fn validate(&self) -> Result<(), AggregateError> {
        if self.window_days <= 0 {
            return Err(AggregateError::InvalidOptions(format!(
                "window must be a positive number of days, got {}",
                self.window_days
            )));
        }
        if self.max_pages == 0 {
            return Err(AggregateError::InvalidOptions(
                "page ceiling must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Failures that prevent any snapshot from being produced.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("invalid aggregation options: {0}")]
    InvalidOptions(String),
    #[error("failed to resolve cluster '{key}': {source}")]
    Identity {
        key: String,
        #[source]
        source: SourceError,
    },
}

/// Every adapter the aggregator fans out to.
#[derive(Clone)]
pub struct SourceSet {
    pub resolver: Arc<dyn IdentityResolver>,
    pub limited_support: Arc<dyn SourceAdapter<Record = LimitedSupportReason>>,
    pub service_logs: Arc<dyn SourceAdapter<Record = ServiceLogEntry>>,
    pub tickets: Arc<dyn SourceAdapter<Record = TrackerIssue>>,
    pub support_exceptions: Arc<dyn SourceAdapter<Record = TrackerIssue>>,
    pub incident_services: Arc<dyn SourceAdapter<Record = IncidentService>>,
    pub current_incidents: Arc<dyn SourceAdapter<Record = Incident>>,
    pub incident_history: Arc<dyn SourceAdapter<Record = Incident>>,
    pub audit_log: Arc<dyn SourceAdapter<Record = AuditEvent>>,
}

enum SourceYield {
    LimitedSupport(FetchOutcome<LimitedSupportReason>),
    ServiceLogs(FetchOutcome<ServiceLogEntry>),
    Tickets(FetchOutcome<TrackerIssue>),
    SupportExceptions(FetchOutcome<TrackerIssue>),
    IncidentServices(FetchOutcome<IncidentService>),
    CurrentIncidents(FetchOutcome<Incident>),
    IncidentHistory(FetchOutcome<Incident>),
    AuditLog(FetchOutcome<AuditEvent>),
}

impl SourceYield {
    fn kind(&self) -> SourceKind {
        match self {
            Self::LimitedSupport(_) => SourceKind::LimitedSupport,
            Self::ServiceLogs(_) => SourceKind::ServiceLogs,
            Self::Tickets(_) => SourceKind::Tickets,
            Self::SupportExceptions(_) => SourceKind::SupportExceptions,
            Self::IncidentServices(_) => SourceKind::IncidentServices,
            Self::CurrentIncidents(_) => SourceKind::CurrentIncidents,
            Self::IncidentHistory(_) => SourceKind::IncidentHistory,
            Self::AuditLog(_) => SourceKind::AuditLog,
        }
    }
}

/// In-flight fetch tasks. Dropping it aborts whatever is still running.
struct FetchTasks {
    identity: Arc<Identity>,
    tasks: JoinSet<SourceYield>,
    pending: BTreeSet<SourceKind>,
}

impl FetchTasks {
    fn new(identity: Arc<Identity>) -> Self {
        Self {
            identity,
            tasks: JoinSet::new(),
            pending: BTreeSet::new(),
        }
    }

    fn spawn<R, W>(
        &mut self,
        adapter: &Arc<dyn SourceAdapter<Record = R>>,
        scope: &Arc<FetchScope>,
        wrap: W,
    ) where
        R: Send + 'static,
        W: FnOnce(FetchOutcome<R>) -> SourceYield + Send + 'static,
    {
        let kind = adapter.kind();
        let adapter = Arc::clone(adapter);
        let identity = Arc::clone(&self.identity);
        let scope = Arc::clone(scope);
        self.pending.insert(kind);
        self.tasks
            .spawn(async move { wrap(adapter.fetch(&identity, &scope).await) });
    }

    async fn next(&mut self) -> Option<SourceYield> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(yielded) => {
                    self.pending.remove(&yielded.kind());
                    return Some(yielded);
                }
                Err(error) => warn!(%error, "source fetch task ended abnormally"),
            }
        }
        None
    }

    /// Sources whose task ended without reporting.
    fn unreported(self) -> BTreeSet<SourceKind> {
        self.pending
    }
}

/// Builds snapshots by querying every source concurrently and tolerating
/// individual source failures.
pub struct ContextAggregator {
    sources: SourceSet,
    clock: Arc<dyn Clock>,
}

impl ContextAggregator {
    pub fn new(sources: SourceSet, clock: Arc<dyn Clock>) -> Self {
        Self { sources, clock }
    }

    /// Resolves `key` and gathers the cluster's context.
    ///
    /// Only invalid options and identity resolution are fatal. Every other
    /// failure becomes a [`SourceFailure`] next to a snapshot whose slot for
    /// that source is empty.
    #[instrument(skip(self, options), fields(window_days = options.window_days, full = options.include_expensive))]
    pub async fn aggregate(
        &self,
        key: &str,
        options: &AggregateOptions,
    ) -> Result<ContextReport, AggregateError> {
        options.validate()?;
        let identity = self
            .sources
            .resolver
            .resolve(key)
            .await
            .map_err(|source| AggregateError::Identity {
                key: key.to_string(),
                source,
            })?;
        info!(cluster_id = %identity.cluster_id, name = %identity.name, "resolved cluster");

        let generated_at = self.clock.now();
        let since = window_start(self.clock.as_ref(), options.window_days);
        let scope = Arc::new(FetchScope {
            window_days: options.window_days,
            since,
            max_pages: options.max_pages,
            team_ids: options.team_ids.clone(),
            service_ids: Vec::new(),
        });

        let identity = Arc::new(identity);
        let mut assembly = Assembly::new(
            Snapshot::empty((*identity).clone(), generated_at, options.window_days),
            since,
        );
        let mut tasks = FetchTasks::new(Arc::clone(&identity));
        let sources = &self.sources;
        tasks.spawn(&sources.limited_support, &scope, SourceYield::LimitedSupport);
        tasks.spawn(&sources.service_logs, &scope, SourceYield::ServiceLogs);
        tasks.spawn(&sources.tickets, &scope, SourceYield::Tickets);
        tasks.spawn(&sources.support_exceptions, &scope, SourceYield::SupportExceptions);
        tasks.spawn(&sources.incident_services, &scope, SourceYield::IncidentServices);
        if options.include_expensive {
            tasks.spawn(&sources.audit_log, &scope, SourceYield::AuditLog);
        } else {
            assembly.skip(SourceKind::AuditLog, EXPENSIVE_SKIP_REASON);
            assembly.skip(SourceKind::IncidentHistory, EXPENSIVE_SKIP_REASON);
        }

        while let Some(yielded) = tasks.next().await {
            match yielded {
                SourceYield::IncidentServices(Ok(services)) => {
                    let incident_scope = Arc::new(FetchScope {
                        service_ids: services.iter().map(|service| service.id.clone()).collect(),
                        ..(*scope).clone()
                    });
                    debug!(services = services.len(), "incident services discovered");
                    tasks.spawn(
                        &sources.current_incidents,
                        &incident_scope,
                        SourceYield::CurrentIncidents,
                    );
                    if options.include_expensive {
                        tasks.spawn(
                            &sources.incident_history,
                            &incident_scope,
                            SourceYield::IncidentHistory,
                        );
                    }
                    assembly.scopes = incident_scope.service_ids.clone();
                    assembly.collected(SourceKind::IncidentServices, services.len());
                    assembly.snapshot.incident_services = Some(services);
                }
                SourceYield::IncidentServices(Err(error)) => {
                    assembly.fail(SourceKind::IncidentServices, &error);
                    assembly.skip_incident_sources(options.include_expensive);
                }
                other => assembly.absorb(other),
            }
        }

        let unreported = tasks.unreported();
        for kind in &unreported {
            assembly.fail_with(
                *kind,
                "fetch task ended before reporting a result".to_string(),
                false,
            );
        }
        if unreported.contains(&SourceKind::IncidentServices) {
            assembly.skip_incident_sources(options.include_expensive);
        }

        let report = assembly.finish();
        info!(
            collected = report.snapshot.collected_count(),
            failures = report.failures.len(),
            "aggregation finished"
        );
        Ok(report)
    }
}

/// Drops records created at or before `since`. Records without a readable
/// creation time are kept when `keep_unreadable` is set.
pub fn retain_within_window<T: WindowedRecord>(
    records: Vec<T>,
    since: DateTime<Utc>,
    keep_unreadable: bool,
) -> Vec<T> {
    records
        .into_iter()
        .filter(|record| match record.created_at() {
            Some(created_at) => is_within_window(created_at, since),
            None => keep_unreadable,
        })
        .collect()
}

struct Assembly {
    snapshot: Snapshot,
    failures: Vec<SourceFailure>,
    since: DateTime<Utc>,
    scopes: Vec<String>,
}

impl Assembly {
    fn new(snapshot: Snapshot, since: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            failures: Vec::new(),
            since,
            scopes: Vec::new(),
        }
    }

    fn collected(&mut self, kind: SourceKind, records: usize) {
        debug!(source = %kind, records, "source collected");
        self.snapshot
            .sections
            .insert(kind, SectionStatus::Collected { records });
    }

    fn skip(&mut self, kind: SourceKind, reason: &str) {
        debug!(source = %kind, reason, "source skipped");
        self.snapshot.sections.insert(
            kind,
            SectionStatus::Skipped {
                reason: reason.to_string(),
            },
        );
    }

    /// Incident listings need discovered services; without them neither runs.
    fn skip_incident_sources(&mut self, include_expensive: bool) {
        self.skip(SourceKind::CurrentIncidents, NO_SERVICES_SKIP_REASON);
        if include_expensive {
            self.skip(SourceKind::IncidentHistory, NO_SERVICES_SKIP_REASON);
        }
    }

    fn fail(&mut self, kind: SourceKind, error: &SourceError) {
        self.fail_with(kind, error.to_string(), error.is_configuration());
    }

    fn fail_with(&mut self, kind: SourceKind, message: String, configuration: bool) {
        warn!(source = %kind, error = %message, "source failed");
        self.snapshot.sections.insert(
            kind,
            SectionStatus::Failed {
                error: message.clone(),
            },
        );
        self.failures.push(SourceFailure {
            source: kind,
            message,
            configuration,
        });
    }

    fn absorb(&mut self, yielded: SourceYield) {
        let kind = yielded.kind();
        match yielded {
            SourceYield::LimitedSupport(outcome) => {
                if let Some(reasons) = self.record(kind, outcome) {
                    self.snapshot.limited_support = Some(reasons);
                }
            }
            SourceYield::ServiceLogs(outcome) => {
                let since = self.since;
                let outcome = outcome.map(|logs| retain_within_window(logs, since, false));
                if let Some(logs) = self.record(kind, outcome) {
                    self.snapshot.service_logs = Some(logs);
                }
            }
            SourceYield::Tickets(outcome) => {
                if let Some(issues) = self.record(kind, outcome) {
                    self.snapshot.tickets = Some(issues);
                }
            }
            SourceYield::SupportExceptions(outcome) => {
                if let Some(issues) = self.record(kind, outcome) {
                    self.snapshot.support_exceptions = Some(issues);
                }
            }
            SourceYield::IncidentServices(outcome) => {
                if let Some(services) = self.record(kind, outcome) {
                    self.snapshot.incident_services = Some(services);
                }
            }
            SourceYield::CurrentIncidents(outcome) => {
                if let Some(incidents) = self.record(kind, outcome) {
                    self.snapshot.current_incidents = Some(group_by_scope(incidents, &self.scopes));
                }
            }
            SourceYield::IncidentHistory(outcome) => self.absorb_history(outcome),
            SourceYield::AuditLog(outcome) => {
                if let Some(events) = self.record(kind, outcome) {
                    self.snapshot.audit_events = Some(events);
                }
            }
        }
    }

    fn absorb_history(&mut self, outcome: FetchOutcome<Incident>) {
        let incidents = match outcome {
            Ok(incidents) => retain_within_window(incidents, self.since, true),
            Err(error) => {
                self.fail(SourceKind::IncidentHistory, &error);
                return;
            }
        };
        let count = incidents.len();
        match summarize_incidents(&group_by_scope(incidents, &self.scopes)) {
            Ok(summary) => {
                self.collected(SourceKind::IncidentHistory, count);
                self.snapshot.incident_history = Some(summary);
            }
            Err(error) => self.fail_with(SourceKind::IncidentHistory, error.to_string(), false),
        }
    }

    fn record<T>(&mut self, kind: SourceKind, outcome: FetchOutcome<T>) -> Option<Vec<T>> {
        match outcome {
            Ok(records) => {
                self.collected(kind, records.len());
                Some(records)
            }
            Err(error) => {
                self.fail(kind, &error);
                None
            }
        }
    }

    fn finish(mut self) -> ContextReport {
        self.failures.sort_by_key(|failure| failure.source);
        ContextReport {
            snapshot: self.snapshot,
            failures: self.failures,
        }
    }
}
