use std::sync::Arc;

use opsctx_aggregator::SourceSet;
use opsctx_sources::{
    AuditLogClient, ClusterRegistryClient, ClusterTicketSource, CurrentIncidentSource,
    IncidentHistorySource, IncidentServiceSource, IncidentTrackerClient, LimitedSupportSource,
    ServiceLogSource, SourceError, SupportExceptionSource, TicketTrackerClient,
};

use crate::context_config::SourceSettings;

/// Builds one HTTP adapter per source. Missing credentials are not an error
/// here; the affected sources report them when fetched.
pub fn build_source_set(settings: &SourceSettings) -> Result<SourceSet, SourceError> {
    let registry = Arc::new(ClusterRegistryClient::new(&settings.registry, &settings.http)?);
    let tickets = Arc::new(TicketTrackerClient::new(&settings.tickets, &settings.http)?);
    let incidents = Arc::new(IncidentTrackerClient::new(
        &settings.incidents,
        &settings.http,
    )?);
    let audit = Arc::new(AuditLogClient::new(&settings.audit, &settings.http)?);

    Ok(SourceSet {
        resolver: registry.clone(),
        limited_support: Arc::new(LimitedSupportSource::new(registry.clone())),
        service_logs: Arc::new(ServiceLogSource::new(registry)),
        tickets: Arc::new(ClusterTicketSource::new(tickets.clone())),
        support_exceptions: Arc::new(SupportExceptionSource::new(tickets)),
        incident_services: Arc::new(IncidentServiceSource::new(incidents.clone())),
        current_incidents: Arc::new(CurrentIncidentSource::new(incidents.clone())),
        incident_history: Arc::new(IncidentHistorySource::new(incidents)),
        audit_log: audit,
    })
}
