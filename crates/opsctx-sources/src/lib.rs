//! Source adapters for the external systems behind a cluster context snapshot.
//!
//! Defines the record shapes, the adapter contract consumed by the aggregator,
//! the sequential pagination driver, and one HTTP implementation per system:
//! cluster registry, ticket tracker, incident tracker and audit log.

pub mod audit_log;
pub mod cluster_registry;
pub mod http_client;
pub mod incident_tracker;
pub mod paging;
pub mod source_adapter;
pub mod source_error;
pub mod source_types;
pub mod ticket_tracker;

pub use audit_log::{AuditLogClient, AuditLogSettings};
pub use cluster_registry::{
    ClusterRegistryClient, LimitedSupportSource, RegistrySettings, ServiceLogSource,
};
pub use http_client::{HttpSettings, SourceAuth, SourceHttpClient};
pub use incident_tracker::{
    CurrentIncidentSource, IncidentHistorySource, IncidentQuery, IncidentServiceSource,
    IncidentTrackerClient, IncidentTrackerSettings,
};
pub use paging::{collect_pages, Page};
pub use source_adapter::{FetchOutcome, IdentityResolver, SourceAdapter};
pub use source_error::SourceError;
pub use source_types::*;
pub use ticket_tracker::{
    ClusterTicketSource, SupportExceptionSource, TicketTrackerClient, TicketTrackerSettings,
};
