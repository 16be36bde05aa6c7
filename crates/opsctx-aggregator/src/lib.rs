//! Partial-failure aggregation of a cluster's operational context.
//!
//! [`ContextAggregator`] resolves a cluster identifier, fans out to every
//! source adapter concurrently and assembles a [`Snapshot`] alongside the list
//! of sources that failed. The incident summarizer condenses raw incident
//! history into per-type occurrence counts.

pub mod aggregator;
pub mod incident_summary;
pub mod snapshot;

pub use aggregator::{
    retain_within_window, AggregateError, AggregateOptions, ContextAggregator, SourceSet,
    DEFAULT_MAX_PAGES, DEFAULT_WINDOW_DAYS,
};
pub use incident_summary::{
    canonical_incident_key, group_by_scope, summarize_incidents, summarize_scope,
    total_occurrences, IncidentOccurrence, SummaryError,
};
pub use snapshot::{ContextReport, SectionStatus, Snapshot, SourceFailure};
