use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use opsctx_sources::Incident;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How often one incident type fired within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentOccurrence {
    pub name: String,
    pub count: usize,
    pub last_occurrence: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryError {
    #[error("scope {scope}: incident {incident_id} ('{title}') has invalid creation time '{value}': {cause}")]
    InvalidTimestamp {
        scope: String,
        incident_id: String,
        title: String,
        value: String,
        #[source]
        cause: chrono::ParseError,
    },
}

struct OccurrenceAccumulator {
    first_seen: usize,
    count: usize,
    last_occurrence: DateTime<Utc>,
}

impl OccurrenceAccumulator {
    fn record(&mut self, created_at: DateTime<Utc>) {
        self.count += 1;
        if created_at > self.last_occurrence {
            self.last_occurrence = created_at;
        }
    }
}

/// Incident-type key: the first whitespace-delimited token of the title.
///
/// Titles sharing a first word are one type. Leading whitespace is skipped,
/// so an indented title still groups under its first word.
pub fn canonical_incident_key(title: &str) -> &str {
    title.split_whitespace().next().unwrap_or_default()
}

/// Summarizes the incidents of one scope, ascending by count.
///
/// Every creation time is parsed; one unreadable timestamp fails the scope.
/// Groups with equal counts keep the order in which their key first appeared.
pub fn summarize_scope(
    scope: &str,
    incidents: &[Incident],
) -> Result<Vec<IncidentOccurrence>, SummaryError> {
    let mut groups: HashMap<String, OccurrenceAccumulator> = HashMap::new();
    for incident in incidents {
        let created_at = parse_created_at(scope, incident)?;
        let key = canonical_incident_key(&incident.title);
        match groups.get_mut(key) {
            Some(group) => group.record(created_at),
            None => {
                let first_seen = groups.len();
                groups.insert(
                    key.to_string(),
                    OccurrenceAccumulator {
                        first_seen,
                        count: 1,
                        last_occurrence: created_at,
                    },
                );
            }
        }
    }

    let mut ordered: Vec<_> = groups.into_iter().collect();
    ordered.sort_by_key(|(_, group)| group.first_seen);
    // Ascending by count puts the most frequent type last; kept as-is for
    // output compatibility.
    ordered.sort_by_key(|(_, group)| group.count);
    Ok(ordered
        .into_iter()
        .map(|(name, group)| IncidentOccurrence {
            name,
            count: group.count,
            last_occurrence: group.last_occurrence,
        })
        .collect())
}

/// Summarizes every scope. Any parse failure aborts the whole call and no
/// partial summary is returned.
pub fn summarize_incidents(
    scoped: &BTreeMap<String, Vec<Incident>>,
) -> Result<BTreeMap<String, Vec<IncidentOccurrence>>, SummaryError> {
    scoped
        .iter()
        .map(|(scope, incidents)| Ok((scope.clone(), summarize_scope(scope, incidents)?)))
        .collect()
}

/// Buckets incidents by service, keeping input order inside each bucket.
/// Every listed scope gets an entry, even when it has no incidents.
pub fn group_by_scope(
    incidents: Vec<Incident>,
    scopes: &[String],
) -> BTreeMap<String, Vec<Incident>> {
    let mut grouped: BTreeMap<String, Vec<Incident>> = scopes
        .iter()
        .map(|scope| (scope.clone(), Vec::new()))
        .collect();
    for incident in incidents {
        grouped
            .entry(incident.service_id.clone())
            .or_default()
            .push(incident);
    }
    grouped
}

/// Total incidents represented by a summary.
pub fn total_occurrences(occurrences: &[IncidentOccurrence]) -> usize {
    occurrences.iter().map(|occurrence| occurrence.count).sum()
}

fn parse_created_at(scope: &str, incident: &Incident) -> Result<DateTime<Utc>, SummaryError> {
    DateTime::parse_from_rfc3339(incident.created_at.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|cause| SummaryError::InvalidTimestamp {
            scope: scope.to_string(),
            incident_id: incident.id.clone(),
            title: incident.title.clone(),
            value: incident.created_at.clone(),
            cause,
        })
}
