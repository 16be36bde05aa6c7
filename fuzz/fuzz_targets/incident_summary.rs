#![no_main]

use libfuzzer_sys::fuzz_target;
use opsctx_aggregator::{summarize_scope, total_occurrences};
use opsctx_sources::Incident;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let incidents: Vec<Incident> = raw
        .lines()
        .enumerate()
        .map(|(index, line)| {
            let (title, created_at) = line.split_once('|').unwrap_or((line, ""));
            Incident {
                id: index.to_string(),
                title: title.to_string(),
                urgency: String::new(),
                status: String::new(),
                created_at: created_at.to_string(),
                service_id: "fuzz".to_string(),
            }
        })
        .collect();
    if let Ok(summary) = summarize_scope("fuzz", &incidents) {
        assert_eq!(total_occurrences(&summary), incidents.len());
        assert!(summary.windows(2).all(|pair| pair[0].count <= pair[1].count));
    }
});
