//! The Aggregator: post-scan roll-up queries materialized into [`GranularRecord`]s
//! (spec.md §4.8).

use chrono::{DateTime, Utc};

use crate::classify;
use crate::document::GranularRecord;
use crate::index_client::IndexBackend;

/// The three roll-up categories, in the order the Coordinator runs them (spec.md §4.7 step 5).
pub const CATEGORIES: &[&str] = &["filetypes", "users", "heat_bins"];

/// Run one category's roll-up query and materialize a [`GranularRecord`] for every
/// non-zero bucket. `filetypes`/`users` buckets are discovered from the data index's live
/// mapping; `heat_bins` uses the fixed partition from the classifier.
pub fn aggregate_category(
    backend: &dyn IndexBackend,
    data_index: &str,
    path: &str,
    scan_id: &str,
    category: &str,
    start_timestamp: DateTime<Utc>,
    end_timestamp: DateTime<Utc>,
) -> anyhow::Result<Vec<GranularRecord>> {
    let buckets: Vec<String> = if category == "heat_bins" {
        classify::all_heat_bands().map(str::to_string).collect()
    } else {
        backend.discover_buckets(data_index, category)?
    };

    let stats = backend.rollup(data_index, path, scan_id, category, &buckets)?;

    let mut records: Vec<GranularRecord> = stats
        .into_iter()
        .map(|(identifier, stat)| GranularRecord {
            path: path.to_string(),
            scan_id: scan_id.to_string(),
            category: category.to_string(),
            identifier,
            size: stat.size,
            count: stat.count,
            start_timestamp,
            end_timestamp,
        })
        .collect();
    records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(records)
}
