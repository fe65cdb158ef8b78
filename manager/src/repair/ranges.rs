use std::collections::HashSet;
use tracing::debug;

use super::client::Ring;
use super::types::{Host, TableTokenRange};

/// Flatten the ring of `keyspace` into one [`TableTokenRange`] per table and
/// token range.
///
/// Replicas outside `datacenters` are dropped (an empty list selects every
/// datacenter). Ranges left without replicas are skipped. Ranges of one
/// table are emitted contiguously, in ring order.
pub fn build_table_token_ranges(
    ring: &Ring,
    keyspace: &str,
    tables: &[String],
    datacenters: &[String],
) -> Vec<TableTokenRange> {
    let selected: HashSet<&str> = datacenters.iter().map(String::as_str).collect();

    let in_selected_dc = |host: &Host| -> bool {
        if selected.is_empty() {
            return true;
        }
        ring.host_dc
            .get(host)
            .is_some_and(|dc| selected.contains(dc.as_str()))
    };

    let mut filtered: Vec<(i64, i64, Vec<Host>)> = Vec::with_capacity(ring.ranges.len());
    for range in &ring.ranges {
        let replicas: Vec<Host> = range
            .replicas
            .iter()
            .filter(|h| in_selected_dc(h))
            .cloned()
            .collect();
        if replicas.is_empty() {
            debug!(
                "Skipping range ({}, {}] of {}: no replicas in selected datacenters",
                range.start_token, range.end_token, keyspace
            );
            continue;
        }
        filtered.push((range.start_token, range.end_token, replicas));
    }

    let mut out = Vec::with_capacity(filtered.len() * tables.len());
    for table in tables {
        for (start, end, replicas) in &filtered {
            out.push(TableTokenRange::new(keyspace, table, *start, *end, replicas));
        }
    }
    out
}
