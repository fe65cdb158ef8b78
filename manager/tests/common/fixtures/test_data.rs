//! Common rings, targets and settings used across tests

use std::collections::HashMap;

use repair_manager::config::RepairSettings;
use repair_manager::repair::{KeyspaceTarget, RepairTarget, Ring, RingRange};

/// `10.0.0.1` .. `10.0.0.n`
pub fn host_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("10.0.0.{}", i)).collect()
}

/// Ring built from explicit `(start, end, replicas)` triples in one datacenter
pub fn ring(ranges: &[(i64, i64, &[&str])]) -> Ring {
    let mut host_dc = HashMap::new();
    let ranges = ranges
        .iter()
        .map(|(start, end, replicas)| {
            for host in replicas.iter() {
                host_dc.insert(host.to_string(), "dc1".to_string());
            }
            RingRange {
                start_token: *start,
                end_token: *end,
                replicas: replicas.iter().map(|h| h.to_string()).collect(),
            }
        })
        .collect();
    Ring { ranges, host_dc }
}

/// `range_count` equal ranges, range `i` replicated on `rf` consecutive
/// hosts starting at host `i % hosts.len()`
pub fn uniform_ring(hosts: &[String], rf: usize, range_count: usize) -> Ring {
    let width = 1_000_000i64;
    let ranges = (0..range_count)
        .map(|i| {
            let start = i as i64 * width;
            RingRange {
                start_token: start,
                end_token: start + width,
                replicas: (0..rf)
                    .map(|k| hosts[(i + k) % hosts.len()].clone())
                    .collect(),
            }
        })
        .collect();
    let host_dc = hosts
        .iter()
        .map(|h| (h.clone(), "dc1".to_string()))
        .collect();
    Ring { ranges, host_dc }
}

/// Assign datacenters to hosts of an existing ring
pub fn with_datacenters(mut ring: Ring, placement: &[(&str, &str)]) -> Ring {
    for (host, dc) in placement {
        ring.host_dc.insert(host.to_string(), dc.to_string());
    }
    ring
}

pub fn target(keyspace: &str, tables: &[&str]) -> RepairTarget {
    RepairTarget {
        keyspaces: vec![KeyspaceTarget {
            name: keyspace.to_string(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
        }],
        ..Default::default()
    }
}

/// Fast polling and a short grace period
pub fn fast_settings() -> RepairSettings {
    RepairSettings {
        graceful_shutdown_timeout_seconds: 30,
        poll_interval_millis: 5,
        ..Default::default()
    }
}
