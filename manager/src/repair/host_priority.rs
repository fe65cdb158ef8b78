use std::collections::HashMap;

use super::types::Host;
use crate::constants::repair::{MAX_RANGES_PER_JOB, MEMORY_FRACTION, RANGE_MEMORY_BYTES};

/// Coordinator preference: lower number wins.
///
/// A host's priority is the position of its datacenter in the
/// closest-first datacenter order.
#[derive(Debug, Clone, Default)]
pub struct HostPriority {
    priority: HashMap<Host, usize>,
}

impl HostPriority {
    pub fn from_dc_order(closest_dcs: &[String], host_dc: &HashMap<Host, String>) -> Self {
        let dc_rank: HashMap<&str, usize> = closest_dcs
            .iter()
            .enumerate()
            .map(|(i, dc)| (dc.as_str(), i))
            .collect();

        let priority = host_dc
            .iter()
            .filter_map(|(host, dc)| dc_rank.get(dc.as_str()).map(|rank| (host.clone(), *rank)))
            .collect();

        Self { priority }
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_empty()
    }

    /// Replica with the lowest priority; the first replica when no host has one.
    ///
    /// Returns `None` only for an empty replica list.
    pub fn pick_host<'a>(&self, replicas: &'a [Host]) -> Option<&'a Host> {
        if self.priority.is_empty() {
            return replicas.first();
        }
        // min_by_key keeps the first of equal elements
        replicas
            .iter()
            .min_by_key(|h| self.priority.get(*h).copied().unwrap_or(usize::MAX))
    }
}

/// Ranges a host can repair in one job given its memory and shard count
pub fn host_range_limit(total_memory: u64, shard_count: u32) -> usize {
    let shards = u64::from(shard_count.max(1));
    let budget = (total_memory as f64 * MEMORY_FRACTION) as u64;
    let limit = budget / (shards * RANGE_MEMORY_BYTES);
    (limit as usize).clamp(1, MAX_RANGES_PER_JOB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn host_dc() -> HashMap<Host, String> {
        [("a", "dc1"), ("b", "dc2"), ("c", "dc3")]
            .iter()
            .map(|(h, dc)| (h.to_string(), dc.to_string()))
            .collect()
    }

    #[test]
    fn test_pick_host_prefers_closest_dc() {
        let order = vec!["dc2".to_string(), "dc3".to_string(), "dc1".to_string()];
        let priority = HostPriority::from_dc_order(&order, &host_dc());
        let replicas = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(priority.pick_host(&replicas).map(String::as_str), Some("b"));

        let replicas = vec!["a".to_string(), "c".to_string()];
        assert_eq!(priority.pick_host(&replicas).map(String::as_str), Some("c"));
    }

    #[test]
    fn test_pick_host_without_priority_uses_first() {
        let priority = HostPriority::default();
        let replicas = vec!["c".to_string(), "a".to_string()];
        assert_eq!(priority.pick_host(&replicas).map(String::as_str), Some("c"));
        assert!(priority.pick_host(&[]).is_none());
    }

    #[rstest]
    #[case(16 * 1024 * 1024 * 1024, 4, 256)]
    #[case(8 * 1024 * 1024 * 1024, 8, 102)]
    #[case(64 * 1024 * 1024, 4, 1)]
    #[case(1024 * 1024 * 1024, 0, 102)]
    fn test_host_range_limit(#[case] memory: u64, #[case] shards: u32, #[case] expected: usize) {
        assert_eq!(host_range_limit(memory, shards), expected);
    }
}
