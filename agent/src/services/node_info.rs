use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub async fn total_memory_bytes() -> Result<u64> {
    let meminfo = tokio::fs::read_to_string("/proc/meminfo").await?;
    parse_mem_total(&meminfo)
}

/// `MemTotal:       16333460 kB` -> bytes
pub fn parse_mem_total(meminfo: &str) -> Result<u64> {
    let line = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .ok_or_else(|| anyhow!("MemTotal not found in meminfo"))?;

    let kib: u64 = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("Malformed MemTotal line: {}", line))?
        .parse()
        .map_err(|e| anyhow!("Malformed MemTotal line '{}': {}", line, e))?;
    Ok(kib * 1024)
}

/// One shard per core
pub fn shard_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Table directories are named `<table>-<uuid>`
fn table_name(dir_name: &str) -> &str {
    match dir_name.rsplit_once('-') {
        Some((name, id)) if id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit()) => name,
        _ => dir_name,
    }
}

async fn table_dirs(data_dir: &Path, keyspace: &str) -> Result<Vec<(String, PathBuf)>> {
    validate_identifier("keyspace", keyspace)?;
    let keyspace_dir = data_dir.join(keyspace);
    let mut entries = tokio::fs::read_dir(&keyspace_dir)
        .await
        .map_err(|e| anyhow!("Cannot read {}: {}", keyspace_dir.display(), e))?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            let dir_name = entry.file_name().to_string_lossy().to_string();
            dirs.push((table_name(&dir_name).to_string(), entry.path()));
        }
    }
    Ok(dirs)
}

/// Keyspace and table names are plain CQL identifiers. Anything else could
/// step outside the data directory or reach nodetool as an option.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 48
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow!("Invalid {} name '{}'", kind, name))
    }
}

pub async fn list_tables(data_dir: &Path, keyspace: &str) -> Result<Vec<String>> {
    let mut tables: Vec<String> = table_dirs(data_dir, keyspace)
        .await?
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    tables.sort();
    tables.dedup();
    Ok(tables)
}

/// On-disk size of a table, summed over all of its directories
pub async fn table_size(data_dir: &Path, keyspace: &str, table: &str) -> Result<u64> {
    validate_identifier("table", table)?;
    let mut total = 0;
    for (name, path) in table_dirs(data_dir, keyspace).await? {
        if name == table {
            total += dir_size(&path).await?;
        }
    }
    debug!("Table {}.{} uses {} bytes", keyspace, table, total);
    Ok(total)
}

async fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                pending.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }
    Ok(total)
}
