use anyhow::{anyhow, Result};
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{RingInfo, RingRange, TokenRange};

pub async fn describe_ring(nodetool_path: &str, keyspace: &str) -> Result<RingInfo> {
    debug!("Describing ring of keyspace {}", keyspace);

    let output = AsyncCommand::new(nodetool_path)
        .arg("describering")
        .arg(keyspace)
        .output()
        .await
        .map_err(|e| anyhow!("Failed to execute {}: {}", nodetool_path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("describering {} failed: {}", keyspace, stderr.trim()));
    }

    parse_describering(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `nodetool describering` output into ranges and host placement.
///
/// Lines look like:
/// `TokenRange(start_token:-9, end_token:-8, endpoints:[10.0.0.1, 10.0.0.2], rpc_endpoints:[..],
/// endpoint_details:[EndpointDetails(host:10.0.0.1, datacenter:dc1, rack:r1), ..])`
pub fn parse_describering(output: &str) -> Result<RingInfo> {
    let mut ring = RingInfo::default();

    for line in output.lines().map(str::trim) {
        if !line.starts_with("TokenRange(") {
            continue;
        }

        let start_token = token_field(line, "start_token:")?;
        let end_token = token_field(line, "end_token:")?;
        let replicas = list_field(line, " endpoints:[")
            .ok_or_else(|| anyhow!("Missing endpoints in ring line: {}", line))?;

        for details in line.split("EndpointDetails(").skip(1) {
            let host = details_field(details, "host:");
            let dc = details_field(details, "datacenter:");
            if let (Some(host), Some(dc)) = (host, dc) {
                ring.host_dc.insert(host.to_string(), dc.to_string());
            }
        }

        ring.ranges.push(RingRange {
            start_token,
            end_token,
            replicas,
        });
    }

    Ok(ring)
}

fn token_field(line: &str, name: &str) -> Result<i64> {
    let start = line
        .find(name)
        .ok_or_else(|| anyhow!("Missing {} in ring line: {}", name, line))?
        + name.len();
    let value: String = line[start..]
        .chars()
        .take_while(|c| *c != ',' && *c != ')')
        .collect();
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid token '{}': {}", value.trim(), e))
}

fn list_field(line: &str, name: &str) -> Option<Vec<String>> {
    let start = line.find(name)? + name.len();
    let end = start + line[start..].find(']')?;
    Some(
        line[start..end]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn details_field<'a>(details: &'a str, name: &str) -> Option<&'a str> {
    let start = details.find(name)? + name.len();
    let rest = &details[start..];
    let end = rest.find([',', ')']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn repair_args(keyspace: &str, tables: &[String], range: &TokenRange) -> Vec<String> {
    let mut args = vec![
        "repair".to_string(),
        "-full".to_string(),
        "-st".to_string(),
        range.start_token.to_string(),
        "-et".to_string(),
        range.end_token.to_string(),
        keyspace.to_string(),
    ];
    args.extend(tables.iter().cloned());
    args
}

/// Repair `ranges` one after another. The running nodetool process is
/// killed as soon as `cancel` fires.
pub async fn repair_ranges(
    nodetool_path: &str,
    keyspace: &str,
    tables: &[String],
    ranges: &[TokenRange],
    cancel: &CancellationToken,
) -> Result<String> {
    let mut output = String::new();

    for range in ranges {
        let args = repair_args(keyspace, tables, range);
        debug!("Running {} {}", nodetool_path, args.join(" "));

        let child = AsyncCommand::new(nodetool_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}", nodetool_path, e))?;

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(
                    "Repair of {} ({}, {}] killed",
                    keyspace, range.start_token, range.end_token
                );
                return Err(anyhow!("Repair killed"));
            }
            result = child.wait_with_output() => result?,
        };

        let stdout = String::from_utf8_lossy(&result.stdout);
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let error_msg = if !stderr.trim().is_empty() { stderr } else { stdout };
            return Err(anyhow!(
                "Repair of ({}, {}] failed: {}",
                range.start_token,
                range.end_token,
                error_msg.trim()
            ));
        }
        output.push_str(&stdout);
    }

    info!(
        "Repaired {} ranges of {}.{}",
        ranges.len(),
        keyspace,
        tables.join(",")
    );
    Ok(output)
}
