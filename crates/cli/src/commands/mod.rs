pub mod fields;
pub mod search;
pub mod tools;
pub mod validate;

use anyhow::{bail, Result};
use serde_json::{json, Value};

/// Repository from --repository or the configured default
pub fn require_repository(repository: Option<String>) -> Result<String> {
    match repository.filter(|r| !r.trim().is_empty()) {
        Some(repository) => Ok(repository),
        None => bail!(
            "No repository specified. Pass --repository or set NGSIEM_DEFAULT_REPOSITORY."
        ),
    }
}

/// Sample events served by --simulate
pub fn simulated_events() -> Vec<Value> {
    vec![
        json!({
            "@timestamp": 1735689600000u64,
            "#event_simpleName": "ProcessRollup2",
            "ComputerName": "WS-0142",
            "UserName": "alice",
            "CommandLine": "powershell.exe -nop -w hidden",
        }),
        json!({
            "@timestamp": 1735689660000u64,
            "#event_simpleName": "DnsRequest",
            "ComputerName": "WS-0142",
            "DomainName": "example.org",
        }),
        json!({
            "@timestamp": 1735689720000u64,
            "#event_simpleName": "NetworkConnectIP4",
            "ComputerName": "SRV-DB-01",
            "RemoteAddressIP4": "10.0.4.17",
            "RemotePort": 5432,
        }),
    ]
}
