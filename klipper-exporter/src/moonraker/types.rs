//! Typed decodings of Moonraker API responses.
//!
//! Every struct is zero-filled: absent fields and explicit `null`s decode to
//! the type's default rather than failing the whole document.

use std::collections::BTreeMap;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

/// Decode `null` as the type's default value.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The `{"result": ...}` wrapper around every Moonraker reply.
#[derive(Debug, Default, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct Envelope<T> {
    #[serde(default, deserialize_with = "nullable")]
    pub result: T,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#get-moonraker-process-stats

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcStats {
    pub moonraker_stats: Vec<MoonrakerProcStat>,
    #[serde(deserialize_with = "nullable")]
    pub cpu_temp: f64,
    pub network: BTreeMap<String, NetworkStats>,
    /// Overall usage under `cpu`, one entry per core under `cpuN`.
    pub system_cpu_usage: BTreeMap<String, Option<f64>>,
    pub system_memory: SystemMemory,
    pub system_uptime: f64,
    pub websocket_connections: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MoonrakerProcStat {
    pub cpu_usage: f64,
    pub memory: f64,
    pub mem_units: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NetworkStats {
    pub rx_bytes: f64,
    pub tx_bytes: f64,
    pub rx_packets: f64,
    pub tx_packets: f64,
    pub rx_errs: f64,
    pub tx_errs: f64,
    pub rx_drop: f64,
    pub tx_drop: f64,
    #[serde(deserialize_with = "nullable")]
    pub bandwidth: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemMemory {
    pub total: f64,
    pub available: f64,
    pub used: f64,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#get-directory-information

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryInfo {
    pub disk_usage: DiskUsage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DiskUsage {
    pub total: f64,
    pub used: f64,
    pub free: f64,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#retrieve-the-job-queue-status

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JobQueue {
    /// Only the queue length is exported.
    pub queued_jobs: Vec<IgnoredAny>,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#history-apis

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryTotals {
    pub job_totals: JobTotals,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JobTotals {
    pub total_jobs: f64,
    pub total_time: f64,
    pub total_print_time: f64,
    pub total_filament_used: f64,
    pub longest_job: f64,
    pub longest_print: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryList {
    pub jobs: Vec<HistoryJob>,
}

/// Job status reported while a print is running.
pub const JOB_IN_PROGRESS: &str = "in_progress";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryJob {
    pub status: String,
    #[serde(deserialize_with = "nullable")]
    pub total_duration: f64,
    #[serde(deserialize_with = "nullable")]
    pub metadata: JobMetadata,
}

impl HistoryJob {
    pub fn is_in_progress(&self) -> bool {
        self.status == JOB_IN_PROGRESS
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JobMetadata {
    #[serde(deserialize_with = "nullable")]
    pub object_height: f64,
    #[serde(deserialize_with = "nullable")]
    pub first_layer_height: f64,
    #[serde(deserialize_with = "nullable")]
    pub layer_height: f64,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#get-system-info

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub system_info: SystemInfoDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemInfoDetails {
    pub cpu_info: CpuInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CpuInfo {
    pub cpu_count: f64,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#request-cached-temperature-data

/// Object name -> field name (`temperatures`, `targets`, ...) -> history array.
///
/// Values are kept untyped so one malformed series does not fail the rest.
pub type TemperatureStore = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

// https://moonraker.readthedocs.io/en/latest/web_api/#list-available-printer-objects

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ObjectList {
    pub objects: Vec<String>,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#query-printer-object-status

/// Raw printer object status; see [`crate::objects::classify`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ObjectQuery {
    pub status: serde_json::Value,
}

// https://moonraker.readthedocs.io/en/latest/web_api/#spoolman-apis

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpoolmanStatus {
    pub spoolman_connected: bool,
    pub pending_reports: Vec<PendingReport>,
    /// `None` when no spool is active.
    pub spool_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PendingReport {
    pub spool_id: Option<i64>,
    #[serde(deserialize_with = "nullable")]
    pub filament_used: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_zero_fill() {
        let parsed: Envelope<ProcStats> = serde_json::from_value(json!({
            "result": {
                "system_uptime": 120.5
            }
        }))
        .unwrap();

        assert!(parsed.result.moonraker_stats.is_empty());
        assert_eq!(parsed.result.system_uptime, 120.5);
        assert_eq!(parsed.result.system_memory.total, 0.0);
        assert!(parsed.result.network.is_empty());
    }

    #[test]
    fn test_null_fields_zero_fill() {
        let parsed: Envelope<ProcStats> = serde_json::from_value(json!({
            "result": {
                "cpu_temp": null,
                "system_cpu_usage": {"cpu": 12.5, "cpu0": null}
            }
        }))
        .unwrap();

        assert_eq!(parsed.result.cpu_temp, 0.0);
        assert_eq!(parsed.result.system_cpu_usage.get("cpu"), Some(&Some(12.5)));
        assert_eq!(parsed.result.system_cpu_usage.get("cpu0"), Some(&None));
    }

    #[test]
    fn test_missing_result() {
        let parsed: Envelope<JobQueue> = serde_json::from_value(json!({})).unwrap();
        assert!(parsed.result.queued_jobs.is_empty());
    }

    #[test]
    fn test_job_queue_length_only() {
        let parsed: Envelope<JobQueue> = serde_json::from_value(json!({
            "result": {
                "queued_jobs": [
                    {"filename": "a.gcode", "job_id": "0001", "time_in_queue": 2.0},
                    {"filename": "b.gcode", "job_id": "0002", "time_in_queue": null}
                ],
                "queue_state": "ready"
            }
        }))
        .unwrap();

        assert_eq!(parsed.result.queued_jobs.len(), 2);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let parsed: Envelope<DirectoryInfo> = serde_json::from_value(json!({
            "result": {
                "dirs": [],
                "files": [{"filename": "cube.gcode"}],
                "disk_usage": {"total": 100, "used": 40, "free": 60},
                "root_info": {"name": "gcodes", "permissions": "rw"}
            }
        }))
        .unwrap();

        assert_eq!(parsed.result.disk_usage.total, 100.0);
        assert_eq!(parsed.result.disk_usage.free, 60.0);
    }

    #[test]
    fn test_history_job_with_null_metadata() {
        let parsed: Envelope<HistoryList> = serde_json::from_value(json!({
            "result": {
                "count": 1,
                "jobs": [{
                    "status": "in_progress",
                    "total_duration": 12.0,
                    "metadata": {"object_height": null, "layer_height": 0.2}
                }]
            }
        }))
        .unwrap();

        let job = &parsed.result.jobs[0];
        assert!(job.is_in_progress());
        assert_eq!(job.metadata.object_height, 0.0);
        assert_eq!(job.metadata.layer_height, 0.2);
    }

    #[test]
    fn test_spoolman_without_active_spool() {
        let parsed: Envelope<SpoolmanStatus> = serde_json::from_value(json!({
            "result": {
                "spoolman_connected": true,
                "pending_reports": [],
                "spool_id": null
            }
        }))
        .unwrap();

        assert!(parsed.result.spoolman_connected);
        assert_eq!(parsed.result.spool_id, None);
    }
}
