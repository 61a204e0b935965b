//! Snapshot collector: one Moonraker scrape per probe request.

use std::sync::Arc;
use std::time::Instant;

use klipper_common::Sample;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::discovery::EntityCache;
use crate::error::FetchError;
use crate::mapping;
use crate::module::{Module, ModuleSet};
use crate::moonraker::{MoonrakerClient, Upstream};
use crate::objects::classify;
use crate::snapshot::Snapshot;

/// Collects metric snapshots from Moonraker targets.
///
/// Upstream failures are contained per module: a failing fetch is logged
/// and counted, and the remaining modules still contribute samples.
pub struct SnapshotCollector {
    client: MoonrakerClient,
    /// Discovered dynamic objects, per target, for the process lifetime.
    cache: EntityCache,
    stats: RwLock<CollectorStats>,
}

/// Collector statistics.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Total snapshots collected.
    pub probes: u64,
    /// Upstream fetches that failed.
    pub module_errors: u64,
}

impl SnapshotCollector {
    pub fn new(client: MoonrakerClient) -> Self {
        Self {
            client,
            cache: EntityCache::new(),
            stats: RwLock::new(CollectorStats::default()),
        }
    }

    /// Collect one snapshot of `modules` from `target`.
    ///
    /// Modules are processed in [`Module`] order. `process_stats` and
    /// `network_stats` share a single `/machine/proc_stats` fetch and are
    /// both skipped when it fails.
    pub async fn collect(
        &self,
        target: &str,
        modules: &ModuleSet,
        api_key: Option<&str>,
    ) -> Vec<Sample> {
        let started = Instant::now();
        self.stats.write().probes += 1;

        let upstream = self.client.upstream(target, api_key);
        let mut snapshot = Snapshot::new();

        if modules.needs_proc_stats() {
            match upstream.proc_stats().await {
                Ok(stats) => {
                    if modules.contains(Module::ProcessStats) {
                        mapping::emit_process_stats(&stats, &mut snapshot);
                    }
                    if modules.contains(Module::NetworkStats) {
                        mapping::emit_network_stats(&stats, &mut snapshot);
                    }
                }
                Err(e) => {
                    for module in [Module::ProcessStats, Module::NetworkStats] {
                        if modules.contains(module) {
                            self.module_failed(target, module, &e);
                        }
                    }
                }
            }
        }

        for module in modules.iter() {
            let result = match module {
                Module::ProcessStats | Module::NetworkStats => continue,
                Module::DirectoryInfo => upstream
                    .directory_info()
                    .await
                    .map(|info| mapping::emit_directory_info(&info, &mut snapshot)),
                Module::JobQueue => upstream
                    .job_queue()
                    .await
                    .map(|queue| mapping::emit_job_queue(&queue, &mut snapshot)),
                Module::History => {
                    if let Err(e) = upstream
                        .history_totals()
                        .await
                        .map(|totals| mapping::emit_history_totals(&totals, &mut snapshot))
                    {
                        self.module_failed(target, module, &e);
                    }
                    upstream
                        .history_latest()
                        .await
                        .map(|history| mapping::emit_current_print(&history, &mut snapshot))
                }
                Module::SystemInfo => upstream
                    .system_info()
                    .await
                    .map(|info| mapping::emit_system_info(&info, &mut snapshot)),
                Module::Temperature => upstream
                    .temperature_store()
                    .await
                    .map(|store| mapping::emit_temperature_store(&store, &mut snapshot)),
                Module::PrinterObjects => self.collect_printer_objects(&upstream, &mut snapshot).await,
                Module::Spoolman => upstream
                    .spoolman_status()
                    .await
                    .map(|status| mapping::emit_spoolman(&status, &mut snapshot)),
            };

            if let Err(e) = result {
                self.module_failed(target, module, &e);
            }
        }

        debug!(
            host = %target,
            modules = %modules,
            samples = snapshot.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collected snapshot"
        );

        snapshot.into_samples()
    }

    /// Discover dynamic objects once per target, then query and classify.
    async fn collect_printer_objects(
        &self,
        upstream: &Upstream<'_>,
        snapshot: &mut Snapshot,
    ) -> Result<(), FetchError> {
        let entities = self
            .cache
            .get_or_discover(upstream.target(), || upstream.discover_entities())
            .await?;

        let query = upstream.object_query(&entities).await?;
        let objects = classify(&query.status);
        mapping::emit_printer_objects(&objects, snapshot);
        Ok(())
    }

    fn module_failed(&self, target: &str, module: Module, e: &FetchError) {
        self.stats.write().module_errors += 1;
        error!(
            host = %target,
            module = %module,
            kind = e.kind(),
            error = %e,
            "Module collection failed"
        );
    }

    /// Number of targets with cached discovery results.
    pub fn discovered_targets(&self) -> usize {
        self.cache.len()
    }

    /// Get collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.stats.read().clone()
    }

    /// The exporter's own metrics.
    pub fn self_metrics(&self) -> Vec<Sample> {
        let stats = self.stats();
        vec![
            Sample::counter(
                "klipper_exporter_probes_total",
                "Number of probe requests collected.",
                stats.probes as f64,
            ),
            Sample::counter(
                "klipper_exporter_module_errors_total",
                "Number of failed upstream fetches.",
                stats.module_errors as f64,
            ),
            Sample::gauge(
                "klipper_exporter_discovered_targets",
                "Number of targets with discovered printer objects.",
                self.discovered_targets() as f64,
            ),
        ]
    }
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<SnapshotCollector>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn collector() -> SnapshotCollector {
        SnapshotCollector::new(MoonrakerClient::new(Duration::from_millis(200)).unwrap())
    }

    #[tokio::test]
    async fn test_empty_module_set_collects_nothing() {
        let collector = collector();

        let samples = collector
            .collect("127.0.0.1:1", &ModuleSet::default(), None)
            .await;

        assert!(samples.is_empty());
        assert_eq!(collector.stats().probes, 1);
        assert_eq!(collector.stats().module_errors, 0);
    }

    #[tokio::test]
    async fn test_self_metrics() {
        let collector = collector();
        collector
            .collect("127.0.0.1:1", &ModuleSet::from_tags(["job_queue"]), None)
            .await;

        let samples = collector.self_metrics();

        let value = |name: &str| samples.iter().find(|s| s.name == name).map(|s| s.value);
        assert_eq!(value("klipper_exporter_probes_total"), Some(1.0));
        assert_eq!(value("klipper_exporter_module_errors_total"), Some(1.0));
        assert_eq!(value("klipper_exporter_discovered_targets"), Some(0.0));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_contained() {
        let collector = collector();
        let modules = ModuleSet::from_tags(["process_stats", "network_stats", "system_info"]);

        // Port 1 on loopback refuses connections.
        let samples = collector.collect("127.0.0.1:1", &modules, None).await;

        assert!(samples.is_empty());
        assert_eq!(collector.stats().module_errors, 3);
        assert_eq!(collector.discovered_targets(), 0);
    }

    #[tokio::test]
    async fn test_failed_discovery_is_not_cached() {
        let collector = collector();
        let modules = ModuleSet::from_tags(["printer_objects"]);

        collector.collect("127.0.0.1:1", &modules, None).await;

        assert_eq!(collector.discovered_targets(), 0);
        assert_eq!(collector.stats().module_errors, 1);
    }
}
