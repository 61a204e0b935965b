//! Mapping from decoded Moonraker responses to Prometheus samples.
//!
//! Each module owns a table of [`FieldMetric`]s describing which field of a
//! response becomes which metric. Instance names supplied by the printer
//! configuration pass through [`sanitize`] before they become label values.

use std::collections::BTreeMap;

use klipper_common::{MetricKind, Sample};
use serde_json::Value;
use tracing::warn;

use crate::moonraker::types::{
    DirectoryInfo, HistoryJob, HistoryList, HistoryTotals, JobQueue, JobTotals, MoonrakerProcStat,
    NetworkStats, ProcStats, SpoolmanStatus, SystemInfo, TemperatureStore,
};
use crate::objects::{
    EntityStatus, FanStatus, FilamentSensorStatus, FixedObjects, McuStats, OutputPinStatus,
    PrinterObjects, TemperatureFanStatus, TemperatureSensorStatus,
};
use crate::snapshot::Snapshot;

/// Common prefix of every exported upstream metric.
pub const METRIC_PREFIX: &str = "klipper";

/// Memory units Moonraker uses for its own process statistics.
const KILOBYTES: &str = "kB";

/// Sanitize an upstream instance name for use as a label value.
///
/// Hyphens become underscores, then every character outside
/// `[A-Za-z0-9_]` is removed.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '-' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// One exported field of a decoded response.
pub struct FieldMetric<T> {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub value: fn(&T) -> f64,
}

impl<T> FieldMetric<T> {
    pub const fn gauge(name: &'static str, help: &'static str, value: fn(&T) -> f64) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            value,
        }
    }

    pub const fn counter(name: &'static str, help: &'static str, value: fn(&T) -> f64) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Counter,
            value,
        }
    }

    pub fn sample(&self, source: &T) -> Sample {
        Sample::new(self.name, self.help, self.kind, (self.value)(source))
    }
}

fn emit_table<T>(table: &[FieldMetric<T>], source: &T, snapshot: &mut Snapshot) {
    for metric in table {
        snapshot.push(metric.sample(source));
    }
}

fn emit_labeled<T>(
    table: &[FieldMetric<T>],
    source: &T,
    label: &str,
    instance: &str,
    snapshot: &mut Snapshot,
) {
    for metric in table {
        snapshot.push(metric.sample(source).with_label(label, instance));
    }
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

// process_stats

const MOONRAKER_MEMORY: FieldMetric<MoonrakerProcStat> = FieldMetric::gauge(
    "klipper_moonraker_memory_kb",
    "Moonraker memory usage in Kb.",
    |s: &MoonrakerProcStat| s.memory,
);

const MOONRAKER_CPU: FieldMetric<MoonrakerProcStat> = FieldMetric::gauge(
    "klipper_moonraker_cpu_usage",
    "Moonraker CPU usage.",
    |s: &MoonrakerProcStat| s.cpu_usage,
);

const PROCESS_METRICS: &[FieldMetric<ProcStats>] = &[
    FieldMetric::gauge(
        "klipper_moonraker_websocket_connections",
        "Moonraker Websocket connection count.",
        |s: &ProcStats| s.websocket_connections,
    ),
    FieldMetric::gauge(
        "klipper_system_cpu_temp",
        "Klipper system CPU temperature in celsius.",
        |s: &ProcStats| s.cpu_temp,
    ),
    FieldMetric::gauge(
        "klipper_system_cpu",
        "Klipper system CPU usage.",
        |s: &ProcStats| {
            s.system_cpu_usage
                .get("cpu")
                .copied()
                .flatten()
                .unwrap_or(0.0)
        },
    ),
];

const SYSTEM_METRICS: &[FieldMetric<ProcStats>] = &[
    FieldMetric::gauge(
        "klipper_system_memory_total",
        "Klipper system total memory.",
        |s: &ProcStats| s.system_memory.total,
    ),
    FieldMetric::gauge(
        "klipper_system_memory_available",
        "Klipper system available memory.",
        |s: &ProcStats| s.system_memory.available,
    ),
    FieldMetric::gauge(
        "klipper_system_memory_used",
        "Klipper system used memory.",
        |s: &ProcStats| s.system_memory.used,
    ),
    FieldMetric::gauge(
        "klipper_system_uptime",
        "Klipper system uptime.",
        |s: &ProcStats| s.system_uptime,
    ),
];

/// Moonraker process, host CPU and host memory samples.
///
/// The Moonraker process samples come from the most recent
/// `moonraker_stats` entry and are skipped when the list is empty.
pub fn emit_process_stats(stats: &ProcStats, snapshot: &mut Snapshot) {
    if let Some(latest) = stats.moonraker_stats.last() {
        if latest.mem_units == KILOBYTES {
            snapshot.push(MOONRAKER_MEMORY.sample(latest));
        } else {
            warn!(
                units = %latest.mem_units,
                "Unexpected Moonraker memory units, skipping memory sample"
            );
        }
        snapshot.push(MOONRAKER_CPU.sample(latest));
    }

    emit_table(PROCESS_METRICS, stats, snapshot);

    for (core, usage) in &stats.system_cpu_usage {
        if core == "cpu" {
            continue;
        }
        snapshot.push(
            Sample::gauge(
                "klipper_system_cpu_core_usage",
                "Klipper system CPU usage per core.",
                usage.unwrap_or(0.0),
            )
            .with_label("core", sanitize(core)),
        );
    }

    emit_table(SYSTEM_METRICS, stats, snapshot);
}

// network_stats

const NETWORK_METRICS: &[FieldMetric<NetworkStats>] = &[
    FieldMetric::counter(
        "klipper_network_rx_bytes",
        "Klipper network received bytes.",
        |n: &NetworkStats| n.rx_bytes,
    ),
    FieldMetric::counter(
        "klipper_network_tx_bytes",
        "Klipper network transmitted bytes.",
        |n: &NetworkStats| n.tx_bytes,
    ),
    FieldMetric::counter(
        "klipper_network_rx_packets",
        "Klipper network received packets.",
        |n: &NetworkStats| n.rx_packets,
    ),
    FieldMetric::counter(
        "klipper_network_tx_packets",
        "Klipper network transmitted packets.",
        |n: &NetworkStats| n.tx_packets,
    ),
    FieldMetric::counter(
        "klipper_network_rx_errs",
        "Klipper network received errored packets.",
        |n: &NetworkStats| n.rx_errs,
    ),
    FieldMetric::counter(
        "klipper_network_tx_errs",
        "Klipper network transmitted errored packets.",
        |n: &NetworkStats| n.tx_errs,
    ),
    FieldMetric::counter(
        "klipper_network_rx_drop",
        "Klipper network received dropped packets.",
        |n: &NetworkStats| n.rx_drop,
    ),
    FieldMetric::counter(
        "klipper_network_tx_drop",
        "Klipper network transmitted dropped packets.",
        |n: &NetworkStats| n.tx_drop,
    ),
    FieldMetric::gauge(
        "klipper_network_bandwidth",
        "Klipper network bandwidth.",
        |n: &NetworkStats| n.bandwidth,
    ),
];

/// Per-interface network samples, taken from the same reply as
/// [`emit_process_stats`].
pub fn emit_network_stats(stats: &ProcStats, snapshot: &mut Snapshot) {
    for (interface, network) in &stats.network {
        emit_labeled(
            NETWORK_METRICS,
            network,
            "interface",
            &sanitize(interface),
            snapshot,
        );
    }
}

// directory_info

const DIRECTORY_METRICS: &[FieldMetric<DirectoryInfo>] = &[
    FieldMetric::gauge(
        "klipper_disk_usage_total",
        "Klipper total disk space.",
        |d: &DirectoryInfo| d.disk_usage.total,
    ),
    FieldMetric::gauge(
        "klipper_disk_usage_used",
        "Klipper used disk space.",
        |d: &DirectoryInfo| d.disk_usage.used,
    ),
    FieldMetric::gauge(
        "klipper_disk_usage_available",
        "Klipper available disk space.",
        |d: &DirectoryInfo| d.disk_usage.free,
    ),
];

pub fn emit_directory_info(info: &DirectoryInfo, snapshot: &mut Snapshot) {
    emit_table(DIRECTORY_METRICS, info, snapshot);
}

// job_queue

const JOB_QUEUE_LENGTH: FieldMetric<JobQueue> = FieldMetric::gauge(
    "klipper_job_queue_length",
    "Klipper job queue length.",
    |q: &JobQueue| q.queued_jobs.len() as f64,
);

pub fn emit_job_queue(queue: &JobQueue, snapshot: &mut Snapshot) {
    snapshot.push(JOB_QUEUE_LENGTH.sample(queue));
}

// history

const HISTORY_TOTAL_METRICS: &[FieldMetric<JobTotals>] = &[
    FieldMetric::counter(
        "klipper_total_jobs",
        "Klipper number of total jobs.",
        |t: &JobTotals| t.total_jobs,
    ),
    FieldMetric::counter(
        "klipper_total_time",
        "Klipper total time.",
        |t: &JobTotals| t.total_time,
    ),
    FieldMetric::counter(
        "klipper_total_print_time",
        "Klipper total print time.",
        |t: &JobTotals| t.total_print_time,
    ),
    FieldMetric::counter(
        "klipper_total_filament_used",
        "Klipper total meters of filament used.",
        |t: &JobTotals| t.total_filament_used,
    ),
    FieldMetric::gauge(
        "klipper_longest_job",
        "Klipper longest job.",
        |t: &JobTotals| t.longest_job,
    ),
    FieldMetric::gauge(
        "klipper_longest_print",
        "Klipper longest print.",
        |t: &JobTotals| t.longest_print,
    ),
];

const CURRENT_PRINT_METRICS: &[FieldMetric<HistoryJob>] = &[
    FieldMetric::gauge(
        "klipper_current_print_object_height",
        "Klipper current print object height.",
        |j: &HistoryJob| j.metadata.object_height,
    ),
    FieldMetric::gauge(
        "klipper_current_print_first_layer_height",
        "Klipper current print first layer height.",
        |j: &HistoryJob| j.metadata.first_layer_height,
    ),
    FieldMetric::gauge(
        "klipper_current_print_layer_height",
        "Klipper current print layer height.",
        |j: &HistoryJob| j.metadata.layer_height,
    ),
    FieldMetric::gauge(
        "klipper_current_print_total_duration",
        "Klipper current print total duration.",
        |j: &HistoryJob| j.total_duration,
    ),
];

pub fn emit_history_totals(totals: &HistoryTotals, snapshot: &mut Snapshot) {
    emit_table(HISTORY_TOTAL_METRICS, &totals.job_totals, snapshot);
}

/// Current print samples from the latest history job.
///
/// Emitted as zero unless that job is still in progress.
pub fn emit_current_print(history: &HistoryList, snapshot: &mut Snapshot) {
    let idle = HistoryJob::default();
    let job = history
        .jobs
        .first()
        .filter(|job| job.is_in_progress())
        .unwrap_or(&idle);
    emit_table(CURRENT_PRINT_METRICS, job, snapshot);
}

// system_info

const CPU_COUNT: FieldMetric<SystemInfo> = FieldMetric::gauge(
    "klipper_system_cpu_count",
    "Klipper system CPU count.",
    |s: &SystemInfo| s.system_info.cpu_info.cpu_count,
);

pub fn emit_system_info(info: &SystemInfo, snapshot: &mut Snapshot) {
    snapshot.push(CPU_COUNT.sample(info));
}

// temperature

/// Latest reading of every field in the cached temperature store.
///
/// `temperature_sensor chamber` / `temperatures` becomes
/// `klipper_temperature_sensor_chamber_temperature`.
pub fn emit_temperature_store(store: &TemperatureStore, snapshot: &mut Snapshot) {
    for (object, fields) in store {
        let object_name = sanitize(&object.replace(' ', "_"));
        for (field, history) in fields {
            let Some(value) = history
                .as_array()
                .and_then(|readings| readings.last())
                .and_then(Value::as_f64)
            else {
                continue;
            };
            let field_name = sanitize(field.strip_suffix('s').unwrap_or(field));
            snapshot.push(Sample::gauge(
                format!("{METRIC_PREFIX}_{object_name}_{field_name}"),
                format!("Klipper {object} {field_name}"),
                value,
            ));
        }
    }
}

// printer_objects, fixed

fn position(objects: &FixedObjects, axis: usize) -> f64 {
    objects
        .gcode_move
        .gcode_position
        .get(axis)
        .copied()
        .unwrap_or(0.0)
}

const FIXED_OBJECT_METRICS: &[FieldMetric<FixedObjects>] = &[
    FieldMetric::gauge(
        "klipper_gcode_speed_factor",
        "Klipper gcode speed factor.",
        |o: &FixedObjects| o.gcode_move.speed_factor,
    ),
    FieldMetric::gauge(
        "klipper_gcode_speed",
        "Klipper gcode speed.",
        |o: &FixedObjects| o.gcode_move.speed,
    ),
    FieldMetric::gauge(
        "klipper_gcode_extrude_factor",
        "Klipper gcode extrude factor.",
        |o: &FixedObjects| o.gcode_move.extrude_factor,
    ),
    FieldMetric::gauge(
        "klipper_gcode_position_x",
        "Klipper gcode X position.",
        |o: &FixedObjects| position(o, 0),
    ),
    FieldMetric::gauge(
        "klipper_gcode_position_y",
        "Klipper gcode Y position.",
        |o: &FixedObjects| position(o, 1),
    ),
    FieldMetric::gauge(
        "klipper_gcode_position_z",
        "Klipper gcode Z position.",
        |o: &FixedObjects| position(o, 2),
    ),
    FieldMetric::gauge(
        "klipper_gcode_position_e",
        "Klipper gcode E position.",
        |o: &FixedObjects| position(o, 3),
    ),
    FieldMetric::gauge(
        "klipper_toolhead_print_time",
        "Klipper toolhead print time.",
        |o: &FixedObjects| o.toolhead.print_time,
    ),
    FieldMetric::gauge(
        "klipper_toolhead_estimated_print_time",
        "Klipper estimated print time.",
        |o: &FixedObjects| o.toolhead.estimated_print_time,
    ),
    FieldMetric::gauge(
        "klipper_toolhead_max_velocity",
        "Klipper toolhead max velocity.",
        |o: &FixedObjects| o.toolhead.max_velocity,
    ),
    FieldMetric::gauge(
        "klipper_toolhead_max_accel",
        "Klipper toolhead max acceleration.",
        |o: &FixedObjects| o.toolhead.max_accel,
    ),
    FieldMetric::gauge(
        "klipper_toolhead_max_accel_to_decel",
        "Klipper toolhead max acceleration to deceleration.",
        |o: &FixedObjects| o.toolhead.max_accel_to_decel,
    ),
    FieldMetric::gauge(
        "klipper_toolhead_square_corner_velocity",
        "Klipper toolhead square corner velocity.",
        |o: &FixedObjects| o.toolhead.square_corner_velocity,
    ),
    FieldMetric::gauge(
        "klipper_extruder_temperature",
        "Klipper extruder temperature.",
        |o: &FixedObjects| o.extruder.temperature,
    ),
    FieldMetric::gauge(
        "klipper_extruder_target",
        "Klipper extruder target temperature.",
        |o: &FixedObjects| o.extruder.target,
    ),
    FieldMetric::gauge(
        "klipper_extruder_power",
        "Klipper extruder power.",
        |o: &FixedObjects| o.extruder.power,
    ),
    FieldMetric::gauge(
        "klipper_extruder_pressure_advance",
        "Klipper extruder pressure advance.",
        |o: &FixedObjects| o.extruder.pressure_advance,
    ),
    FieldMetric::gauge(
        "klipper_extruder_smooth_time",
        "Klipper extruder smooth time.",
        |o: &FixedObjects| o.extruder.smooth_time,
    ),
    FieldMetric::gauge(
        "klipper_heater_bed_temperature",
        "Klipper heater bed temperature.",
        |o: &FixedObjects| o.heater_bed.temperature,
    ),
    FieldMetric::gauge(
        "klipper_heater_bed_target",
        "Klipper heater bed target temperature.",
        |o: &FixedObjects| o.heater_bed.target,
    ),
    FieldMetric::gauge(
        "klipper_heater_bed_power",
        "Klipper heater bed power.",
        |o: &FixedObjects| o.heater_bed.power,
    ),
    FieldMetric::gauge(
        "klipper_fan_speed",
        "Klipper part cooling fan speed.",
        |o: &FixedObjects| o.fan.speed,
    ),
    FieldMetric::gauge(
        "klipper_fan_rpm",
        "Klipper part cooling fan RPM.",
        |o: &FixedObjects| o.fan.rpm,
    ),
    FieldMetric::gauge(
        "klipper_printing_time",
        "Klipper printing time.",
        |o: &FixedObjects| o.idle_timeout.printing_time,
    ),
    FieldMetric::gauge(
        "klipper_print_file_progress",
        "Klipper print file progress.",
        |o: &FixedObjects| o.virtual_sdcard.progress,
    ),
    FieldMetric::gauge(
        "klipper_print_file_position",
        "Klipper print file position.",
        |o: &FixedObjects| o.virtual_sdcard.file_position,
    ),
    FieldMetric::gauge(
        "klipper_print_file_active",
        "Klipper print file is active.",
        |o: &FixedObjects| flag(o.virtual_sdcard.is_active),
    ),
    FieldMetric::gauge(
        "klipper_print_total_duration",
        "Klipper print total duration.",
        |o: &FixedObjects| o.print_stats.total_duration,
    ),
    FieldMetric::gauge(
        "klipper_print_print_duration",
        "Klipper print duration.",
        |o: &FixedObjects| o.print_stats.print_duration,
    ),
    FieldMetric::gauge(
        "klipper_print_filament_used",
        "Klipper print filament used.",
        |o: &FixedObjects| o.print_stats.filament_used,
    ),
    FieldMetric::gauge(
        "klipper_print_gcode_progress",
        "Klipper print gcode progress.",
        |o: &FixedObjects| o.display_status.progress,
    ),
];

// printer_objects, dynamic

const MCU_METRICS: &[FieldMetric<McuStats>] = &[
    FieldMetric::gauge(
        "klipper_mcu_awake",
        "Klipper mcu awake.",
        |m: &McuStats| m.mcu_awake,
    ),
    FieldMetric::gauge(
        "klipper_mcu_task_avg",
        "Klipper mcu task average.",
        |m: &McuStats| m.mcu_task_avg,
    ),
    FieldMetric::gauge(
        "klipper_mcu_task_stddev",
        "Klipper mcu task standard deviation.",
        |m: &McuStats| m.mcu_task_stddev,
    ),
    FieldMetric::gauge(
        "klipper_mcu_bytes_write",
        "Klipper mcu bytes written.",
        |m: &McuStats| m.bytes_write,
    ),
    FieldMetric::gauge(
        "klipper_mcu_bytes_read",
        "Klipper mcu bytes read.",
        |m: &McuStats| m.bytes_read,
    ),
    FieldMetric::gauge(
        "klipper_mcu_bytes_retransmit",
        "Klipper mcu bytes retransmitted.",
        |m: &McuStats| m.bytes_retransmit,
    ),
    FieldMetric::gauge(
        "klipper_mcu_bytes_invalid",
        "Klipper mcu invalid bytes.",
        |m: &McuStats| m.bytes_invalid,
    ),
    FieldMetric::gauge(
        "klipper_mcu_send_seq",
        "Klipper mcu send sequence.",
        |m: &McuStats| m.send_seq,
    ),
    FieldMetric::gauge(
        "klipper_mcu_receive_seq",
        "Klipper mcu receive sequence.",
        |m: &McuStats| m.receive_seq,
    ),
    FieldMetric::gauge(
        "klipper_mcu_retransmit_seq",
        "Klipper mcu retransmit sequence.",
        |m: &McuStats| m.retransmit_seq,
    ),
    FieldMetric::gauge(
        "klipper_mcu_srtt",
        "Klipper mcu smoothed round trip time.",
        |m: &McuStats| m.srtt,
    ),
    FieldMetric::gauge(
        "klipper_mcu_rttvar",
        "Klipper mcu round trip time variance.",
        |m: &McuStats| m.rttvar,
    ),
    FieldMetric::gauge(
        "klipper_mcu_rto",
        "Klipper mcu retransmission timeout.",
        |m: &McuStats| m.rto,
    ),
    FieldMetric::gauge(
        "klipper_mcu_ready_bytes",
        "Klipper mcu ready bytes.",
        |m: &McuStats| m.ready_bytes,
    ),
    FieldMetric::gauge(
        "klipper_mcu_stalled_bytes",
        "Klipper mcu stalled bytes.",
        |m: &McuStats| m.stalled_bytes,
    ),
    FieldMetric::gauge(
        "klipper_mcu_clock_frequency",
        "Klipper mcu clock frequency.",
        |m: &McuStats| m.freq,
    ),
];

const TEMPERATURE_SENSOR_METRICS: &[FieldMetric<TemperatureSensorStatus>] = &[
    FieldMetric::gauge(
        "klipper_temperature_sensor_temperature",
        "The temperature of the temperature sensor.",
        |t: &TemperatureSensorStatus| t.temperature,
    ),
    FieldMetric::gauge(
        "klipper_temperature_sensor_measured_min_temp",
        "The measured minimum temperature of the temperature sensor.",
        |t: &TemperatureSensorStatus| t.measured_min_temp,
    ),
    FieldMetric::gauge(
        "klipper_temperature_sensor_measured_max_temp",
        "The measured maximum temperature of the temperature sensor.",
        |t: &TemperatureSensorStatus| t.measured_max_temp,
    ),
];

const TEMPERATURE_FAN_METRICS: &[FieldMetric<TemperatureFanStatus>] = &[
    FieldMetric::gauge(
        "klipper_temperature_fan_speed",
        "The speed of the temperature fan.",
        |t: &TemperatureFanStatus| t.speed,
    ),
    FieldMetric::gauge(
        "klipper_temperature_fan_temperature",
        "The temperature of the temperature fan.",
        |t: &TemperatureFanStatus| t.temperature,
    ),
    FieldMetric::gauge(
        "klipper_temperature_fan_target",
        "The target temperature for the temperature fan.",
        |t: &TemperatureFanStatus| t.target,
    ),
];

const OUTPUT_PIN_METRICS: &[FieldMetric<OutputPinStatus>] = &[FieldMetric::gauge(
    "klipper_output_pin_value",
    "The value of the output pin.",
    |p: &OutputPinStatus| p.value,
)];

const GENERIC_FAN_METRICS: &[FieldMetric<FanStatus>] = &[
    FieldMetric::gauge(
        "klipper_fan_generic_speed",
        "The speed of the generic fan.",
        |f: &FanStatus| f.speed,
    ),
    FieldMetric::gauge(
        "klipper_fan_generic_rpm",
        "The RPM of the generic fan.",
        |f: &FanStatus| f.rpm,
    ),
];

const CONTROLLER_FAN_METRICS: &[FieldMetric<FanStatus>] = &[
    FieldMetric::gauge(
        "klipper_controller_fan_speed",
        "The speed of the controller fan.",
        |f: &FanStatus| f.speed,
    ),
    FieldMetric::gauge(
        "klipper_controller_fan_rpm",
        "The RPM of the controller fan.",
        |f: &FanStatus| f.rpm,
    ),
];

const FILAMENT_SENSOR_METRICS: &[FieldMetric<FilamentSensorStatus>] = &[
    FieldMetric::gauge(
        "klipper_filament_sensor_detected",
        "Whether filament is detected by the sensor.",
        |s: &FilamentSensorStatus| flag(s.filament_detected),
    ),
    FieldMetric::gauge(
        "klipper_filament_sensor_enabled",
        "Whether the filament sensor is enabled.",
        |s: &FilamentSensorStatus| flag(s.enabled),
    ),
];

/// Fixed printer object samples followed by every dynamic object, grouped
/// by kind and ordered by instance name.
pub fn emit_printer_objects(objects: &PrinterObjects, snapshot: &mut Snapshot) {
    emit_table(FIXED_OBJECT_METRICS, &objects.fixed, snapshot);

    for instances in objects.dynamic.values() {
        for (instance, status) in instances {
            let instance = sanitize(instance);
            match status {
                EntityStatus::Mcu(s) => emit_labeled(MCU_METRICS, s, "mcu", &instance, snapshot),
                EntityStatus::TemperatureSensor(s) => {
                    emit_labeled(TEMPERATURE_SENSOR_METRICS, s, "sensor", &instance, snapshot)
                }
                EntityStatus::TemperatureFan(s) => {
                    emit_labeled(TEMPERATURE_FAN_METRICS, s, "fan", &instance, snapshot)
                }
                EntityStatus::OutputPin(s) => {
                    emit_labeled(OUTPUT_PIN_METRICS, s, "pin", &instance, snapshot)
                }
                EntityStatus::GenericFan(s) => {
                    emit_labeled(GENERIC_FAN_METRICS, s, "fan", &instance, snapshot)
                }
                EntityStatus::ControllerFan(s) => {
                    emit_labeled(CONTROLLER_FAN_METRICS, s, "fan", &instance, snapshot)
                }
                EntityStatus::FilamentSensor(s) => {
                    emit_labeled(FILAMENT_SENSOR_METRICS, s, "sensor", &instance, snapshot)
                }
            }
        }
    }
}

// spoolman

const SPOOLMAN_METRICS: &[FieldMetric<SpoolmanStatus>] = &[
    FieldMetric::gauge(
        "klipper_spoolman_connected",
        "Whether Moonraker is connected to Spoolman.",
        |s: &SpoolmanStatus| flag(s.spoolman_connected),
    ),
    FieldMetric::gauge(
        "klipper_spoolman_pending_reports",
        "Number of filament usage reports waiting to be sent to Spoolman.",
        |s: &SpoolmanStatus| s.pending_reports.len() as f64,
    ),
];

pub fn emit_spoolman(status: &SpoolmanStatus, snapshot: &mut Snapshot) {
    emit_table(SPOOLMAN_METRICS, status, snapshot);

    if let Some(spool_id) = status.spool_id {
        snapshot.push(
            Sample::gauge(
                "klipper_spoolman_active_spool",
                "The currently active Spoolman spool.",
                1.0,
            )
            .with_label("spool_id", spool_id.to_string()),
        );
    }

    let mut pending: BTreeMap<i64, f64> = BTreeMap::new();
    for report in &status.pending_reports {
        if let Some(spool_id) = report.spool_id {
            *pending.entry(spool_id).or_default() += report.filament_used;
        }
    }
    for (spool_id, used) in pending {
        snapshot.push(
            Sample::gauge(
                "klipper_spoolman_pending_filament_used",
                "Filament used that has not yet been reported to Spoolman.",
                used,
            )
            .with_label("spool_id", spool_id.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::classify;
    use serde_json::json;

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    fn find<'a>(samples: &'a [Sample], name: &str) -> Option<&'a Sample> {
        samples.iter().find(|s| s.name == name)
    }

    fn find_labeled<'a>(
        samples: &'a [Sample],
        name: &str,
        label: &str,
        value: &str,
    ) -> Option<&'a Sample> {
        samples
            .iter()
            .find(|s| s.name == name && s.label(label) == Some(value))
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Chamber-Sensor #1"), "Chamber_Sensor1");
        assert_eq!(sanitize("wlan0"), "wlan0");
        assert_eq!(sanitize("my_sensor"), "my_sensor");
        assert_eq!(sanitize("Raspberry Pi"), "RaspberryPi");
        assert_eq!(sanitize("tëmp°"), "tmp");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_sanitize_alphabet() {
        for raw in ["a-b.c", "x y/z", "fan:1", "--", "\"quoted\"\n"] {
            let clean = sanitize(raw);
            assert!(
                clean.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "{raw:?} -> {clean:?}"
            );
        }
    }

    fn proc_stats_fixture() -> ProcStats {
        decode(json!({
            "moonraker_stats": [
                {"time": 1.0, "cpu_usage": 1.5, "memory": 40000, "mem_units": "kB"},
                {"time": 2.0, "cpu_usage": 2.62, "memory": 42196, "mem_units": "kB"}
            ],
            "cpu_temp": 45.2,
            "network": {
                "wlan0": {"rx_bytes": 1000, "tx_bytes": 2000, "bandwidth": 512.5},
                "lo": {"rx_bytes": 10, "tx_bytes": 10, "bandwidth": null}
            },
            "system_cpu_usage": {"cpu": 12.5, "cpu0": 10.0, "cpu1": 15.0},
            "system_memory": {"total": 3919812, "available": 2631068, "used": 1288744},
            "system_uptime": 6942.4,
            "websocket_connections": 3
        }))
    }

    #[test]
    fn test_process_stats() {
        let mut snapshot = Snapshot::new();
        emit_process_stats(&proc_stats_fixture(), &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(find(&samples, "klipper_moonraker_memory_kb").unwrap().value, 42196.0);
        assert_eq!(find(&samples, "klipper_moonraker_cpu_usage").unwrap().value, 2.62);
        assert_eq!(
            find(&samples, "klipper_moonraker_websocket_connections")
                .unwrap()
                .value,
            3.0
        );
        assert_eq!(find(&samples, "klipper_system_cpu_temp").unwrap().value, 45.2);
        assert_eq!(find(&samples, "klipper_system_cpu").unwrap().value, 12.5);
        assert_eq!(
            find_labeled(&samples, "klipper_system_cpu_core_usage", "core", "cpu1")
                .unwrap()
                .value,
            15.0
        );
        assert!(find_labeled(&samples, "klipper_system_cpu_core_usage", "core", "cpu").is_none());
        assert_eq!(find(&samples, "klipper_system_memory_used").unwrap().value, 1288744.0);
        assert_eq!(find(&samples, "klipper_system_uptime").unwrap().value, 6942.4);
        assert!(find(&samples, "klipper_network_rx_bytes").is_none());
    }

    #[test]
    fn test_process_stats_empty_moonraker_stats() {
        let mut stats = proc_stats_fixture();
        stats.moonraker_stats.clear();

        let mut snapshot = Snapshot::new();
        emit_process_stats(&stats, &mut snapshot);
        emit_network_stats(&stats, &mut snapshot);
        let samples = snapshot.into_samples();

        assert!(find(&samples, "klipper_moonraker_memory_kb").is_none());
        assert!(find(&samples, "klipper_moonraker_cpu_usage").is_none());
        assert!(find(&samples, "klipper_system_memory_total").is_some());
        assert!(find(&samples, "klipper_system_uptime").is_some());
        assert!(find(&samples, "klipper_network_rx_bytes").is_some());
    }

    #[test]
    fn test_process_stats_unexpected_memory_units() {
        let mut stats = proc_stats_fixture();
        if let Some(latest) = stats.moonraker_stats.last_mut() {
            latest.mem_units = "MB".to_string();
        }

        let mut snapshot = Snapshot::new();
        emit_process_stats(&stats, &mut snapshot);
        let samples = snapshot.into_samples();

        assert!(find(&samples, "klipper_moonraker_memory_kb").is_none());
        assert_eq!(find(&samples, "klipper_moonraker_cpu_usage").unwrap().value, 2.62);
    }

    #[test]
    fn test_network_stats() {
        let mut snapshot = Snapshot::new();
        emit_network_stats(&proc_stats_fixture(), &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(samples.len(), 2 * NETWORK_METRICS.len());
        let rx = find_labeled(&samples, "klipper_network_rx_bytes", "interface", "wlan0").unwrap();
        assert_eq!(rx.value, 1000.0);
        assert_eq!(rx.kind, MetricKind::Counter);
        let bandwidth =
            find_labeled(&samples, "klipper_network_bandwidth", "interface", "lo").unwrap();
        assert_eq!(bandwidth.value, 0.0);
        assert_eq!(bandwidth.kind, MetricKind::Gauge);
    }

    #[test]
    fn test_directory_info() {
        let info: DirectoryInfo = decode(json!({
            "dirs": [],
            "files": [],
            "disk_usage": {"total": 100, "used": 60, "free": 40},
            "root_info": {"name": "gcodes", "permissions": "rw"}
        }));

        let mut snapshot = Snapshot::new();
        emit_directory_info(&info, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(find(&samples, "klipper_disk_usage_total").unwrap().value, 100.0);
        assert_eq!(find(&samples, "klipper_disk_usage_available").unwrap().value, 40.0);
    }

    #[test]
    fn test_job_queue_length() {
        let queue: JobQueue = decode(json!({
            "queued_jobs": [
                {"filename": "a.gcode", "job_id": "0001", "time_added": 1.0, "time_in_queue": 2.0},
                {"filename": "b.gcode", "job_id": "0002", "time_added": 1.0, "time_in_queue": 1.0}
            ],
            "queue_state": "ready"
        }));

        let mut snapshot = Snapshot::new();
        emit_job_queue(&queue, &mut snapshot);

        assert_eq!(snapshot.samples()[0].name, "klipper_job_queue_length");
        assert_eq!(snapshot.samples()[0].value, 2.0);
    }

    #[test]
    fn test_history_totals() {
        let totals: HistoryTotals = decode(json!({
            "job_totals": {
                "total_jobs": 3,
                "total_time": 11748.77,
                "total_print_time": 11348.29,
                "total_filament_used": 11615.07,
                "longest_job": 11665.19,
                "longest_print": 11348.29
            }
        }));

        let mut snapshot = Snapshot::new();
        emit_history_totals(&totals, &mut snapshot);
        let samples = snapshot.into_samples();

        let jobs = find(&samples, "klipper_total_jobs").unwrap();
        assert_eq!(jobs.value, 3.0);
        assert_eq!(jobs.kind, MetricKind::Counter);
        assert_eq!(find(&samples, "klipper_longest_print").unwrap().kind, MetricKind::Gauge);
    }

    #[test]
    fn test_current_print_in_progress() {
        let history: HistoryList = decode(json!({
            "count": 1,
            "jobs": [{
                "status": "in_progress",
                "total_duration": 120.5,
                "metadata": {"object_height": 30.0, "first_layer_height": 0.3, "layer_height": 0.2}
            }]
        }));

        let mut snapshot = Snapshot::new();
        emit_current_print(&history, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(
            find(&samples, "klipper_current_print_object_height").unwrap().value,
            30.0
        );
        assert_eq!(
            find(&samples, "klipper_current_print_total_duration").unwrap().value,
            120.5
        );
    }

    #[test]
    fn test_current_print_not_in_progress_emits_zero() {
        let history: HistoryList = decode(json!({
            "count": 1,
            "jobs": [{
                "status": "completed",
                "total_duration": 120.5,
                "metadata": {"object_height": 30.0, "first_layer_height": 0.3, "layer_height": 0.2}
            }]
        }));

        let mut snapshot = Snapshot::new();
        emit_current_print(&history, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|s| s.value == 0.0));
    }

    #[test]
    fn test_current_print_without_jobs() {
        let mut snapshot = Snapshot::new();
        emit_current_print(&HistoryList::default(), &mut snapshot);

        assert_eq!(snapshot.len(), 4);
    }

    #[test]
    fn test_temperature_store() {
        let store: TemperatureStore = decode(json!({
            "extruder": {
                "temperatures": [21.0, 21.5, 22.0],
                "targets": [0.0, 0.0, 210.0],
                "powers": [0.0, 0.0, 1.0]
            },
            "temperature_sensor Raspberry-Pi": {
                "temperatures": [40.0, 41.0]
            },
            "heater_bed": {
                "temperatures": []
            }
        }));

        let mut snapshot = Snapshot::new();
        emit_temperature_store(&store, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(find(&samples, "klipper_extruder_temperature").unwrap().value, 22.0);
        assert_eq!(find(&samples, "klipper_extruder_target").unwrap().value, 210.0);
        assert_eq!(find(&samples, "klipper_extruder_power").unwrap().value, 1.0);
        assert_eq!(
            find(&samples, "klipper_temperature_sensor_Raspberry_Pi_temperature")
                .unwrap()
                .value,
            41.0
        );
        assert!(find(&samples, "klipper_heater_bed_temperature").is_none());
    }

    #[test]
    fn test_printer_objects() {
        let objects = classify(&json!({
            "gcode_move": {"speed_factor": 1.0, "speed": 1500, "extrude_factor": 1.0,
                           "gcode_position": [10.0, 20.0, 0.4, 100.5]},
            "virtual_sdcard": {"progress": 0.25, "is_active": true, "file_position": 4096},
            "fan": {"speed": 0.5, "rpm": null},
            "mcu": {"last_stats": {"mcu_awake": 0.003, "freq": 16000000}},
            "mcu ebb-36": {"last_stats": {"srtt": 0.001}},
            "temperature_sensor Chamber": {"temperature": 38.5},
            "temperature_fan exhaust": {"speed": 0.3, "temperature": 40.0, "target": 45.0},
            "output_pin caselight": {"value": 1.0},
            "fan_generic nevermore": {"speed": 0.8, "rpm": 2000},
            "controller_fan board": {"speed": 1.0, "rpm": null},
            "filament_switch_sensor Extruder": {"filament_detected": false, "enabled": true}
        }));

        let mut snapshot = Snapshot::new();
        emit_printer_objects(&objects, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(find(&samples, "klipper_gcode_position_z").unwrap().value, 0.4);
        assert_eq!(find(&samples, "klipper_gcode_position_e").unwrap().value, 100.5);
        assert_eq!(find(&samples, "klipper_print_file_active").unwrap().value, 1.0);
        assert_eq!(find(&samples, "klipper_fan_rpm").unwrap().value, 0.0);
        assert_eq!(
            find_labeled(&samples, "klipper_mcu_clock_frequency", "mcu", "mcu")
                .unwrap()
                .value,
            16_000_000.0
        );
        assert_eq!(
            find_labeled(&samples, "klipper_mcu_srtt", "mcu", "ebb_36")
                .unwrap()
                .value,
            0.001
        );
        assert_eq!(
            find_labeled(&samples, "klipper_temperature_sensor_temperature", "sensor", "Chamber")
                .unwrap()
                .value,
            38.5
        );
        assert_eq!(
            find_labeled(&samples, "klipper_temperature_fan_target", "fan", "exhaust")
                .unwrap()
                .value,
            45.0
        );
        assert_eq!(
            find_labeled(&samples, "klipper_output_pin_value", "pin", "caselight")
                .unwrap()
                .value,
            1.0
        );
        assert_eq!(
            find_labeled(&samples, "klipper_fan_generic_rpm", "fan", "nevermore")
                .unwrap()
                .value,
            2000.0
        );
        assert!(find_labeled(&samples, "klipper_controller_fan_speed", "fan", "board").is_some());
        assert_eq!(
            find_labeled(&samples, "klipper_filament_sensor_detected", "sensor", "Extruder")
                .unwrap()
                .value,
            0.0
        );
        assert_eq!(
            find_labeled(&samples, "klipper_filament_sensor_enabled", "sensor", "Extruder")
                .unwrap()
                .value,
            1.0
        );
    }

    #[test]
    fn test_printer_objects_missing_position() {
        let objects = classify(&json!({"gcode_move": {"gcode_position": [1.0]}}));

        let mut snapshot = Snapshot::new();
        emit_printer_objects(&objects, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(find(&samples, "klipper_gcode_position_x").unwrap().value, 1.0);
        assert_eq!(find(&samples, "klipper_gcode_position_y").unwrap().value, 0.0);
        assert_eq!(samples.len(), FIXED_OBJECT_METRICS.len());
    }

    #[test]
    fn test_spoolman() {
        let status: SpoolmanStatus = decode(json!({
            "spoolman_connected": true,
            "pending_reports": [
                {"spool_id": 7, "filament_used": 10.5},
                {"spool_id": 7, "filament_used": 2.0},
                {"spool_id": null, "filament_used": 3.0}
            ],
            "spool_id": 7
        }));

        let mut snapshot = Snapshot::new();
        emit_spoolman(&status, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(find(&samples, "klipper_spoolman_connected").unwrap().value, 1.0);
        assert_eq!(find(&samples, "klipper_spoolman_pending_reports").unwrap().value, 3.0);
        assert_eq!(
            find_labeled(&samples, "klipper_spoolman_active_spool", "spool_id", "7")
                .unwrap()
                .value,
            1.0
        );
        assert_eq!(
            find_labeled(&samples, "klipper_spoolman_pending_filament_used", "spool_id", "7")
                .unwrap()
                .value,
            12.5
        );
    }

    #[test]
    fn test_spoolman_without_active_spool() {
        let status: SpoolmanStatus = decode(json!({"spoolman_connected": false, "spool_id": null}));

        let mut snapshot = Snapshot::new();
        emit_spoolman(&status, &mut snapshot);
        let samples = snapshot.into_samples();

        assert_eq!(find(&samples, "klipper_spoolman_connected").unwrap().value, 0.0);
        assert!(find(&samples, "klipper_spoolman_active_spool").is_none());
    }
}
