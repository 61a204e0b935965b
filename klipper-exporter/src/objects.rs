//! Printer object classification.
//!
//! The printer object status document mixes objects with a fixed schema
//! (`toolhead`, `extruder`, ...) and objects whose names come from the
//! printer configuration (`temperature_sensor chamber`, `mcu rpi`, ...).
//! [`classify`] decodes the document in two independent passes: a per-object
//! serde pass into [`FixedObjects`] and a scan of the raw keys against [`NAME_RULES`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::moonraker::types::nullable;

/// Instance name given to the primary `mcu` object.
pub const DEFAULT_MCU: &str = "mcu";

/// Fixed objects and the fields requested for each (`None` = all fields).
pub const FIXED_OBJECT_QUERY: &[(&str, Option<&str>)] = &[
    (
        "gcode_move",
        Some("speed_factor,speed,extrude_factor,gcode_position"),
    ),
    (
        "toolhead",
        Some(
            "print_time,estimated_print_time,max_velocity,max_accel,max_accel_to_decel,square_corner_velocity",
        ),
    ),
    ("extruder", None),
    ("heater_bed", None),
    ("fan", None),
    ("idle_timeout", None),
    ("virtual_sdcard", None),
    ("print_stats", Some("total_duration,print_duration,filament_used")),
    ("display_status", None),
];

/// Fields requested for every microcontroller object.
pub const MCU_QUERY_FIELDS: &str = "last_stats";

/// Kind of dynamically named printer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityGroup {
    Microcontroller,
    TemperatureSensor,
    TemperatureFan,
    OutputPin,
    GenericFan,
    ControllerFan,
    FilamentSensor,
}

impl EntityGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityGroup::Microcontroller => "microcontroller",
            EntityGroup::TemperatureSensor => "temperature_sensor",
            EntityGroup::TemperatureFan => "temperature_fan",
            EntityGroup::OutputPin => "output_pin",
            EntityGroup::GenericFan => "generic_fan",
            EntityGroup::ControllerFan => "controller_fan",
            EntityGroup::FilamentSensor => "filament_sensor",
        }
    }
}

impl fmt::Display for EntityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps an object-name prefix to a group.
#[derive(Debug, Clone, Copy)]
pub struct NameRule {
    pub prefix: &'static str,
    pub group: EntityGroup,
    /// Trim whitespace around the instance name.
    pub trim: bool,
}

/// Prefix rules in evaluation order; the first match wins.
///
/// A name matches when it starts with the prefix followed by one space.
/// A bare `mcu` is handled before the rules and yields [`DEFAULT_MCU`].
pub const NAME_RULES: &[NameRule] = &[
    NameRule {
        prefix: "mcu",
        group: EntityGroup::Microcontroller,
        trim: true,
    },
    NameRule {
        prefix: "temperature_sensor",
        group: EntityGroup::TemperatureSensor,
        trim: false,
    },
    NameRule {
        prefix: "temperature_fan",
        group: EntityGroup::TemperatureFan,
        trim: false,
    },
    NameRule {
        prefix: "output_pin",
        group: EntityGroup::OutputPin,
        trim: false,
    },
    NameRule {
        prefix: "fan_generic",
        group: EntityGroup::GenericFan,
        trim: false,
    },
    NameRule {
        prefix: "controller_fan",
        group: EntityGroup::ControllerFan,
        trim: false,
    },
    NameRule {
        prefix: "filament_switch_sensor",
        group: EntityGroup::FilamentSensor,
        trim: true,
    },
    NameRule {
        prefix: "filament_motion_sensor",
        group: EntityGroup::FilamentSensor,
        trim: true,
    },
];

/// A dynamically named object recognised from its upstream name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicEntity {
    pub group: EntityGroup,
    pub instance: String,
}

/// Classify an object name, or `None` if it is not a dynamic object.
pub fn classify_name(name: &str) -> Option<DynamicEntity> {
    if name == DEFAULT_MCU {
        return Some(DynamicEntity {
            group: EntityGroup::Microcontroller,
            instance: DEFAULT_MCU.to_string(),
        });
    }

    NAME_RULES.iter().find_map(|rule| {
        let rest = name.strip_prefix(rule.prefix)?.strip_prefix(' ')?;
        let instance = if rule.trim { rest.trim() } else { rest };
        if instance.is_empty() {
            return None;
        }
        Some(DynamicEntity {
            group: rule.group,
            instance: instance.to_string(),
        })
    })
}

// Fixed schema objects.

#[derive(Debug, Default)]
pub struct FixedObjects {
    pub gcode_move: GcodeMove,
    pub toolhead: Toolhead,
    pub extruder: Extruder,
    pub heater_bed: HeaterBed,
    pub fan: FanStatus,
    pub idle_timeout: IdleTimeout,
    pub virtual_sdcard: VirtualSdCard,
    pub print_stats: PrintStats,
    pub display_status: DisplayStatus,
}

impl FixedObjects {
    /// Decode each fixed object on its own, so one malformed object only
    /// resets itself.
    pub fn from_status(status: &Value) -> Self {
        Self {
            gcode_move: fixed_object(status, "gcode_move"),
            toolhead: fixed_object(status, "toolhead"),
            extruder: fixed_object(status, "extruder"),
            heater_bed: fixed_object(status, "heater_bed"),
            fan: fixed_object(status, "fan"),
            idle_timeout: fixed_object(status, "idle_timeout"),
            virtual_sdcard: fixed_object(status, "virtual_sdcard"),
            print_stats: fixed_object(status, "print_stats"),
            display_status: fixed_object(status, "display_status"),
        }
    }
}

/// Absent and `null` objects read as defaults; a decode failure is logged.
fn fixed_object<T>(status: &Value, object: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match status.get(object) {
        None | Some(Value::Null) => T::default(),
        Some(value) => T::deserialize(value).unwrap_or_else(|e| {
            warn!(object, error = %e, "Unable to decode printer object");
            T::default()
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GcodeMove {
    pub speed_factor: f64,
    pub speed: f64,
    pub extrude_factor: f64,
    /// `[x, y, z, e]`.
    pub gcode_position: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Toolhead {
    pub print_time: f64,
    pub estimated_print_time: f64,
    pub max_velocity: f64,
    pub max_accel: f64,
    pub max_accel_to_decel: f64,
    pub square_corner_velocity: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Extruder {
    pub temperature: f64,
    pub target: f64,
    pub power: f64,
    pub pressure_advance: f64,
    pub smooth_time: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HeaterBed {
    pub temperature: f64,
    pub target: f64,
    pub power: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FanStatus {
    pub speed: f64,
    /// `null` when the fan has no tachometer.
    #[serde(deserialize_with = "nullable")]
    pub rpm: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdleTimeout {
    pub state: String,
    pub printing_time: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VirtualSdCard {
    pub progress: f64,
    pub is_active: bool,
    pub file_position: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrintStats {
    pub total_duration: f64,
    pub print_duration: f64,
    pub filament_used: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DisplayStatus {
    pub progress: f64,
}

// Dynamic objects. Each is built field by field from the raw JSON value so
// that unknown, missing or mistyped fields read as zero.

#[derive(Debug, Default, Clone, PartialEq)]
pub struct McuStats {
    pub mcu_awake: f64,
    pub mcu_task_avg: f64,
    pub mcu_task_stddev: f64,
    pub bytes_write: f64,
    pub bytes_read: f64,
    pub bytes_retransmit: f64,
    pub bytes_invalid: f64,
    pub send_seq: f64,
    pub receive_seq: f64,
    pub retransmit_seq: f64,
    pub srtt: f64,
    pub rttvar: f64,
    pub rto: f64,
    pub ready_bytes: f64,
    pub stalled_bytes: f64,
    pub freq: f64,
}

impl McuStats {
    fn from_value(value: &Value) -> Self {
        let stats = value.get("last_stats").unwrap_or(&Value::Null);
        Self {
            mcu_awake: number(stats, "mcu_awake"),
            mcu_task_avg: number(stats, "mcu_task_avg"),
            mcu_task_stddev: number(stats, "mcu_task_stddev"),
            bytes_write: number(stats, "bytes_write"),
            bytes_read: number(stats, "bytes_read"),
            bytes_retransmit: number(stats, "bytes_retransmit"),
            bytes_invalid: number(stats, "bytes_invalid"),
            send_seq: number(stats, "send_seq"),
            receive_seq: number(stats, "receive_seq"),
            retransmit_seq: number(stats, "retransmit_seq"),
            srtt: number(stats, "srtt"),
            rttvar: number(stats, "rttvar"),
            rto: number(stats, "rto"),
            ready_bytes: number(stats, "ready_bytes"),
            stalled_bytes: number(stats, "stalled_bytes"),
            freq: number(stats, "freq"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TemperatureSensorStatus {
    pub temperature: f64,
    pub measured_min_temp: f64,
    pub measured_max_temp: f64,
}

impl TemperatureSensorStatus {
    fn from_value(value: &Value) -> Self {
        Self {
            temperature: number(value, "temperature"),
            measured_min_temp: number(value, "measured_min_temp"),
            measured_max_temp: number(value, "measured_max_temp"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TemperatureFanStatus {
    pub speed: f64,
    pub temperature: f64,
    pub target: f64,
}

impl TemperatureFanStatus {
    fn from_value(value: &Value) -> Self {
        Self {
            speed: number(value, "speed"),
            temperature: number(value, "temperature"),
            target: number(value, "target"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutputPinStatus {
    pub value: f64,
}

impl OutputPinStatus {
    fn from_value(value: &Value) -> Self {
        Self {
            value: number(value, "value"),
        }
    }
}

impl FanStatus {
    fn from_value(value: &Value) -> Self {
        Self {
            speed: number(value, "speed"),
            rpm: number(value, "rpm"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FilamentSensorStatus {
    pub filament_detected: bool,
    pub enabled: bool,
}

impl FilamentSensorStatus {
    fn from_value(value: &Value) -> Self {
        Self {
            filament_detected: flag(value, "filament_detected"),
            enabled: flag(value, "enabled"),
        }
    }
}

/// Typed fields of one dynamic object.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityStatus {
    Mcu(McuStats),
    TemperatureSensor(TemperatureSensorStatus),
    TemperatureFan(TemperatureFanStatus),
    OutputPin(OutputPinStatus),
    GenericFan(FanStatus),
    ControllerFan(FanStatus),
    FilamentSensor(FilamentSensorStatus),
}

impl EntityStatus {
    /// Decode a raw object value using the decoder for `group`.
    pub fn decode(group: EntityGroup, value: &Value) -> Self {
        match group {
            EntityGroup::Microcontroller => EntityStatus::Mcu(McuStats::from_value(value)),
            EntityGroup::TemperatureSensor => {
                EntityStatus::TemperatureSensor(TemperatureSensorStatus::from_value(value))
            }
            EntityGroup::TemperatureFan => {
                EntityStatus::TemperatureFan(TemperatureFanStatus::from_value(value))
            }
            EntityGroup::OutputPin => EntityStatus::OutputPin(OutputPinStatus::from_value(value)),
            EntityGroup::GenericFan => EntityStatus::GenericFan(FanStatus::from_value(value)),
            EntityGroup::ControllerFan => EntityStatus::ControllerFan(FanStatus::from_value(value)),
            EntityGroup::FilamentSensor => {
                EntityStatus::FilamentSensor(FilamentSensorStatus::from_value(value))
            }
        }
    }
}

/// Group -> instance name -> fields.
pub type DynamicEntities = BTreeMap<EntityGroup, BTreeMap<String, EntityStatus>>;

/// A classified printer object status document.
#[derive(Debug, Default)]
pub struct PrinterObjects {
    pub fixed: FixedObjects,
    pub dynamic: DynamicEntities,
}

impl PrinterObjects {
    /// Instances of one group, ordered by name.
    pub fn group(&self, group: EntityGroup) -> impl Iterator<Item = (&str, &EntityStatus)> {
        self.dynamic
            .get(&group)
            .into_iter()
            .flat_map(|instances| instances.iter().map(|(name, status)| (name.as_str(), status)))
    }
}

/// Split a printer object status document into fixed and dynamic objects.
///
/// The two passes are independent: a malformed fixed object falls back to
/// its defaults without affecting the other objects or the dynamic scan.
pub fn classify(status: &Value) -> PrinterObjects {
    let fixed = FixedObjects::from_status(status);

    let mut dynamic = DynamicEntities::new();
    if let Some(objects) = status.as_object() {
        for (name, value) in objects {
            if let Some(entity) = classify_name(name) {
                dynamic
                    .entry(entity.group)
                    .or_default()
                    .insert(entity.instance, EntityStatus::decode(entity.group, value));
            }
        }
    }

    PrinterObjects { fixed, dynamic }
}

/// Read a numeric field; booleans read as 0/1, anything else as 0.
fn number(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}
