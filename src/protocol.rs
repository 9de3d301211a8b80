//! Wire formats exchanged with the peer device.
//!
//! ```text
//! telemetry  -> "12.50\n"
//! command    -> {"comando":"power","estado":"on","timestamp":"..."}\n
//! state      <- {"temperatura_actual":21.5,...,"timestamp":"..."}\n
//! ```
//!
//! Every line is self-contained; decoding either yields a complete value or a
//! [`CodecError`], never a partially filled one.

use crate::record::{ClimatizerMode, DisplayMode, StateRecord, ThermostatRecord, ThermostatState};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Hard plausibility limits for `temperatura_actual`, in °C.
pub const SANITY_MIN_C: f64 = -40.0;
pub const SANITY_MAX_C: f64 = 85.0;

pub const SETPOINT_MIN_C: f64 = 15.0;
pub const SETPOINT_MAX_C: f64 = 35.0;

/// Longest command or state line accepted, excluding the newline.
pub const MAX_LINE_SIZE: usize = 4096;

pub const STATE_FIELDS: [&str; 8] = [
    "temperatura_actual",
    "temperatura_deseada",
    "modo_climatizador",
    "falla_sensor",
    "bateria_baja",
    "encendido",
    "modo_display",
    "timestamp",
];

const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

type JsonObject = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecErrorKind {
    EncodingNotApplicable,
    MalformedMessage,
    MissingField,
    InvalidFieldType,
    OutOfSanityBound,
    InvalidEnumValue,
    InvalidTimestamp,
    MessageTooLarge,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("reading {0} cannot be encoded as a telemetry line")]
    EncodingNotApplicable(f64),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    InvalidFieldType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` = {value} is outside [{min}, {max}]")]
    OutOfSanityBound {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("field `{field}` has unknown value {value:?}")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("line of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },
}

impl CodecError {
    pub fn kind(&self) -> CodecErrorKind {
        match self {
            CodecError::EncodingNotApplicable(_) => CodecErrorKind::EncodingNotApplicable,
            CodecError::MalformedMessage(_) => CodecErrorKind::MalformedMessage,
            CodecError::MissingField(_) => CodecErrorKind::MissingField,
            CodecError::InvalidFieldType { .. } => CodecErrorKind::InvalidFieldType,
            CodecError::OutOfSanityBound { .. } => CodecErrorKind::OutOfSanityBound,
            CodecError::InvalidEnumValue { .. } => CodecErrorKind::InvalidEnumValue,
            CodecError::InvalidTimestamp(_) => CodecErrorKind::InvalidTimestamp,
            CodecError::MessageTooLarge { .. } => CodecErrorKind::MessageTooLarge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("desired temperature {value} outside [{min}, {max}]")]
    SetpointOutOfRange { value: f64, min: f64, max: f64 },

    #[error("setpoint limits [{min}, {max}] are not a valid range")]
    InvalidBounds { min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandKind {
    Power { on: bool },
    SetDesiredTemp { value: f64 },
    SetDisplayMode { mode: DisplayMode },
}

/// Instruction for the thermostat device. Arguments are checked when the
/// command is built, so a constructed command is always sendable.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: CommandKind,
    timestamp: DateTime<Utc>,
}

impl Command {
    pub fn power(on: bool) -> Self {
        Self::from_kind(CommandKind::Power { on })
    }

    /// Setpoint command limited to [`SETPOINT_MIN_C`, `SETPOINT_MAX_C`].
    pub fn set_desired_temp(value: f64) -> Result<Self, CommandError> {
        Self::set_desired_temp_within(value, SETPOINT_MIN_C, SETPOINT_MAX_C)
    }

    pub fn set_desired_temp_within(value: f64, min: f64, max: f64) -> Result<Self, CommandError> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(CommandError::InvalidBounds { min, max });
        }
        if !value.is_finite() || value < min || value > max {
            return Err(CommandError::SetpointOutOfRange { value, min, max });
        }
        Ok(Self::from_kind(CommandKind::SetDesiredTemp { value }))
    }

    pub fn set_display_mode(mode: DisplayMode) -> Self {
        Self::from_kind(CommandKind::SetDisplayMode { mode })
    }

    fn from_kind(kind: CommandKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Value of the `comando` tag on the wire.
    pub fn name(&self) -> &'static str {
        match self.kind {
            CommandKind::Power { .. } => "power",
            CommandKind::SetDesiredTemp { .. } => "set_temp_deseada",
            CommandKind::SetDisplayMode { .. } => "set_modo_display",
        }
    }
}

pub fn encode_telemetry(record: &StateRecord<f64>) -> Result<String, CodecError> {
    let value = *record.value();
    if !value.is_finite() {
        return Err(CodecError::EncodingNotApplicable(value));
    }
    Ok(format!("{:.2}\n", value))
}

pub fn decode_telemetry(line: &str) -> Result<f64, CodecError> {
    let trimmed = line.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(CodecError::MalformedMessage(format!("non-finite reading {:?}", trimmed))),
        Err(e) => Err(CodecError::MalformedMessage(format!("{:?}: {}", trimmed, e))),
    }
}

pub fn encode_command(command: &Command) -> String {
    let timestamp = format_timestamp(command.timestamp);
    let json = match command.kind {
        CommandKind::Power { on } => serde_json::json!({
            "comando": command.name(),
            "estado": if on { "on" } else { "off" },
            "timestamp": timestamp,
        }),
        CommandKind::SetDesiredTemp { value } => serde_json::json!({
            "comando": command.name(),
            "valor": value,
            "timestamp": timestamp,
        }),
        CommandKind::SetDisplayMode { mode } => serde_json::json!({
            "comando": command.name(),
            "modo": mode.as_wire_str(),
            "timestamp": timestamp,
        }),
    };

    let mut line = json.to_string();
    line.push('\n');
    line
}

/// Parse a command line as the device would. The setpoint is checked against
/// the default limits.
pub fn decode_command(line: &str) -> Result<Command, CodecError> {
    let object = parse_object(line)?;
    let tag = string_field(&object, "comando")?;
    let timestamp = parse_timestamp(string_field(&object, "timestamp")?)?;

    let kind = match tag {
        "power" => {
            let on = match string_field(&object, "estado")? {
                "on" => true,
                "off" => false,
                other => {
                    return Err(CodecError::InvalidEnumValue {
                        field: "estado",
                        value: other.to_string(),
                    })
                }
            };
            CommandKind::Power { on }
        }
        "set_temp_deseada" => {
            let value = number_field(&object, "valor")?;
            check_bound("valor", value, SETPOINT_MIN_C, SETPOINT_MAX_C)?;
            CommandKind::SetDesiredTemp { value }
        }
        "set_modo_display" => {
            let mode = display_mode_field(&object, "modo")?;
            CommandKind::SetDisplayMode { mode }
        }
        other => {
            return Err(CodecError::InvalidEnumValue {
                field: "comando",
                value: other.to_string(),
            })
        }
    };

    Ok(Command { kind, timestamp })
}

pub fn decode_state(line: &str) -> Result<ThermostatRecord, CodecError> {
    let object = parse_object(line)?;

    if let Some(missing) = STATE_FIELDS.iter().find(|name| !object.contains_key(**name)) {
        return Err(CodecError::MissingField(*missing));
    }

    let current_temp = number_field(&object, "temperatura_actual")?;
    check_bound("temperatura_actual", current_temp, SANITY_MIN_C, SANITY_MAX_C)?;
    let desired_temp = number_field(&object, "temperatura_deseada")?;

    let mode_str = string_field(&object, "modo_climatizador")?;
    let climatizer_mode =
        ClimatizerMode::from_wire_str(mode_str).ok_or_else(|| CodecError::InvalidEnumValue {
            field: "modo_climatizador",
            value: mode_str.to_string(),
        })?;

    let state = ThermostatState {
        current_temp,
        desired_temp,
        climatizer_mode,
        sensor_fault: bool_field(&object, "falla_sensor")?,
        low_battery: bool_field(&object, "bateria_baja")?,
        powered: bool_field(&object, "encendido")?,
        display_mode: display_mode_field(&object, "modo_display")?,
    };
    let timestamp = parse_timestamp(string_field(&object, "timestamp")?)?;

    Ok(StateRecord::with_timestamp(state, timestamp))
}

/// Serialize a thermostat state the way the device reports it.
pub fn encode_state(record: &ThermostatRecord) -> String {
    let state = record.value();
    let json = serde_json::json!({
        "temperatura_actual": state.current_temp,
        "temperatura_deseada": state.desired_temp,
        "modo_climatizador": state.climatizer_mode.as_wire_str(),
        "falla_sensor": state.sensor_fault,
        "bateria_baja": state.low_battery,
        "encendido": state.powered,
        "modo_display": state.display_mode.as_wire_str(),
        "timestamp": format_timestamp(record.timestamp()),
    });

    let mut line = json.to_string();
    line.push('\n');
    line
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 and offset-less ISO-8601 (read as UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CodecError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| CodecError::InvalidTimestamp(raw.to_string()))
}

fn parse_object(line: &str) -> Result<JsonObject, CodecError> {
    let line = line.trim();
    if line.len() > MAX_LINE_SIZE {
        return Err(CodecError::MessageTooLarge {
            size: line.len(),
            max: MAX_LINE_SIZE,
        });
    }

    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(CodecError::MalformedMessage("expected a JSON object".to_string())),
        Err(e) => Err(CodecError::MalformedMessage(e.to_string())),
    }
}

fn field<'a>(object: &'a JsonObject, name: &'static str) -> Result<&'a Value, CodecError> {
    object.get(name).ok_or(CodecError::MissingField(name))
}

fn number_field(object: &JsonObject, name: &'static str) -> Result<f64, CodecError> {
    field(object, name)?
        .as_f64()
        .ok_or(CodecError::InvalidFieldType {
            field: name,
            expected: "a number",
        })
}

fn bool_field(object: &JsonObject, name: &'static str) -> Result<bool, CodecError> {
    field(object, name)?
        .as_bool()
        .ok_or(CodecError::InvalidFieldType {
            field: name,
            expected: "a boolean",
        })
}

fn string_field<'a>(object: &'a JsonObject, name: &'static str) -> Result<&'a str, CodecError> {
    field(object, name)?
        .as_str()
        .ok_or(CodecError::InvalidFieldType {
            field: name,
            expected: "a string",
        })
}

fn display_mode_field(object: &JsonObject, name: &'static str) -> Result<DisplayMode, CodecError> {
    let raw = string_field(object, name)?;
    DisplayMode::from_wire_str(raw).ok_or_else(|| CodecError::InvalidEnumValue {
        field: name,
        value: raw.to_string(),
    })
}

fn check_bound(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), CodecError> {
    if value < min || value > max {
        return Err(CodecError::OutOfSanityBound { field, value, min, max });
    }
    Ok(())
}
