//! Frame payload protocol.
//!
//! This module owns the shape of **every payload that crosses the socket**
//! once a frame has been decompressed.
//!
//! ## Payload forms
//!
//! | Form              | Example                                       |
//! |-------------------|-----------------------------------------------|
//! | Kill-switch       | `DISABLE`                                     |
//! | Hide              | `HIDE:<id>` (id is plaintext, never obfuscated) |
//! | Record batch      | JSON array of settings / entity arrays        |
//!
//! ## Record layouts (after de-obfuscation)
//!
//! ```text
//! settings: ["S", mapEnabled 0|1, circlePaused 0|1, radiusMeters, lat, lng]
//! entity:   [id, displayName|0, [flag, ..], lat, lng, avatarRef|0, battery, hp, time|0, ..]
//! ```
//!
//! Optional string slots use `0` as "absent".  Anything past the `time`
//! slot is ignored.

use serde::Serialize;
use serde_json::Value;

use crate::types::{EntityRecord, FlagSet, SettingsRecord};

pub const DISABLE: &str = "DISABLE";
pub const HIDE_PREFIX: &str = "HIDE:";
pub const SETTINGS_TAG: &str = "S";

/// Fixed notice presented once the session is over, whatever the trigger.
pub const DISABLED_NOTICE: &str = "The map has been disabled. Come back later.";

// ---------------------------------------------------------------------------
// Control commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Server kill-switch.
    Disable,
    /// Permanently hide one participant for the rest of the session.
    Hide { id: String },
}

impl ControlCommand {
    /// Match `text` against the two literal control forms.
    ///
    /// `HIDE:` with nothing after it is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        if text == DISABLE {
            return Some(ControlCommand::Disable);
        }
        match text.strip_prefix(HIDE_PREFIX) {
            Some(id) if !id.is_empty() => Some(ControlCommand::Hide { id: id.to_string() }),
            _ => None,
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::Disable => f.write_str(DISABLE),
            ControlCommand::Hide { id } => write!(f, "{}{}", HIDE_PREFIX, id),
        }
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Record {
    Settings(SettingsRecord),
    Entity(EntityRecord),
}

/// Everything one frame carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodedBatch {
    Control(ControlCommand),
    Records(Vec<Record>),
}

impl DecodedBatch {
    pub fn empty() -> Self {
        DecodedBatch::Records(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DecodedBatch::Records(r) if r.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Record recovery (plaintext fields → typed record)
// ---------------------------------------------------------------------------

/// Classify and type one de-obfuscated record.
///
/// Returns `None` for a record too malformed to use (missing id or
/// coordinates, wrong slot types).  Callers skip it and carry on with the
/// rest of the batch.
pub fn record_from_fields(fields: &[Value]) -> Option<Record> {
    match fields.first() {
        Some(Value::String(tag)) if tag == SETTINGS_TAG => settings_from_fields(fields),
        Some(Value::String(_)) => entity_from_fields(fields),
        _ => None,
    }
}

fn settings_from_fields(fields: &[Value]) -> Option<Record> {
    Some(Record::Settings(SettingsRecord {
        map_enabled: truthy(fields.get(1)),
        circle_paused: truthy(fields.get(2)),
        radius_meters: fields.get(3)?.as_f64()?,
        center_lat: fields.get(4)?.as_f64()?,
        center_lng: fields.get(5)?.as_f64()?,
    }))
}

fn entity_from_fields(fields: &[Value]) -> Option<Record> {
    Some(Record::Entity(EntityRecord {
        id: fields.first()?.as_str()?.to_string(),
        display_name: opt_string(fields.get(1)),
        flags: flag_set(fields.get(2)),
        lat: fields.get(3)?.as_f64()?,
        lng: fields.get(4)?.as_f64()?,
        avatar_ref: opt_string(fields.get(5)),
        battery: fields.get(6).and_then(Value::as_f64),
        hp: fields.get(7).and_then(Value::as_f64),
        time: opt_string(fields.get(8)),
    }))
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Loose truthiness: `0`, `false`, `""` and `null` are false.
fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn opt_string(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str).map(str::to_string)
}

fn flag_set(v: Option<&Value>) -> FlagSet {
    let Some(Value::Array(items)) = v else {
        return FlagSet::new();
    };
    items
        .iter()
        .filter_map(Value::as_f64)
        .filter(|f| f.fract() == 0.0)
        .map(|f| f as i64)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
