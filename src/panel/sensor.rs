//! # Auxiliary Sensors
//!
//! A sensor is one MQTT-fed device with a primary facet chosen by its kind
//! (entry, motion or occupancy) and the fixed auxiliary facets online, tamper
//! and battery.
//!
//! ## Why This Module Exists
//!
//! The three kinds differ only in their vocabulary and JSON field list, so
//! they share one entity and one decode pipeline. Each message is offered to
//! every facet in a fixed order and every facet that matches the topic may
//! update:
//!
//! 1. online (generic boolean)
//! 2. tamper (tamper vocabulary)
//! 3. battery (numeric level, or the low-battery flag)
//! 4. primary (kind vocabulary, then the JSON fallback)
//!
//! Only the primary facet of the configured kind is ever set. Changing the kind
//! clears it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use super::emitter::{set_and_emit, Notifier};
use super::tamper::{TamperState, SENSOR_TAMPER};
use crate::host::Capability;
use crate::mqtt::payload::{probe_object, FieldProbe, Payload};
use crate::mqtt::topic;

/// Prefix of every sensor's host identifier.
pub const SENSOR_ID_PREFIX: &str = "sensor:";

/// Level reported while the low-battery flag is set.
const LOW_BATTERY_LEVEL: f64 = 10.0;
const FULL_BATTERY_LEVEL: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    #[default]
    Contact,
    Motion,
    Occupancy,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Contact => "contact",
            SensorKind::Motion => "motion",
            SensorKind::Occupancy => "occupancy",
        }
    }

    /// Host capability of the primary facet.
    pub fn capability(&self) -> Capability {
        match self {
            SensorKind::Contact => Capability::EntrySensor,
            SensorKind::Motion => Capability::MotionSensor,
            SensorKind::Occupancy => Capability::OccupancySensor,
        }
    }

    fn vocabulary(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            SensorKind::Contact => (
                &["open", "opened", "1", "true", "on", "yes"],
                &["closed", "close", "0", "false", "off", "no", "shut"],
            ),
            SensorKind::Motion => (
                &["motion", "detected", "active", "1", "true", "on", "yes"],
                &[
                    "clear",
                    "inactive",
                    "no_motion",
                    "none",
                    "0",
                    "false",
                    "off",
                    "no",
                ],
            ),
            SensorKind::Occupancy => (
                &["occupied", "presence", "present", "1", "true", "on", "yes"],
                &[
                    "unoccupied",
                    "vacant",
                    "absent",
                    "0",
                    "false",
                    "off",
                    "no",
                    "clear",
                ],
            ),
        }
    }

    fn json_probes(&self) -> &'static [FieldProbe] {
        match self {
            SensorKind::Contact => &[
                FieldProbe::Flag("open"),
                FieldProbe::Flag("opened"),
                FieldProbe::InvertedFlag("contact"),
                FieldProbe::Text {
                    field: "state",
                    on: &["open"],
                    off: &["closed"],
                },
            ],
            SensorKind::Motion => &[
                FieldProbe::Flag("motion"),
                FieldProbe::Flag("occupancy"),
                FieldProbe::Flag("presence"),
                FieldProbe::Text {
                    field: "state",
                    on: &["on", "motion", "detected", "active"],
                    off: &["off", "clear", "inactive"],
                },
            ],
            SensorKind::Occupancy => &[
                FieldProbe::Flag("occupied"),
                FieldProbe::Flag("presence"),
                FieldProbe::Flag("occupancy"),
                FieldProbe::Text {
                    field: "state",
                    on: &["occupied", "presence", "present", "on"],
                    off: &["vacant", "absent", "clear", "off"],
                },
            ],
        }
    }

    /// Kind vocabulary first, JSON object fallback second.
    pub fn decode_primary(&self, payload: &Payload) -> Option<bool> {
        let (on, off) = self.vocabulary();
        if payload.is_one_of(on) {
            return Some(true);
        }
        if payload.is_one_of(off) {
            return Some(false);
        }
        payload
            .as_object()
            .and_then(|object| probe_object(&object, self.json_probes()))
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contact" => Ok(SensorKind::Contact),
            "motion" => Ok(SensorKind::Motion),
            "occupancy" => Ok(SensorKind::Occupancy),
            other => Err(format!("unknown sensor kind '{}'", other)),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// Topics a sensor listens on. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorTopics {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub motion: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub occupancy: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub battery_level: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub low_battery: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub tamper: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub online: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|t| !t.trim().is_empty())
}

impl SensorTopics {
    /// The topic carrying the primary facet for `kind`.
    pub fn primary_topic(&self, kind: SensorKind) -> Option<&str> {
        let own = match kind {
            SensorKind::Contact => &self.contact,
            SensorKind::Motion => &self.motion,
            SensorKind::Occupancy => &self.occupancy,
        };
        present(own).or_else(|| present(&self.primary))
    }

    pub fn battery_level(&self) -> Option<&str> {
        present(&self.battery_level)
    }

    pub fn low_battery(&self) -> Option<&str> {
        present(&self.low_battery)
    }

    pub fn tamper(&self) -> Option<&str> {
        present(&self.tamper)
    }

    pub fn online(&self) -> Option<&str> {
        present(&self.online)
    }

    pub fn has_battery(&self) -> bool {
        self.battery_level().is_some() || self.low_battery().is_some()
    }

    /// Sets one topic by its settings field name. Returns `false` for unknown fields.
    pub fn set_field(&mut self, field: &str, value: &str) -> bool {
        let slot = match field {
            "primary" => &mut self.primary,
            "contact" => &mut self.contact,
            "motion" => &mut self.motion,
            "occupancy" => &mut self.occupancy,
            "batteryLevel" => &mut self.battery_level,
            "lowBattery" => &mut self.low_battery,
            "tamper" => &mut self.tamper,
            "online" => &mut self.online,
            _ => return false,
        };
        let trimmed = value.trim();
        *slot = (!trimmed.is_empty()).then(|| trimmed.to_string());
        true
    }

    /// Every configured topic of a sensor of `kind`.
    pub fn all(&self, kind: SensorKind) -> Vec<&str> {
        [
            self.primary_topic(kind),
            self.battery_level(),
            self.low_battery(),
            self.tamper(),
            self.online(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// One configured sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: String,
    pub name: String,
    pub kind: SensorKind,
    pub topics: SensorTopics,
}

impl SensorConfig {
    pub fn native_id(&self) -> String {
        format!("{}{}", SENSOR_ID_PREFIX, self.id)
    }
}

/// Parses a stored sensor list.
///
/// Entries that fail to parse or carry an empty id/name are skipped with a
/// warning. For duplicate ids the first entry wins. A value that is not a JSON
/// array yields `Err` and the caller falls back to an empty list.
pub fn parse_sensor_list(json: &str) -> Result<Vec<SensorConfig>, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<Value> = serde_json::from_str(json)?;
    let mut sensors: Vec<SensorConfig> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<SensorConfig>(entry) {
            Ok(config) if config.id.trim().is_empty() || config.name.trim().is_empty() => {
                warn!("Skipping sensor #{}: empty id or name", index);
            }
            Ok(config) if sensors.iter().any(|s| s.id == config.id) => {
                warn!("Skipping sensor #{}: duplicate id '{}'", index, config.id);
            }
            Ok(config) => sensors.push(config),
            Err(e) => warn!("Skipping sensor #{}: {}", index, e),
        }
    }
    Ok(sensors)
}

/// Runtime state of one sensor.
#[derive(Debug, Clone)]
pub struct SensorEntity {
    native_id: String,
    config: SensorConfig,
    online: Option<bool>,
    tampered: Option<TamperState>,
    battery_level: Option<f64>,
    /// Set once a numeric level has been read from the level topic.
    level_observed: bool,
    primary: Option<bool>,
}

impl SensorEntity {
    pub fn new(config: SensorConfig) -> Self {
        Self {
            native_id: config.native_id(),
            config,
            online: None,
            tampered: None,
            battery_level: None,
            level_observed: false,
            primary: None,
        }
    }

    pub fn native_id(&self) -> &str {
        &self.native_id
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn kind(&self) -> SensorKind {
        self.config.kind
    }

    pub fn online(&self) -> Option<bool> {
        self.online
    }

    pub fn tampered(&self) -> Option<TamperState> {
        self.tampered
    }

    pub fn battery_level(&self) -> Option<f64> {
        self.battery_level
    }

    pub fn entry_open(&self) -> Option<bool> {
        self.primary_for(SensorKind::Contact)
    }

    pub fn motion_detected(&self) -> Option<bool> {
        self.primary_for(SensorKind::Motion)
    }

    pub fn occupied(&self) -> Option<bool> {
        self.primary_for(SensorKind::Occupancy)
    }

    fn primary_for(&self, kind: SensorKind) -> Option<bool> {
        if self.config.kind == kind {
            self.primary
        } else {
            None
        }
    }

    fn notifier<'a>(&'a self, host: &'a dyn crate::host::HostRegistry) -> Notifier<'a> {
        Notifier::new(host, &self.native_id, &self.config.name)
    }

    /// Points the entity at a newer config, keeping runtime state.
    ///
    /// A kind change drops the primary value so only the new kind's facet can
    /// ever be set.
    pub fn update_config(&mut self, config: SensorConfig) {
        if config.kind != self.config.kind {
            debug!(
                "[{}] kind changed {} -> {}, clearing primary state",
                config.name, self.config.kind, config.kind
            );
            self.primary = None;
        }
        self.config = config;
    }

    /// Gives the battery a full level if it was never set.
    pub fn seed_battery(&mut self, host: &dyn crate::host::HostRegistry) {
        if self.battery_level.is_some() {
            return;
        }
        let mut level = self.battery_level;
        set_and_emit(
            &mut level,
            Some(FULL_BATTERY_LEVEL),
            &self.notifier(host),
            Capability::Battery,
        );
        self.battery_level = level;
    }

    /// Offers one inbound message to every facet.
    pub fn handle_message(
        &mut self,
        topic_name: &str,
        payload: &Payload,
        host: &dyn crate::host::HostRegistry,
    ) {
        let native_id = self.native_id.clone();
        let label = self.config.name.clone();
        let notifier = Notifier::new(host, &native_id, &label);
        let topics = &self.config.topics;

        if topic::matches(topic_name, topics.online()) {
            if let Some(online) = payload.as_bool() {
                set_and_emit(&mut self.online, Some(online), &notifier, Capability::Online);
            }
        }

        if topic::matches(topic_name, topics.tamper()) {
            if let Some(tamper) = SENSOR_TAMPER.decode(payload) {
                set_and_emit(
                    &mut self.tampered,
                    Some(tamper),
                    &notifier,
                    Capability::TamperSensor,
                );
            }
        }

        if topic::matches(topic_name, topics.battery_level()) {
            if let Some(level) = payload.as_level() {
                self.level_observed = true;
                set_and_emit(
                    &mut self.battery_level,
                    Some(level),
                    &notifier,
                    Capability::Battery,
                );
            }
        } else if topics.battery_level().is_none()
            && topic::matches(topic_name, topics.low_battery())
        {
            let level = if payload.is_truthy() {
                Some(LOW_BATTERY_LEVEL)
            } else if payload.is_falsy() && !self.level_observed {
                Some(FULL_BATTERY_LEVEL)
            } else {
                None
            };
            if let Some(level) = level {
                set_and_emit(
                    &mut self.battery_level,
                    Some(level),
                    &notifier,
                    Capability::Battery,
                );
            }
        }

        let kind = self.config.kind;
        if topic::matches(topic_name, topics.primary_topic(kind)) {
            match kind.decode_primary(payload) {
                Some(value) => {
                    set_and_emit(&mut self.primary, Some(value), &notifier, kind.capability());
                }
                None => debug!(
                    "[{}] unresolved {} payload on {}: {}",
                    label,
                    kind,
                    topic_name,
                    payload.raw()
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CapabilityValue, RecordingHost};
    use crate::panel::tamper::TamperReason;

    fn contact(id: &str) -> SensorConfig {
        SensorConfig {
            id: id.to_string(),
            name: format!("Sensor {}", id),
            kind: SensorKind::Contact,
            topics: SensorTopics {
                contact: Some(format!("zones/{}/open", id)),
                tamper: Some(format!("zones/{}/tamper", id)),
                online: Some(format!("zones/{}/online", id)),
                ..Default::default()
            },
        }
    }

    fn send(entity: &mut SensorEntity, host: &RecordingHost, topic: &str, text: &str) {
        entity.handle_message(topic, &Payload::from_text(text), host);
    }

    #[test]
    fn contact_vocabulary_and_json_fallback() {
        let host = RecordingHost::new();
        let mut entity = SensorEntity::new(contact("door"));

        send(&mut entity, &host, "zones/door/open", "OPEN");
        assert_eq!(entity.entry_open(), Some(true));
        send(&mut entity, &host, "zones/door/open", "shut");
        assert_eq!(entity.entry_open(), Some(false));
        send(&mut entity, &host, "zones/door/open", r#"{"contact": false}"#);
        assert_eq!(entity.entry_open(), Some(true));
        send(&mut entity, &host, "zones/door/open", "ajar");
        assert_eq!(entity.entry_open(), Some(true));

        assert_eq!(entity.motion_detected(), None);
        assert_eq!(entity.occupied(), None);
        assert_eq!(
            host.notifications("sensor:door", Capability::EntrySensor),
            vec![
                CapabilityValue::Flag(true),
                CapabilityValue::Flag(false),
                CapabilityValue::Flag(true)
            ]
        );
    }

    #[test]
    fn motion_json_state_field() {
        let host = RecordingHost::new();
        let mut config = contact("hall");
        config.kind = SensorKind::Motion;
        config.topics.contact = None;
        config.topics.motion = Some("zones/hall/motion".to_string());
        let mut entity = SensorEntity::new(config);

        send(&mut entity, &host, "zones/hall/motion", r#"{"state": "Detected"}"#);
        assert_eq!(entity.motion_detected(), Some(true));
        send(&mut entity, &host, "zones/hall/motion", "no_motion");
        assert_eq!(entity.motion_detected(), Some(false));
    }

    #[test]
    fn tamper_and_online_facets() {
        let host = RecordingHost::new();
        let mut entity = SensorEntity::new(contact("door"));

        send(&mut entity, &host, "zones/door/tamper", "magnetic");
        assert_eq!(
            entity.tampered(),
            Some(TamperState::Reason(TamperReason::Magnetic))
        );
        send(&mut entity, &host, "zones/door/tamper", "unknown");
        assert_eq!(
            entity.tampered(),
            Some(TamperState::Reason(TamperReason::Magnetic))
        );
        send(&mut entity, &host, "zones/door/tamper", "false");
        assert_eq!(entity.tampered(), Some(TamperState::Clear));

        send(&mut entity, &host, "zones/door/online", "offline");
        assert_eq!(entity.online(), Some(false));
    }

    #[test]
    fn battery_level_clamps() {
        let host = RecordingHost::new();
        let mut config = contact("door");
        config.topics.battery_level = Some("zones/door/battery".to_string());
        config.topics.low_battery = Some("zones/door/low".to_string());
        let mut entity = SensorEntity::new(config);

        send(&mut entity, &host, "zones/door/battery", "90");
        assert_eq!(entity.battery_level(), Some(90.0));
        send(&mut entity, &host, "zones/door/battery", "150");
        assert_eq!(entity.battery_level(), Some(100.0));
        // ignored while a level topic exists
        send(&mut entity, &host, "zones/door/low", "true");
        assert_eq!(entity.battery_level(), Some(100.0));
        assert_eq!(host.notifications("sensor:door", Capability::Battery).len(), 2);
    }

    #[test]
    fn low_battery_flag_without_level_topic() {
        let host = RecordingHost::new();
        let mut config = contact("door");
        config.topics.low_battery = Some("zones/door/low".to_string());
        let mut entity = SensorEntity::new(config);
        entity.seed_battery(&host);

        for text in ["false", "true", "false"] {
            send(&mut entity, &host, "zones/door/low", text);
        }
        assert_eq!(
            host.notifications("sensor:door", Capability::Battery),
            vec![
                CapabilityValue::Level(100.0),
                CapabilityValue::Level(10.0),
                CapabilityValue::Level(100.0)
            ]
        );
    }

    #[test]
    fn kind_change_clears_primary() {
        let host = RecordingHost::new();
        let mut entity = SensorEntity::new(contact("door"));
        send(&mut entity, &host, "zones/door/open", "open");
        send(&mut entity, &host, "zones/door/online", "online");

        let mut config = contact("door");
        config.kind = SensorKind::Occupancy;
        config.topics.occupancy = Some("zones/door/open".to_string());
        entity.update_config(config);

        assert_eq!(entity.entry_open(), None);
        assert_eq!(entity.occupied(), None);
        assert_eq!(entity.online(), Some(true));
    }

    #[test]
    fn sensor_list_skips_bad_entries() {
        let json = r#"[
            {"id": "a", "name": "A", "kind": "contact", "topics": {"contact": "z/a"}},
            {"id": "b", "name": "B", "kind": "smoke", "topics": {}},
            {"id": "a", "name": "A again", "kind": "motion", "topics": {}},
            {"id": "", "name": "Nameless", "kind": "motion", "topics": {}},
            {"id": "c", "name": "C", "kind": "occupancy", "topics": {"primary": "z/c", "tamper": ""}}
        ]"#;
        let sensors = parse_sensor_list(json).unwrap();
        let ids: Vec<&str> = sensors.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(sensors[0].name, "A");
        assert_eq!(sensors[1].topics.primary_topic(SensorKind::Occupancy), Some("z/c"));
        assert_eq!(sensors[1].topics.tamper(), None);

        assert!(parse_sensor_list("{not a list").is_err());
        assert!(parse_sensor_list("").unwrap().is_empty());
    }
}
