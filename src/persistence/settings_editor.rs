//! Settings edits and the settings listing.
//!
//! Sensor definitions live inside one JSON setting but are edited through
//! per-field keys (`sensor.<id>.name`, `sensor.<id>.topic.tamper`, ...).
//! [`apply_setting`] stores the raw edit, folds sensor edits back into the
//! JSON list and tells the caller what has to be rebuilt.

use tracing::{info, warn};

use super::{SettingsStore, StoreError};
use crate::config::{keys, BridgeSettings};
use crate::mqtt::message::qos_level;
use crate::panel::{SensorConfig, SensorKind, SensorTopics};

/// What a settings edit requires the bridge to redo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    /// Nothing to rebuild (bad edit or a staging key like `new.id`).
    Ignored,
    /// The sensor list changed: reload, reconcile and reconnect.
    Sensors,
    /// A broker or panel setting changed: reload and reconnect.
    Connection,
}

const SENSOR_PREFIX: &str = "sensor.";
const TOPIC_PREFIX: &str = "topic.";

/// Stores `value` under `key` and applies its side effects.
pub fn apply_setting(
    store: &mut dyn SettingsStore,
    sensors: &[SensorConfig],
    key: &str,
    value: &str,
) -> Result<SettingChange, StoreError> {
    store.set(key, value)?;

    if key == keys::NEW_CREATE {
        if value.trim() != "true" {
            return Ok(SettingChange::Ignored);
        }
        return create_sensor(store, sensors);
    }

    if let Some(rest) = key.strip_prefix(SENSOR_PREFIX) {
        return edit_sensor(store, sensors, key, rest, value);
    }

    if key == keys::SENSORS_JSON {
        return Ok(SettingChange::Sensors);
    }

    if key.starts_with("new.") {
        return Ok(SettingChange::Ignored);
    }

    Ok(SettingChange::Connection)
}

fn create_sensor(
    store: &mut dyn SettingsStore,
    sensors: &[SensorConfig],
) -> Result<SettingChange, StoreError> {
    let id = store.get(keys::NEW_ID).unwrap_or_default().trim().to_string();
    if id.is_empty() {
        warn!("Create sensor: missing id");
        return Ok(SettingChange::Ignored);
    }
    if sensors.iter().any(|s| s.id == id) {
        warn!("Create sensor: id '{}' already exists", id);
        return Ok(SettingChange::Ignored);
    }

    let name = store
        .get(keys::NEW_NAME)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| id.clone());
    let kind = match store.get(keys::NEW_KIND).filter(|k| !k.trim().is_empty()) {
        None => SensorKind::default(),
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Create sensor: {}, using contact", e);
            SensorKind::default()
        }),
    };

    let mut updated = sensors.to_vec();
    updated.push(SensorConfig {
        id: id.clone(),
        name,
        kind,
        topics: SensorTopics::default(),
    });
    save_sensors(store, &updated)?;

    for key in [keys::NEW_ID, keys::NEW_NAME, keys::NEW_KIND, keys::NEW_CREATE] {
        store.remove(key)?;
    }
    info!("Sensor '{}' created", id);
    Ok(SettingChange::Sensors)
}

fn edit_sensor(
    store: &mut dyn SettingsStore,
    sensors: &[SensorConfig],
    key: &str,
    rest: &str,
    value: &str,
) -> Result<SettingChange, StoreError> {
    let Some((id, property)) = rest.split_once('.') else {
        warn!("Ignoring malformed sensor setting '{}'", key);
        return Ok(SettingChange::Ignored);
    };
    let Some(index) = sensors.iter().position(|s| s.id == id) else {
        warn!("Ignoring setting '{}': sensor '{}' not found", key, id);
        return Ok(SettingChange::Ignored);
    };

    let mut updated = sensors.to_vec();
    let sensor = &mut updated[index];
    match property {
        "remove" => {
            if value.trim() != "true" {
                return Ok(SettingChange::Ignored);
            }
            updated.remove(index);
            store.remove(key)?;
            info!("Sensor '{}' removed", id);
        }
        "name" => sensor.name = value.trim().to_string(),
        "kind" => match value.parse::<SensorKind>() {
            Ok(kind) => sensor.kind = kind,
            Err(e) => {
                warn!("Ignoring setting '{}': {}", key, e);
                return Ok(SettingChange::Ignored);
            }
        },
        other => {
            let field = other.strip_prefix(TOPIC_PREFIX).unwrap_or(other);
            if !other.starts_with(TOPIC_PREFIX) || !sensor.topics.set_field(field, value) {
                warn!("Ignoring unknown sensor setting '{}'", key);
                return Ok(SettingChange::Ignored);
            }
        }
    }

    save_sensors(store, &updated)?;
    Ok(SettingChange::Sensors)
}

fn save_sensors(store: &mut dyn SettingsStore, sensors: &[SensorConfig]) -> Result<(), StoreError> {
    let json = serde_json::to_string(sensors).map_err(|e| StoreError::Serialize(e.to_string()))?;
    store.set(keys::SENSORS_JSON, &json)
}

/// One row of the settings listing shown to an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingEntry {
    pub group: String,
    pub key: String,
    pub title: String,
    pub value: String,
}

impl SettingEntry {
    fn new(group: &str, key: impl Into<String>, title: &str, value: impl Into<String>) -> Self {
        Self {
            group: group.to_string(),
            key: key.into(),
            title: title.to_string(),
            value: value.into(),
        }
    }
}

/// Lists every editable setting with its effective value.
pub fn describe_settings(
    settings: &BridgeSettings,
    store: &dyn SettingsStore,
) -> Vec<SettingEntry> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let broker = &settings.broker;
    let topics = &settings.topics;

    let mut out = vec![
        SettingEntry::new("MQTT", keys::BROKER_URL, "Broker URL", broker.url.clone()),
        SettingEntry::new("MQTT", keys::USERNAME, "Username", opt(&broker.username)),
        SettingEntry::new(
            "MQTT",
            keys::PASSWORD,
            "Password",
            if broker.password.is_some() { "********" } else { "" },
        ),
        SettingEntry::new("MQTT", keys::CLIENT_ID, "Client ID", broker.client_id.clone()),
        SettingEntry::new("MQTT", keys::TLS, "Use TLS", broker.tls.to_string()),
        SettingEntry::new(
            "MQTT",
            keys::REJECT_UNAUTHORIZED,
            "Reject Unauthorized (TLS)",
            broker.reject_unauthorized.to_string(),
        ),
        SettingEntry::new(
            "Alarm Topics",
            keys::TOPIC_SET_TARGET,
            "Set Target State (publish)",
            opt(&topics.set_target),
        ),
        SettingEntry::new(
            "Alarm Topics",
            keys::TOPIC_GET_TARGET,
            "Get Target State (subscribe)",
            opt(&topics.get_target),
        ),
        SettingEntry::new(
            "Alarm Topics",
            keys::TOPIC_GET_CURRENT,
            "Get Current State (subscribe)",
            opt(&topics.get_current),
        ),
        SettingEntry::new(
            "Alarm Topics",
            keys::TOPIC_TAMPER,
            "Get Status Tampered (subscribe)",
            opt(&topics.tamper),
        ),
        SettingEntry::new(
            "Alarm Topics",
            keys::TOPIC_ONLINE,
            "Get Online (subscribe)",
            opt(&topics.online),
        ),
        SettingEntry::new("Publish Options", keys::QOS, "QoS", qos_level(broker.qos).to_string()),
        SettingEntry::new("Publish Options", keys::RETAIN, "Retain", broker.retain.to_string()),
        SettingEntry::new(
            "Add Sensor",
            keys::NEW_ID,
            "New Sensor ID",
            store.get(keys::NEW_ID).unwrap_or_default(),
        ),
        SettingEntry::new(
            "Add Sensor",
            keys::NEW_NAME,
            "Name",
            store.get(keys::NEW_NAME).unwrap_or_default(),
        ),
        SettingEntry::new(
            "Add Sensor",
            keys::NEW_KIND,
            "Type",
            store.get(keys::NEW_KIND).unwrap_or_else(|| SensorKind::default().to_string()),
        ),
        SettingEntry::new("Add Sensor", keys::NEW_CREATE, "Create sensor", "false"),
    ];

    for sensor in &settings.sensors {
        let group = format!("Sensor: {} [{}]", sensor.name, sensor.id);
        let key = |suffix: &str| format!("{}{}.{}", SENSOR_PREFIX, sensor.id, suffix);
        let t = &sensor.topics;
        out.push(SettingEntry::new(&group, key("name"), "Name", sensor.name.clone()));
        out.push(SettingEntry::new(&group, key("kind"), "Type", sensor.kind.to_string()));
        out.push(SettingEntry::new(
            &group,
            key(&format!("{}{}", TOPIC_PREFIX, sensor.kind)),
            "State Topic",
            sensor.topics.primary_topic(sensor.kind).unwrap_or_default(),
        ));
        for (field, title, value) in [
            ("batteryLevel", "Battery Level Topic (0..100)", t.battery_level()),
            ("lowBattery", "Low Battery Topic (bool)", t.low_battery()),
            ("tamper", "Tamper Topic", t.tamper()),
            ("online", "Online Topic", t.online()),
        ] {
            out.push(SettingEntry::new(
                &group,
                key(&format!("{}{}", TOPIC_PREFIX, field)),
                title,
                value.unwrap_or_default(),
            ));
        }
        out.push(SettingEntry::new(&group, key("remove"), "Remove sensor", "false"));
    }
    out
}
