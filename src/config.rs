//! Typed bridge settings, parsed from the string-keyed store.
//!
//! Parsing happens once per reconfiguration. Nothing here fails: a missing or
//! unreadable value falls back to its default and the problem is logged.

use tracing::{error, warn};

use crate::mqtt::config::{BrokerSettings, DEFAULT_BROKER_URL, DEFAULT_CLIENT_ID};
use crate::mqtt::message::clamp_qos;
use crate::panel::sensor::parse_sensor_list;
use crate::panel::{ModeVocabulary, OutgoingPayloads, PanelTopics, SensorConfig, StrictTokens};
use crate::persistence::SettingsStore;

pub mod keys {
    pub const BROKER_URL: &str = "brokerUrl";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const CLIENT_ID: &str = "clientId";
    pub const TLS: &str = "tls";
    pub const REJECT_UNAUTHORIZED: &str = "rejectUnauthorized";

    pub const TOPIC_SET_TARGET: &str = "topicSetTarget";
    pub const TOPIC_GET_TARGET: &str = "topicGetTarget";
    pub const TOPIC_GET_CURRENT: &str = "topicGetCurrent";
    pub const TOPIC_TAMPER: &str = "topicTamper";
    pub const TOPIC_ONLINE: &str = "topicOnline";

    pub const QOS: &str = "qos";
    pub const RETAIN: &str = "retain";

    pub const PAYLOAD_DISARM: &str = "payloadDisarm";
    pub const PAYLOAD_HOME: &str = "payloadHome";
    pub const PAYLOAD_AWAY: &str = "payloadAway";
    pub const PAYLOAD_NIGHT: &str = "payloadNight";

    pub const STRICT_STATES: &str = "strictStates";
    pub const STRICT_DISARMED: &str = "strictDisarmedTokens";
    pub const STRICT_HOME: &str = "strictHomeTokens";
    pub const STRICT_AWAY: &str = "strictAwayTokens";
    pub const STRICT_NIGHT: &str = "strictNightTokens";
    pub const STRICT_TRIGGERED: &str = "strictTriggeredTokens";

    pub const SENSORS_JSON: &str = "sensorsJson";

    pub const NEW_ID: &str = "new.id";
    pub const NEW_NAME: &str = "new.name";
    pub const NEW_KIND: &str = "new.kind";
    pub const NEW_CREATE: &str = "new.create";
}

/// Everything the bridge needs, in typed form.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub broker: BrokerSettings,
    pub topics: PanelTopics,
    pub outgoing: OutgoingPayloads,
    pub vocabulary: ModeVocabulary,
    pub sensors: Vec<SensorConfig>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            topics: PanelTopics::default(),
            outgoing: OutgoingPayloads::default(),
            vocabulary: ModeVocabulary::Loose,
            sensors: Vec::new(),
        }
    }
}

impl BridgeSettings {
    pub fn load(store: &dyn SettingsStore) -> Self {
        let text = |key: &str| store.get(key).filter(|v| !v.trim().is_empty());
        let trimmed = |key: &str| text(key).map(|v| v.trim().to_string());
        let flag = |key: &str| text(key).is_some_and(|v| v.trim() == "true");

        let qos = match text(keys::QOS).map(|v| v.trim().parse::<i64>()) {
            Some(Ok(level)) => clamp_qos(level),
            Some(Err(e)) => {
                warn!("Invalid qos setting ({}), using 0", e);
                clamp_qos(0)
            }
            None => clamp_qos(0),
        };

        let broker = BrokerSettings {
            url: trimmed(keys::BROKER_URL).unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
            username: text(keys::USERNAME),
            password: text(keys::PASSWORD),
            client_id: trimmed(keys::CLIENT_ID).unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            tls: flag(keys::TLS),
            reject_unauthorized: text(keys::REJECT_UNAUTHORIZED)
                .map_or(true, |v| v.trim() != "false"),
            qos,
            retain: flag(keys::RETAIN),
        };

        let topics = PanelTopics {
            set_target: trimmed(keys::TOPIC_SET_TARGET),
            get_target: trimmed(keys::TOPIC_GET_TARGET),
            get_current: trimmed(keys::TOPIC_GET_CURRENT),
            tamper: trimmed(keys::TOPIC_TAMPER),
            online: trimmed(keys::TOPIC_ONLINE),
        };

        let outgoing = OutgoingPayloads {
            disarm: trimmed(keys::PAYLOAD_DISARM),
            home: trimmed(keys::PAYLOAD_HOME),
            away: trimmed(keys::PAYLOAD_AWAY),
            night: trimmed(keys::PAYLOAD_NIGHT),
        };

        let vocabulary = if flag(keys::STRICT_STATES) {
            let defaults = StrictTokens::default();
            let list = |key: &str, fallback: Vec<String>| match text(key) {
                Some(raw) => parse_token_list(key, &raw, fallback),
                None => fallback,
            };
            ModeVocabulary::Strict(StrictTokens {
                disarmed: list(keys::STRICT_DISARMED, defaults.disarmed),
                home: list(keys::STRICT_HOME, defaults.home),
                away: list(keys::STRICT_AWAY, defaults.away),
                night: list(keys::STRICT_NIGHT, defaults.night),
                triggered: list(keys::STRICT_TRIGGERED, defaults.triggered),
            })
        } else {
            ModeVocabulary::Loose
        };

        let sensors = match parse_sensor_list(&text(keys::SENSORS_JSON).unwrap_or_default()) {
            Ok(sensors) => sensors,
            Err(e) => {
                error!("Invalid sensorsJson: {}", e);
                Vec::new()
            }
        };

        Self {
            broker,
            topics,
            outgoing,
            vocabulary,
            sensors,
        }
    }

    /// Deduplicated union of every inbound topic, panel first.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut subscriptions: Vec<String> = Vec::new();
        let panel = self.topics.subscriptions().into_iter();
        let sensors = self.sensors.iter().flat_map(|s| s.topics.all(s.kind));
        for topic in panel.chain(sensors) {
            if !subscriptions.iter().any(|t| t == topic) {
                subscriptions.push(topic.to_string());
            }
        }
        subscriptions
    }
}

/// Parses a JSON array of tokens. Non-string entries are dropped; an
/// unreadable or empty list keeps `fallback`.
fn parse_token_list(key: &str, raw: &str, fallback: Vec<String>) -> Vec<String> {
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => {
            let tokens: Vec<String> = values
                .into_iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect();
            if tokens.is_empty() {
                warn!("{} has no usable tokens, keeping defaults", key);
                fallback
            } else {
                tokens
            }
        }
        Err(e) => {
            warn!("Invalid {} ({}), keeping defaults", key, e);
            fallback
        }
    }
}
