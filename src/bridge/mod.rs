//! # Bridge Composition Root
//!
//! Ties the settings store, the host registry, the panel and the sensor set
//! together. [`Bridge`] is plain synchronous state; [`bridge_handle`] runs it
//! on a tokio task next to the broker session.
//!
//! ## Why This Module Exists
//!
//! Every inbound message, command and settings edit has to see one consistent
//! view of the configuration and entities. Keeping all of it in one owned
//! value, driven by one task, removes the need for locks:
//!
//! ```text
//!   broker ──► Bridge::handle_message ──► panel (first match consumes)
//!                                     └─► sensors (every match)
//!   handle ──► Bridge::prepare_command ──► OutboundMessage ──► broker
//!   handle ──► Bridge::apply_setting ──► reload / reconcile ──► reconnect
//! ```

pub mod bridge_handle;

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::BridgeSettings;
use crate::error::BridgeError;
use crate::host::HostRegistry;
use crate::mqtt::message::OutboundMessage;
use crate::mqtt::payload::Payload;
use crate::panel::{AlarmPanel, ReconcileOutcome, SecurityMode, SensorReconciler};
use crate::persistence::{self, SettingChange, SettingEntry, SettingsStore};

pub use bridge_handle::{BridgeCommand, BridgeHandle};

pub struct Bridge {
    store: Box<dyn SettingsStore>,
    host: Arc<dyn HostRegistry>,
    settings: BridgeSettings,
    panel: AlarmPanel,
    sensors: SensorReconciler,
}

impl Bridge {
    /// Loads settings and runs the first reconcile pass.
    pub fn new(store: Box<dyn SettingsStore>, host: Arc<dyn HostRegistry>) -> Self {
        let settings = BridgeSettings::load(store.as_ref());
        let mut bridge = Self {
            store,
            host,
            settings,
            panel: AlarmPanel::new(),
            sensors: SensorReconciler::new(),
        };
        bridge.reconcile();
        bridge
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn panel(&self) -> &AlarmPanel {
        &self.panel
    }

    pub fn sensors(&self) -> &SensorReconciler {
        &self.sensors
    }

    /// Every topic the session has to subscribe to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.settings.subscriptions()
    }

    /// Routes one inbound publish. Never fails.
    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        if self.sensors.is_deferred() {
            self.reconcile();
        }
        let payload = Payload::from_bytes(payload);
        let consumed = self.panel.handle_message(
            topic,
            &payload,
            &self.settings.topics,
            &self.settings.vocabulary,
            self.host.as_ref(),
        );
        if !consumed {
            self.sensors.dispatch(topic, &payload, self.host.as_ref());
        }
    }

    /// Builds the publish for an arm/disarm request and records the intent.
    pub fn prepare_command(&mut self, mode: SecurityMode) -> Result<OutboundMessage, BridgeError> {
        let topic = self
            .settings
            .topics
            .set_target
            .clone()
            .ok_or_else(|| BridgeError::NotConfigured("topicSetTarget is empty".to_string()))?;
        let payload = self
            .panel
            .command(mode, &self.settings.vocabulary, &self.settings.outgoing);
        debug!("Requesting {} with payload '{}'", mode, payload);
        Ok(OutboundMessage {
            topic,
            payload,
            qos: self.settings.broker.qos,
            retain: self.settings.broker.retain,
        })
    }

    /// Stores a setting and applies what it implies for settings and sensors.
    /// The caller reconnects for anything but [`SettingChange::Ignored`].
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<SettingChange, BridgeError> {
        let change =
            persistence::apply_setting(self.store.as_mut(), &self.settings.sensors, key, value)?;
        match change {
            SettingChange::Sensors => {
                self.reload();
                self.reconcile();
            }
            SettingChange::Connection => self.reload(),
            SettingChange::Ignored => {}
        }
        Ok(change)
    }

    pub fn describe_settings(&self) -> Vec<SettingEntry> {
        persistence::describe_settings(&self.settings, self.store.as_ref())
    }

    /// Re-reads every setting from the store.
    pub fn reload(&mut self) {
        self.settings = BridgeSettings::load(self.store.as_ref());
    }

    /// Brings the sensor set in line with the settings. Failures are logged.
    pub fn reconcile(&mut self) -> Option<ReconcileOutcome> {
        match self.sensors.reconcile(&self.settings.sensors, self.host.as_ref()) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Sensor reconcile aborted: {}", e);
                None
            }
        }
    }

    /// Broker ConnAck: the panel is reachable again.
    pub fn on_connected(&mut self) {
        self.panel.set_online(true, self.host.as_ref());
        if self.sensors.is_deferred() {
            self.reconcile();
        }
    }

    pub fn on_connection_lost(&mut self) {
        self.panel.set_online(false, self.host.as_ref());
    }

    /// Warns when nothing would ever be published or received.
    pub fn check_topics(&self) {
        if self.subscriptions().is_empty() && self.settings.topics.set_target.is_none() {
            warn!("No topics configured; set at least one topic in the settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;
    use crate::host::{Capability, RecordingHost};
    use crate::persistence::MemoryStore;

    fn bridge(values: &[(&str, &str)]) -> (Bridge, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::new());
        let store = MemoryStore::with_values(values.iter().copied());
        (Bridge::new(Box::new(store), host.clone()), host)
    }

    #[test]
    fn command_requires_set_target_topic() {
        let (mut bridge, _) = bridge(&[]);
        assert!(matches!(
            bridge.prepare_command(SecurityMode::AwayArmed),
            Err(BridgeError::NotConfigured(_))
        ));
        assert_eq!(bridge.panel().pending_target(), None);
    }

    #[test]
    fn command_uses_publish_options() {
        let (mut bridge, _) = bridge(&[
            (keys::TOPIC_SET_TARGET, "alarm/set"),
            (keys::QOS, "1"),
            (keys::RETAIN, "true"),
            (keys::PAYLOAD_HOME, "STAY"),
        ]);
        let message = bridge.prepare_command(SecurityMode::HomeArmed).unwrap();
        assert_eq!(message.topic, "alarm/set");
        assert_eq!(message.payload, "STAY");
        assert_eq!(message.qos, rumqttc::QoS::AtLeastOnce);
        assert!(message.retain);
        assert_eq!(bridge.panel().pending_target(), Some(SecurityMode::HomeArmed));
        assert_eq!(bridge.panel().security().mode, SecurityMode::Disarmed);
    }

    #[test]
    fn panel_topics_shadow_sensor_topics() {
        let (mut bridge, host) = bridge(&[
            (keys::TOPIC_GET_CURRENT, "alarm/state"),
            (
                keys::SENSORS_JSON,
                r#"[{"id":"a","name":"A","kind":"contact","topics":{"contact":"alarm/#"}}]"#,
            ),
        ]);
        bridge.handle_message("alarm/state", b"open");
        assert!(host.notifications("sensor:a", Capability::EntrySensor).is_empty());

        bridge.handle_message("alarm/zone", b"open");
        assert_eq!(host.notifications("sensor:a", Capability::EntrySensor).len(), 1);
    }

    #[test]
    fn connection_events_drive_panel_online() {
        let (mut bridge, host) = bridge(&[]);
        bridge.on_connected();
        bridge.on_connected();
        bridge.on_connection_lost();
        assert_eq!(host.notifications("panel", Capability::Online).len(), 2);
        assert_eq!(bridge.panel().online(), Some(false));
    }

    #[test]
    fn deferred_reconcile_retries_on_traffic() {
        let host = Arc::new(RecordingHost::new());
        host.set_available(false);
        let store = MemoryStore::with_values([(
            keys::SENSORS_JSON,
            r#"[{"id":"a","name":"A","kind":"motion","topics":{"motion":"z/a"}}]"#,
        )]);
        let mut bridge = Bridge::new(Box::new(store), host.clone());
        assert!(bridge.sensors().is_empty());

        host.set_available(true);
        bridge.handle_message("z/a", b"motion");
        assert_eq!(bridge.sensors().len(), 1);
        assert_eq!(
            bridge.sensors().get("sensor:a").and_then(|s| s.motion_detected()),
            Some(true)
        );
    }
}
