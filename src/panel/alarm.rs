//! The top-level panel device.

use tracing::debug;

use super::emitter::{set_and_emit, Notifier};
use super::security::{SecurityMode, SecurityStateMachine, SecuritySystemState};
use super::tamper::{TamperState, PANEL_TAMPER};
use super::vocabulary::{ModeVocabulary, OutgoingPayloads};
use crate::host::{Capability, HostRegistry};
use crate::mqtt::payload::Payload;
use crate::mqtt::topic;

pub const PANEL_NATIVE_ID: &str = "panel";
const PANEL_LABEL: &str = "Panel";

/// Topics the panel itself listens and publishes on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelTopics {
    pub set_target: Option<String>,
    pub get_target: Option<String>,
    pub get_current: Option<String>,
    pub tamper: Option<String>,
    pub online: Option<String>,
}

impl PanelTopics {
    /// Inbound topics, in dispatch order.
    pub fn subscriptions(&self) -> Vec<&str> {
        [&self.online, &self.tamper, &self.get_current, &self.get_target]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct AlarmPanel {
    online: Option<bool>,
    tampered: Option<TamperState>,
    security: SecurityStateMachine,
}

impl AlarmPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn online(&self) -> Option<bool> {
        self.online
    }

    pub fn tampered(&self) -> Option<TamperState> {
        self.tampered
    }

    pub fn security(&self) -> &SecuritySystemState {
        self.security.state()
    }

    pub fn pending_target(&self) -> Option<SecurityMode> {
        self.security.pending_target()
    }

    /// Broker connectivity drives panel availability.
    pub fn set_online(&mut self, online: bool, host: &dyn HostRegistry) {
        let notifier = Notifier::new(host, PANEL_NATIVE_ID, PANEL_LABEL);
        set_and_emit(&mut self.online, Some(online), &notifier, Capability::Online);
    }

    pub fn command(
        &mut self,
        mode: SecurityMode,
        vocabulary: &ModeVocabulary,
        overrides: &OutgoingPayloads,
    ) -> String {
        self.security.command(mode, vocabulary, overrides)
    }

    /// Offers a message to the panel. Returns `true` if one of its topics
    /// consumed it; sensors never see a consumed message.
    pub fn handle_message(
        &mut self,
        topic_name: &str,
        payload: &Payload,
        topics: &PanelTopics,
        vocabulary: &ModeVocabulary,
        host: &dyn HostRegistry,
    ) -> bool {
        let notifier = Notifier::new(host, PANEL_NATIVE_ID, PANEL_LABEL);

        if topic::matches(topic_name, topics.online.as_deref()) {
            match payload.as_bool() {
                Some(online) => {
                    set_and_emit(&mut self.online, Some(online), &notifier, Capability::Online);
                }
                None => debug!("[{}] ignoring online payload '{}'", PANEL_LABEL, payload.token()),
            }
            return true;
        }

        if topic::matches(topic_name, topics.tamper.as_deref()) {
            match PANEL_TAMPER.decode(payload) {
                Some(tamper) => {
                    set_and_emit(
                        &mut self.tampered,
                        Some(tamper),
                        &notifier,
                        Capability::TamperSensor,
                    );
                }
                None => debug!("[{}] ignoring tamper payload '{}'", PANEL_LABEL, payload.token()),
            }
            return true;
        }

        if topic::matches(topic_name, topics.get_current.as_deref()) {
            self.security.apply_current_report(payload, vocabulary, &notifier);
            return true;
        }

        if topic::matches(topic_name, topics.get_target.as_deref()) {
            self.security.apply_target_report(payload, vocabulary);
            return true;
        }

        false
    }
}
