//! # Security System State Machine
//!
//! Tracks the arming mode of the panel and whether the alarm is triggered.
//!
//! ## Why This Module Exists
//!
//! The panel is the only authority on its own mode. A command from the user is
//! therefore an *intent*: it is recorded as the pending target and published,
//! but the current mode only moves when the panel reports it on the
//! current-state topic. The two channels are handled independently:
//!
//! ```text
//!   arm(mode) ──► pending_target ──► publish(set-target)
//!                      ▲
//!   get-target ────────┘
//!
//!   get-current ──► decode mode ─┐
//!               └─► triggered? ──┴─► compare full record ──► notify on change
//! ```
//!
//! There is no terminal state; any report may move the machine anywhere.

use serde::{Deserialize, Serialize};
use std::fmt;

use tracing::debug;

use super::emitter::{set_and_emit, Notifier};
use super::vocabulary::{ModeVocabulary, OutgoingPayloads};
use crate::host::Capability;
use crate::mqtt::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SecurityMode {
    Disarmed,
    HomeArmed,
    AwayArmed,
    NightArmed,
}

impl SecurityMode {
    pub const ALL: [SecurityMode; 4] = [
        SecurityMode::Disarmed,
        SecurityMode::HomeArmed,
        SecurityMode::AwayArmed,
        SecurityMode::NightArmed,
    ];
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityMode::Disarmed => "Disarmed",
            SecurityMode::HomeArmed => "HomeArmed",
            SecurityMode::AwayArmed => "AwayArmed",
            SecurityMode::NightArmed => "NightArmed",
        };
        write!(f, "{}", name)
    }
}

/// The record reported to the host as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySystemState {
    pub mode: SecurityMode,
    pub supported_modes: Vec<SecurityMode>,
    /// `None` means unset, which the host reads as not triggered.
    pub triggered: Option<bool>,
}

impl Default for SecuritySystemState {
    fn default() -> Self {
        Self {
            mode: SecurityMode::Disarmed,
            supported_modes: SecurityMode::ALL.to_vec(),
            triggered: None,
        }
    }
}

impl SecuritySystemState {
    pub fn is_triggered(&self) -> bool {
        self.triggered.unwrap_or(false)
    }
}

impl fmt::Display for SecuritySystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.triggered {
            Some(true) => write!(f, "{} (triggered)", self.mode),
            _ => write!(f, "{}", self.mode),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityStateMachine {
    state: SecuritySystemState,
    pending_target: Option<SecurityMode>,
}

impl SecurityStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SecuritySystemState {
        &self.state
    }

    /// Last requested or reported target mode.
    pub fn pending_target(&self) -> Option<SecurityMode> {
        self.pending_target
    }

    /// Records the intent and returns the payload to publish.
    ///
    /// The current mode is left alone until the panel confirms it.
    pub fn command(
        &mut self,
        mode: SecurityMode,
        vocabulary: &ModeVocabulary,
        overrides: &OutgoingPayloads,
    ) -> String {
        self.pending_target = Some(mode);
        vocabulary.outgoing(mode, overrides)
    }

    /// Handles a message on the target-state topic. An unknown token clears
    /// the pending target.
    pub fn apply_target_report(&mut self, payload: &Payload, vocabulary: &ModeVocabulary) {
        self.pending_target = vocabulary.decode_mode(payload);
        if self.pending_target.is_none() {
            debug!("Target report '{}' names no mode", payload.token());
        }
    }

    /// Handles a message on the current-state topic. Returns `true` if the
    /// reported record changed.
    pub fn apply_current_report(
        &mut self,
        payload: &Payload,
        vocabulary: &ModeVocabulary,
        notifier: &Notifier<'_>,
    ) -> bool {
        let mut next = self.state.clone();
        if let Some(mode) = vocabulary.decode_mode(payload) {
            next.mode = mode;
        }
        next.triggered = vocabulary.is_triggered(payload).then_some(true);

        set_and_emit(&mut self.state, next, notifier, Capability::SecuritySystem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CapabilityValue, RecordingHost};
    use crate::panel::vocabulary::StrictTokens;

    fn report(
        machine: &mut SecurityStateMachine,
        host: &RecordingHost,
        vocabulary: &ModeVocabulary,
        text: &str,
    ) -> bool {
        let notifier = Notifier::new(host, "panel", "Panel");
        machine.apply_current_report(&Payload::from_text(text), vocabulary, &notifier)
    }

    #[test]
    fn initial_state_is_disarmed_with_all_modes() {
        let machine = SecurityStateMachine::new();
        assert_eq!(machine.state().mode, SecurityMode::Disarmed);
        assert_eq!(machine.state().supported_modes.len(), 4);
        assert_eq!(machine.state().triggered, None);
        assert_eq!(machine.pending_target(), None);
    }

    #[test]
    fn command_does_not_move_current_mode() {
        let mut machine = SecurityStateMachine::new();
        let payload = machine.command(
            SecurityMode::AwayArmed,
            &ModeVocabulary::Loose,
            &OutgoingPayloads::default(),
        );
        assert_eq!(payload, "arm_away");
        assert_eq!(machine.pending_target(), Some(SecurityMode::AwayArmed));
        assert_eq!(machine.state().mode, SecurityMode::Disarmed);
    }

    #[test]
    fn current_report_changes_mode_once() {
        let host = RecordingHost::new();
        let mut machine = SecurityStateMachine::new();
        let loose = ModeVocabulary::Loose;

        assert!(report(&mut machine, &host, &loose, "arm_away"));
        assert!(!report(&mut machine, &host, &loose, "armed_away"));
        assert_eq!(machine.state().mode, SecurityMode::AwayArmed);
        assert_eq!(machine.state().triggered, None);
        assert_eq!(host.notifications("panel", Capability::SecuritySystem).len(), 1);
    }

    #[test]
    fn triggered_is_a_level() {
        let host = RecordingHost::new();
        let mut machine = SecurityStateMachine::new();
        let loose = ModeVocabulary::Loose;

        report(&mut machine, &host, &loose, "triggered");
        assert!(machine.state().is_triggered());
        assert_eq!(machine.state().mode, SecurityMode::Disarmed);

        report(&mut machine, &host, &loose, "armed_away");
        assert!(!machine.state().is_triggered());
        assert_eq!(machine.state().mode, SecurityMode::AwayArmed);

        report(&mut machine, &host, &loose, "triggered");
        assert!(machine.state().is_triggered());
        assert_eq!(machine.state().mode, SecurityMode::AwayArmed);

        let triggered: Vec<bool> = host
            .notifications("panel", Capability::SecuritySystem)
            .into_iter()
            .map(|value| match value {
                CapabilityValue::Security(state) => state.is_triggered(),
                other => panic!("unexpected value {:?}", other),
            })
            .collect();
        assert_eq!(triggered, vec![true, false, true]);
    }

    #[test]
    fn transitional_report_keeps_mode() {
        let host = RecordingHost::new();
        let mut machine = SecurityStateMachine::new();
        let loose = ModeVocabulary::Loose;

        report(&mut machine, &host, &loose, "armed_home");
        assert!(!report(&mut machine, &host, &loose, "exit_delay"));
        assert_eq!(machine.state().mode, SecurityMode::HomeArmed);
    }

    #[test]
    fn target_report_replaces_pending() {
        let mut machine = SecurityStateMachine::new();
        let strict = ModeVocabulary::Strict(StrictTokens::default());

        machine.apply_target_report(&Payload::from_text("armed_night"), &strict);
        assert_eq!(machine.pending_target(), Some(SecurityMode::NightArmed));
        assert_eq!(machine.state().mode, SecurityMode::Disarmed);

        machine.apply_target_report(&Payload::from_text("sleep"), &strict);
        assert_eq!(machine.pending_target(), None);
        assert_eq!(machine.state().mode, SecurityMode::Disarmed);
    }
}
