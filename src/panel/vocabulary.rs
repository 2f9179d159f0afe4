//! Arming-mode vocabularies.
//!
//! Panel integrations disagree on how they spell modes. The loose vocabulary
//! accepts a fixed synonym table; the strict one accepts only tokens an
//! operator configured, one list per mode. Both decode inbound state reports,
//! detect the triggered condition and pick outbound command tokens.

use serde::{Deserialize, Serialize};

use super::security::SecurityMode;
use crate::mqtt::payload::Payload;

const LOOSE_DISARMED: &[&str] = &["disarm", "disarmed", "off", "0", "idle", "ready"];
const LOOSE_HOME: &[&str] = &["arm_home", "home", "stay", "armed_home"];
const LOOSE_AWAY: &[&str] = &["arm_away", "away", "armed_away", "away_armed"];
const LOOSE_NIGHT: &[&str] = &[
    "arm_night",
    "night",
    "armed_night",
    "sleep",
    "arm_sleep",
    "armed_sleep",
];
/// Reported while the panel moves between modes; never a mode of their own.
const TRANSITIONAL: &[&str] = &["entry_delay", "exit_delay", "pending", "arming", "disarming"];
const LOOSE_TRIGGERED: &[&str] = &["alarm", "triggered"];

/// Per-mode token lists for strict decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrictTokens {
    pub disarmed: Vec<String>,
    pub home: Vec<String>,
    pub away: Vec<String>,
    pub night: Vec<String>,
    pub triggered: Vec<String>,
}

impl Default for StrictTokens {
    fn default() -> Self {
        Self {
            disarmed: vec!["disarmed".to_string()],
            home: vec!["armed_home".to_string()],
            away: vec!["armed_away".to_string()],
            night: vec!["armed_night".to_string()],
            triggered: vec!["triggered".to_string()],
        }
    }
}

impl StrictTokens {
    fn for_mode(&self, mode: SecurityMode) -> &[String] {
        match mode {
            SecurityMode::Disarmed => &self.disarmed,
            SecurityMode::HomeArmed => &self.home,
            SecurityMode::AwayArmed => &self.away,
            SecurityMode::NightArmed => &self.night,
        }
    }
}

/// Configured overrides for outbound command payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingPayloads {
    pub disarm: Option<String>,
    pub home: Option<String>,
    pub away: Option<String>,
    pub night: Option<String>,
}

impl OutgoingPayloads {
    fn for_mode(&self, mode: SecurityMode) -> Option<&str> {
        match mode {
            SecurityMode::Disarmed => self.disarm.as_deref(),
            SecurityMode::HomeArmed => self.home.as_deref(),
            SecurityMode::AwayArmed => self.away.as_deref(),
            SecurityMode::NightArmed => self.night.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModeVocabulary {
    #[default]
    Loose,
    Strict(StrictTokens),
}

impl ModeVocabulary {
    /// Maps a state report onto a mode. Unknown and transitional tokens give `None`.
    pub fn decode_mode(&self, payload: &Payload) -> Option<SecurityMode> {
        match self {
            ModeVocabulary::Loose => {
                if payload.is_one_of(TRANSITIONAL) {
                    return None;
                }
                SecurityMode::ALL
                    .into_iter()
                    .find(|mode| payload.is_one_of(loose_tokens(*mode)))
            }
            ModeVocabulary::Strict(tokens) => SecurityMode::ALL.into_iter().find(|mode| {
                tokens
                    .for_mode(*mode)
                    .iter()
                    .any(|t| t.trim().eq_ignore_ascii_case(payload.token()))
            }),
        }
    }

    /// Whether the report denotes an active alarm.
    pub fn is_triggered(&self, payload: &Payload) -> bool {
        match self {
            ModeVocabulary::Loose => payload.is_one_of(LOOSE_TRIGGERED),
            ModeVocabulary::Strict(tokens) => tokens
                .triggered
                .iter()
                .any(|t| t.trim().eq_ignore_ascii_case(payload.token())),
        }
    }

    /// Token to publish when requesting `mode`.
    pub fn outgoing(&self, mode: SecurityMode, overrides: &OutgoingPayloads) -> String {
        if let Some(custom) = overrides.for_mode(mode).filter(|p| !p.is_empty()) {
            return custom.to_string();
        }
        match self {
            ModeVocabulary::Loose => loose_command(mode).to_string(),
            ModeVocabulary::Strict(tokens) => tokens
                .for_mode(mode)
                .first()
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| loose_command(mode).to_string()),
        }
    }
}

fn loose_tokens(mode: SecurityMode) -> &'static [&'static str] {
    match mode {
        SecurityMode::Disarmed => LOOSE_DISARMED,
        SecurityMode::HomeArmed => LOOSE_HOME,
        SecurityMode::AwayArmed => LOOSE_AWAY,
        SecurityMode::NightArmed => LOOSE_NIGHT,
    }
}

fn loose_command(mode: SecurityMode) -> &'static str {
    match mode {
        SecurityMode::Disarmed => "disarm",
        SecurityMode::HomeArmed => "arm_home",
        SecurityMode::AwayArmed => "arm_away",
        SecurityMode::NightArmed => "arm_night",
    }
}
