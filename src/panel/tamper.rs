use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mqtt::payload::Payload;

/// Named cause of a tamper condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TamperReason {
    Cover,
    Intrusion,
    Motion,
    Magnetic,
}

impl TamperReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TamperReason::Cover => "cover",
            TamperReason::Intrusion => "intrusion",
            TamperReason::Motion => "motion",
            TamperReason::Magnetic => "magnetic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TamperState {
    Clear,
    Detected,
    Reason(TamperReason),
}

impl TamperState {
    pub fn is_tampered(&self) -> bool {
        !matches!(self, TamperState::Clear)
    }
}

impl fmt::Display for TamperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TamperState::Clear => write!(f, "false"),
            TamperState::Detected => write!(f, "true"),
            TamperState::Reason(reason) => write!(f, "{}", reason.as_str()),
        }
    }
}

/// Tokens that signal tampering, and which of them name a reason.
#[derive(Debug, Clone, Copy)]
pub struct TamperVocabulary {
    pub triggers: &'static [&'static str],
    pub reasons: &'static [TamperReason],
}

pub const SENSOR_TAMPER: TamperVocabulary = TamperVocabulary {
    triggers: &["tamper", "intrusion", "cover", "motion", "magnetic"],
    reasons: &[
        TamperReason::Cover,
        TamperReason::Intrusion,
        TamperReason::Motion,
        TamperReason::Magnetic,
    ],
};

pub const PANEL_TAMPER: TamperVocabulary = TamperVocabulary {
    triggers: &["tamper", "intrusion", "cover"],
    reasons: &[TamperReason::Cover, TamperReason::Intrusion],
};

impl TamperVocabulary {
    pub fn decode(&self, payload: &Payload) -> Option<TamperState> {
        if payload.is_truthy() || payload.is_one_of(self.triggers) {
            let reason = self
                .reasons
                .iter()
                .find(|reason| reason.as_str() == payload.token());
            return Some(reason.map_or(TamperState::Detected, |r| TamperState::Reason(*r)));
        }
        if payload.is_falsy() {
            return Some(TamperState::Clear);
        }
        None
    }
}
