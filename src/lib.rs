//! # alarm-bridge
//!
//! Connects a security panel that speaks MQTT to a host device registry.
//! Free-form text and JSON payloads on configured topics become typed panel
//! and sensor state; arm/disarm requests become publishes.
//!
//! ```text
//!   broker ──► mqtt::session ──► bridge ──► panel::alarm / panel::reconciler ──► host
//!   host/user ──► bridge::BridgeHandle ──► panel::security ──► mqtt::session ──► broker
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod mqtt;
pub mod panel;
pub mod persistence;

pub use bridge::{Bridge, BridgeHandle};
pub use config::BridgeSettings;
pub use error::BridgeError;
pub use host::{HostRegistry, RecordingHost, TracingHost};
pub use persistence::{MemoryStore, SettingsStore, TomlFileStore};
