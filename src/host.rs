//! # Host Device Registry Boundary
//!
//! The bridge does not own the device directory that users see. It only tells
//! an external registry which devices exist, which ones went away and which
//! capability values changed. This module defines that contract.
//!
//! ## Why This Module Exists
//!
//! The registry is reached through whatever integration embeds the bridge.
//! Modelling it as a trait keeps the core free of any particular host and lets
//! every call fail without taking the bridge down:
//! - `announce_batch` is optional; hosts that cannot batch report
//!   [`HostError::Unsupported`] and get one `announce_one` call per device
//! - `notify_changed` failures are swallowed by the change-gated emitter
//! - `is_available` lets startup ordering defer reconciliation
//!
//! Two implementations ship with the crate: [`TracingHost`] writes every call
//! to the log and is what the binary uses, [`RecordingHost`] keeps a journal of
//! calls for embedding code and tests.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::panel::security::SecuritySystemState;
use crate::panel::tamper::TamperState;

/// What kind of device a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Sensor,
}

/// A capability (interface) a device exposes to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    EntrySensor,
    MotionSensor,
    OccupancySensor,
    TamperSensor,
    Battery,
    Online,
    SecuritySystem,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::EntrySensor => "EntrySensor",
            Capability::MotionSensor => "MotionSensor",
            Capability::OccupancySensor => "OccupancySensor",
            Capability::TamperSensor => "TamperSensor",
            Capability::Battery => "Battery",
            Capability::Online => "Online",
            Capability::SecuritySystem => "SecuritySystem",
        };
        write!(f, "{}", name)
    }
}

/// A value reported through [`HostRegistry::notify_changed`].
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityValue {
    Cleared,
    Flag(bool),
    Level(f64),
    Tamper(TamperState),
    Security(SecuritySystemState),
}

impl From<bool> for CapabilityValue {
    fn from(value: bool) -> Self {
        CapabilityValue::Flag(value)
    }
}

impl From<f64> for CapabilityValue {
    fn from(value: f64) -> Self {
        CapabilityValue::Level(value)
    }
}

impl From<TamperState> for CapabilityValue {
    fn from(value: TamperState) -> Self {
        CapabilityValue::Tamper(value)
    }
}

impl From<SecuritySystemState> for CapabilityValue {
    fn from(value: SecuritySystemState) -> Self {
        CapabilityValue::Security(value)
    }
}

impl<T: Into<CapabilityValue>> From<Option<T>> for CapabilityValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CapabilityValue::Cleared, Into::into)
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Cleared => write!(f, "unset"),
            CapabilityValue::Flag(flag) => write!(f, "{}", flag),
            CapabilityValue::Level(level) => write!(f, "{}", level),
            CapabilityValue::Tamper(tamper) => write!(f, "{}", tamper),
            CapabilityValue::Security(state) => write!(f, "{}", state),
        }
    }
}

/// Everything the host needs to register one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceManifest {
    pub native_id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Operation not supported by host")]
    Unsupported,

    #[error("Host rejected call: {0}")]
    Rejected(String),
}

/// The external device directory.
pub trait HostRegistry: Send + Sync {
    /// Whether the registry can take calls yet.
    fn is_available(&self) -> bool {
        true
    }

    /// Announces the complete device set in one call.
    fn announce_batch(&self, _manifests: &[DeviceManifest]) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }

    fn announce_one(&self, manifest: &DeviceManifest) -> Result<(), HostError>;

    fn remove(&self, native_id: &str) -> Result<(), HostError>;

    fn notify_changed(
        &self,
        native_id: &str,
        capability: Capability,
        value: &CapabilityValue,
    ) -> Result<(), HostError>;
}

/// Host that only logs. Used when the bridge runs standalone.
#[derive(Debug, Default)]
pub struct TracingHost;

impl HostRegistry for TracingHost {
    fn announce_batch(&self, manifests: &[DeviceManifest]) -> Result<(), HostError> {
        info!("Announcing {} device(s)", manifests.len());
        for manifest in manifests {
            debug!(
                "  {} '{}' {:?} {:?}",
                manifest.native_id, manifest.name, manifest.kind, manifest.capabilities
            );
        }
        Ok(())
    }

    fn announce_one(&self, manifest: &DeviceManifest) -> Result<(), HostError> {
        info!("Announcing device {} '{}'", manifest.native_id, manifest.name);
        Ok(())
    }

    fn remove(&self, native_id: &str) -> Result<(), HostError> {
        info!("Removing device {}", native_id);
        Ok(())
    }

    fn notify_changed(
        &self,
        native_id: &str,
        capability: Capability,
        value: &CapabilityValue,
    ) -> Result<(), HostError> {
        info!("{} {} = {}", native_id, capability, value);
        Ok(())
    }
}

/// One call made against a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    AnnounceBatch(Vec<String>),
    AnnounceOne(String),
    Remove(String),
    Notify {
        native_id: String,
        capability: Capability,
        value: CapabilityValue,
    },
}

/// Host that keeps a journal of every call it receives.
#[derive(Debug)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    available: AtomicBool,
    batch_supported: AtomicBool,
    reject_announce: AtomicBool,
    reject_notify: AtomicBool,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            batch_supported: AtomicBool::new(true),
            reject_announce: AtomicBool::new(false),
            reject_notify: AtomicBool::new(false),
        }
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_batch_supported(&self, supported: bool) {
        self.batch_supported.store(supported, Ordering::SeqCst);
    }

    pub fn set_reject_announce(&self, reject: bool) {
        self.reject_announce.store(reject, Ordering::SeqCst);
    }

    pub fn set_reject_notify(&self, reject: bool) {
        self.reject_notify.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Notifications recorded for one device and capability, in order.
    pub fn notifications(&self, native_id: &str, capability: Capability) -> Vec<CapabilityValue> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Notify {
                    native_id: id,
                    capability: cap,
                    value,
                } if id == native_id && cap == capability => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn removals(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Remove(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl HostRegistry for RecordingHost {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn announce_batch(&self, manifests: &[DeviceManifest]) -> Result<(), HostError> {
        if !self.batch_supported.load(Ordering::SeqCst) {
            return Err(HostError::Unsupported);
        }
        if self.reject_announce.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("announce refused".to_string()));
        }
        self.record(HostCall::AnnounceBatch(
            manifests.iter().map(|m| m.native_id.clone()).collect(),
        ));
        Ok(())
    }

    fn announce_one(&self, manifest: &DeviceManifest) -> Result<(), HostError> {
        if self.reject_announce.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("announce refused".to_string()));
        }
        self.record(HostCall::AnnounceOne(manifest.native_id.clone()));
        Ok(())
    }

    fn remove(&self, native_id: &str) -> Result<(), HostError> {
        self.record(HostCall::Remove(native_id.to_string()));
        Ok(())
    }

    fn notify_changed(
        &self,
        native_id: &str,
        capability: Capability,
        value: &CapabilityValue,
    ) -> Result<(), HostError> {
        self.record(HostCall::Notify {
            native_id: native_id.to_string(),
            capability,
            value: value.clone(),
        });
        if self.reject_notify.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("notify refused".to_string()));
        }
        Ok(())
    }
}
