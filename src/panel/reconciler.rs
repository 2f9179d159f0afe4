//! # Sensor Lifecycle Reconciler
//!
//! Keeps the set of live [`SensorEntity`] objects and the host's device
//! directory in line with the configured sensor list.
//!
//! ## Why This Module Exists
//!
//! The sensor list changes at runtime through settings edits. Every change
//! runs one pass that brings three things into agreement: the configured list,
//! the host registry and the entity map. A pass always goes in this order:
//!
//! 1. announce the complete manifest set (batched, or one by one)
//! 2. create missing entities and re-point existing ones to their new config
//! 3. seed battery levels where battery is a capability
//! 4. drop entities that were not announced and tell the host to remove them
//!
//! If announcing fails the pass stops before step 2, so the host never holds
//! fewer devices than the bridge dispatches to. If the host is not ready the
//! pass is deferred and retried later.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info, warn};

use super::sensor::{SensorConfig, SensorEntity};
use crate::host::{Capability, DeviceKind, DeviceManifest, HostError, HostRegistry};
use crate::mqtt::payload::Payload;

/// Host manifest for one sensor: primary capability first, then Online,
/// then TamperSensor and Battery when their topics exist.
pub fn manifest(config: &SensorConfig) -> DeviceManifest {
    let mut capabilities = vec![config.kind.capability(), Capability::Online];
    if config.topics.tamper().is_some() {
        capabilities.push(Capability::TamperSensor);
    }
    if config.topics.has_battery() {
        capabilities.push(Capability::Battery);
    }
    DeviceManifest {
        native_id: config.native_id(),
        name: config.name.clone(),
        kind: DeviceKind::Sensor,
        capabilities,
    }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The host was not ready; nothing changed.
    Deferred,
    Applied {
        announced: usize,
        created: Vec<String>,
        removed: Vec<String>,
    },
}

#[derive(Debug, Default)]
pub struct SensorReconciler {
    entities: BTreeMap<String, SensorEntity>,
    deferred: bool,
}

impl SensorReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last pass was deferred and still needs to run.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, native_id: &str) -> Option<&SensorEntity> {
        self.entities.get(native_id)
    }

    /// Runs one pass against `configs`.
    ///
    /// Returns `Err` only when announcing failed; the entity map is then
    /// untouched.
    pub fn reconcile(
        &mut self,
        configs: &[SensorConfig],
        host: &dyn HostRegistry,
    ) -> Result<ReconcileOutcome, HostError> {
        if !host.is_available() {
            if !self.deferred {
                info!("Device discovery postponed: host registry not ready yet");
                self.deferred = true;
            }
            return Ok(ReconcileOutcome::Deferred);
        }
        self.deferred = false;

        let manifests: Vec<DeviceManifest> = configs.iter().map(manifest).collect();
        self.announce(&manifests, host)?;

        let mut created = Vec::new();
        for config in configs {
            let native_id = config.native_id();
            if !self.entities.contains_key(&native_id) {
                created.push(native_id.clone());
            }
            let entity = self
                .entities
                .entry(native_id)
                .and_modify(|entity| entity.update_config(config.clone()))
                .or_insert_with(|| SensorEntity::new(config.clone()));
            if config.topics.has_battery() {
                entity.seed_battery(host);
            }
        }

        let announced: BTreeSet<&str> = manifests.iter().map(|m| m.native_id.as_str()).collect();
        let stale: Vec<String> = self
            .entities
            .keys()
            .filter(|id| !announced.contains(id.as_str()))
            .cloned()
            .collect();
        for native_id in &stale {
            self.entities.remove(native_id);
            if let Err(e) = host.remove(native_id) {
                warn!("Host failed to remove {}: {}", native_id, e);
            }
        }

        info!(
            "Sensors reconciled: {} announced, {} created, {} removed",
            manifests.len(),
            created.len(),
            stale.len()
        );
        Ok(ReconcileOutcome::Applied {
            announced: manifests.len(),
            created,
            removed: stale,
        })
    }

    fn announce(
        &self,
        manifests: &[DeviceManifest],
        host: &dyn HostRegistry,
    ) -> Result<(), HostError> {
        match host.announce_batch(manifests) {
            Ok(()) => Ok(()),
            Err(HostError::Unsupported) => {
                for manifest in manifests {
                    host.announce_one(manifest).inspect_err(|e| {
                        error!("Announcing {} failed: {}", manifest.native_id, e)
                    })?;
                }
                Ok(())
            }
            Err(e) => {
                error!("Announcing sensors failed: {}", e);
                Err(e)
            }
        }
    }

    /// Offers a message to every tracked sensor.
    pub fn dispatch(&mut self, topic: &str, payload: &Payload, host: &dyn HostRegistry) {
        for entity in self.entities.values_mut() {
            entity.handle_message(topic, payload, host);
        }
    }
}
