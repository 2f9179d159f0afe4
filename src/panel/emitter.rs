//! Change-gated mutation.
//!
//! Retained messages are redelivered on every reconnect and many panels repeat
//! their state periodically. Entities therefore never assign a facet directly:
//! they go through [`set_and_emit`], which only assigns and notifies the host
//! when the value actually differs from what is stored.

use tracing::{debug, info};

use crate::host::{Capability, CapabilityValue, HostRegistry};

/// Where change notifications for one entity go.
#[derive(Clone, Copy)]
pub struct Notifier<'a> {
    host: &'a dyn HostRegistry,
    native_id: &'a str,
    label: &'a str,
}

impl<'a> Notifier<'a> {
    pub fn new(host: &'a dyn HostRegistry, native_id: &'a str, label: &'a str) -> Self {
        Self {
            host,
            native_id,
            label,
        }
    }

    pub fn native_id(&self) -> &str {
        self.native_id
    }

    fn emit(&self, capability: Capability, value: CapabilityValue) {
        info!("[{}] {}={}", self.label, capability, value);
        if let Err(e) = self.host.notify_changed(self.native_id, capability, &value) {
            debug!(
                "[{}] host did not accept {} notification: {}",
                self.label, capability, e
            );
        }
    }
}

/// Stores `value` in `slot` and notifies the host, unless nothing changed.
///
/// Returns `true` when the slot was updated. A failing notification does not
/// undo the assignment.
pub fn set_and_emit<T>(
    slot: &mut T,
    value: T,
    notifier: &Notifier<'_>,
    capability: Capability,
) -> bool
where
    T: PartialEq + Clone + Into<CapabilityValue>,
{
    if *slot == value {
        return false;
    }
    *slot = value;
    notifier.emit(capability, slot.clone().into());
    true
}
