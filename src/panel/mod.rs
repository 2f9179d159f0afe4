//! # Panel Domain Model
//!
//! Everything the bridge knows about the security panel and its auxiliary
//! sensors, independent of how messages arrive.
//!
//! ## Module Architecture
//!
//! ```text
//! panel/
//! ├── vocabulary.rs  - Arming-mode tokens, loose and strict
//! ├── tamper.rs      - Tamper decoding shared by panel and sensors
//! ├── emitter.rs     - Change-gated assignment and host notification
//! ├── security.rs    - Intent/confirmation state machine
//! ├── alarm.rs       - The panel device and its topic dispatch
//! ├── sensor.rs      - Contact, motion and occupancy sensors
//! └── reconciler.rs  - Sensor set vs. host registry
//! ```
//!
//! Entities only ever mutate through [`emitter::set_and_emit`], so the host
//! sees exactly one notification per distinct change.

pub mod alarm;
pub mod emitter;
pub mod reconciler;
pub mod security;
pub mod sensor;
pub mod tamper;
pub mod vocabulary;

pub use alarm::{AlarmPanel, PanelTopics, PANEL_NATIVE_ID};
pub use reconciler::{ReconcileOutcome, SensorReconciler};
pub use security::{SecurityMode, SecuritySystemState};
pub use sensor::{SensorConfig, SensorEntity, SensorKind, SensorTopics};
pub use vocabulary::{ModeVocabulary, OutgoingPayloads, StrictTokens};
