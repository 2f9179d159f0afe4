//! # MQTT Integration Module
//!
//! Everything that knows about the wire: topic filters, payload decoding,
//! message representation and the broker connection itself.
//!
//! ## Why This Module Exists
//!
//! The panel model works on decoded values and topic names. This module keeps
//! rumqttc, URLs, TLS and text/JSON parsing out of it:
//! - topic filter matching that mirrors what the broker does with `+` and `#`
//! - total payload decoders that return a value or no opinion
//! - a typestate broker session with automatic resubscription on reconnect
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── topic.rs    - Wildcard topic matching
//! ├── payload.rs  - Boolean, level and JSON decoders
//! ├── message.rs  - Inbound/outbound message representation
//! ├── config.rs   - Broker settings and URL resolution
//! └── session.rs  - Connection state machine and protocol handling
//! ```

pub mod config;
pub mod message;
pub mod payload;
pub mod session;
pub mod topic;

pub use config::BrokerSettings;
pub use message::{InboundMessage, OutboundMessage};
pub use payload::Payload;
pub use session::{BrokerSession, ConnectionState, SessionError, SessionEvent, SessionStatus};
