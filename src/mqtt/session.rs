//! # Broker Session
//!
//! One connection to one MQTT broker, modelled as a statum typestate machine.
//!
//! ## Why This Module Exists
//!
//! rumqttc splits a connection into an [`AsyncClient`] handle (requests) and
//! an [`EventLoop`] (network I/O). The event loop only touches the network
//! when polled, so building a session and starting it are separate steps:
//!
//! ```text
//!   BrokerSession<Prepared> ──start()──► BrokerSession<Running>
//!        create()                          poll() / publish() / set_subscriptions()
//!                                          close()
//! ```
//!
//! `Prepared` owns the configured client and remembers the subscription set;
//! `Running` is the only state that can poll, publish or be closed. Every
//! ConnAck is surfaced as [`SessionEvent::Connected`] so the owner can send
//! its current subscription set. A closed
//! session is consumed, so the old event loop is always dropped before a
//! replacement is built.
//!
//! Connection status is pushed into a `watch` channel so observers never
//! need access to the session itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use rumqttc::tokio_rustls::rustls;
use rumqttc::tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rumqttc::tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rumqttc::tokio_rustls::rustls::{DigitallySignedStruct, SignatureScheme};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, SubscribeFilter,
    TlsConfiguration, Transport,
};
use statum::{machine, state};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::BrokerSettings;
use super::message::{InboundMessage, OutboundMessage};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;
/// How many error messages the status keeps.
const ERROR_HISTORY: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

/// Snapshot of the connection published to observers.
#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<chrono::DateTime<Local>>,
}

impl SessionStatus {
    fn record_error(&mut self, message: String) {
        self.error_messages.push(message);
        if self.error_messages.len() > ERROR_HISTORY {
            let excess = self.error_messages.len() - ERROR_HISTORY;
            self.error_messages.drain(..excess);
        }
    }
}

/// What one poll of a running session produced.
#[derive(Debug)]
pub enum SessionEvent {
    /// The broker accepted the connection. Subscriptions must be sent again.
    Connected,
    Message(InboundMessage),
    /// The broker asked us to disconnect.
    Disconnected,
    /// Anything else (acks, pings, outgoing traffic).
    Other,
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Prepared,
    Running,
}

#[machine]
pub struct BrokerSession<S: SessionState> {
    client: AsyncClient,
    eventloop: EventLoop,
    settings: BrokerSettings,
    subscriptions: Vec<String>,
    status: Arc<watch::Sender<SessionStatus>>,
}

impl<S: SessionState> BrokerSession<S> {
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    fn update_status(&self, update: impl FnOnce(&mut SessionStatus)) {
        self.status.send_modify(update);
    }
}

impl BrokerSession<Prepared> {
    /// Builds the client from `settings`. Nothing touches the network yet.
    pub fn create(
        settings: BrokerSettings,
        subscriptions: Vec<String>,
        status: Arc<watch::Sender<SessionStatus>>,
    ) -> Result<Self, SessionError> {
        let endpoint = settings.endpoint()?;
        info!(
            "Preparing MQTT session {}:{} (TLS: {}, client id: {})",
            endpoint.host, endpoint.port, endpoint.tls, settings.client_id
        );

        let mut options =
            MqttOptions::new(settings.client_id.clone(), endpoint.host, endpoint.port);
        options.set_keep_alive(KEEP_ALIVE).set_clean_session(true);
        if let Some(username) = &settings.username {
            let password = settings.password.clone().unwrap_or_default();
            options.set_credentials(username.clone(), password);
        }
        if endpoint.tls {
            options.set_transport(tls_transport(settings.reject_unauthorized));
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        status.send_modify(|s| s.connection_state = ConnectionState::Connecting);

        Ok(Self::new(client, eventloop, settings, subscriptions, status))
    }

    pub fn start(self) -> BrokerSession<Running> {
        debug!("MQTT session running with {} subscription(s)", self.subscriptions.len());
        self.transition()
    }
}

impl BrokerSession<Running> {
    /// Drives the event loop once.
    ///
    /// rumqttc reconnects on the next poll after an error, so callers only
    /// need to back off before polling again.
    pub async fn poll(&mut self) -> Result<SessionEvent, SessionError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                self.update_status(|s| {
                    s.connection_state = ConnectionState::Connected;
                    s.last_activity = Some(Local::now());
                });
                Ok(SessionEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::from_topic(publish.topic, publish.payload.to_vec());
                debug!("Received {}", message);
                self.update_status(|s| {
                    s.messages_received += 1;
                    s.last_activity = Some(Local::now());
                });
                Ok(SessionEvent::Message(message))
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker requested disconnect");
                self.update_status(|s| s.connection_state = ConnectionState::Reconnecting);
                Ok(SessionEvent::Disconnected)
            }
            Ok(_) => Ok(SessionEvent::Other),
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                self.update_status(|s| {
                    s.connection_state = ConnectionState::Failed;
                    s.record_error(e.to_string());
                });
                Err(SessionError::Connection(e))
            }
        }
    }

    /// Marks the session as waiting for the next reconnect attempt.
    pub fn mark_reconnecting(&self) {
        self.update_status(|s| s.connection_state = ConnectionState::Reconnecting);
    }

    /// Replaces the subscription set and sends it to the broker.
    pub fn set_subscriptions(&mut self, subscriptions: Vec<String>) {
        self.subscriptions = subscriptions;
        self.resubscribe();
    }

    /// Sends the whole subscription set again.
    pub fn resubscribe(&self) {
        if self.subscriptions.is_empty() {
            warn!("No topics configured, nothing to subscribe to");
            return;
        }
        let filters = self
            .subscriptions
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), self.settings.qos));
        match self.client.try_subscribe_many(filters) {
            Ok(()) => info!("Subscribed to {} topic(s)", self.subscriptions.len()),
            Err(e) => warn!("Subscribe failed: {}", e),
        }
    }

    /// Queues a publish. Returns once the request is enqueued.
    pub fn publish(&self, message: &OutboundMessage) -> Result<(), SessionError> {
        self.client.try_publish(
            message.topic.clone(),
            message.qos,
            message.retain,
            message.payload.clone().into_bytes(),
        )?;
        info!("Published {}", message);
        self.update_status(|s| {
            s.messages_sent += 1;
            s.last_activity = Some(Local::now());
        });
        Ok(())
    }

    /// Disconnects and drops the event loop.
    pub fn close(self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request not sent: {}", e);
        }
        self.update_status(|s| s.connection_state = ConnectionState::Disconnected);
        info!("MQTT session closed");
    }
}

fn tls_transport(verify: bool) -> Transport {
    if verify {
        return Transport::tls_with_default_config();
    }
    warn!("TLS certificate verification disabled");
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(config)))
}

/// Accepts any server certificate. Only used when verification is turned off.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_history_is_bounded() {
        let mut status = SessionStatus::default();
        for i in 0..(ERROR_HISTORY + 5) {
            status.record_error(format!("error {}", i));
        }
        assert_eq!(status.error_messages.len(), ERROR_HISTORY);
        assert_eq!(status.error_messages[0], "error 5");
    }

    #[tokio::test]
    async fn prepared_session_reports_connecting() {
        let (tx, rx) = watch::channel(SessionStatus::default());
        let session = BrokerSession::<Prepared>::create(
            BrokerSettings::default(),
            vec!["alarm/state".to_string()],
            Arc::new(tx),
        )
        .unwrap();
        assert_eq!(rx.borrow().connection_state, ConnectionState::Connecting);

        let running = session.start();
        assert_eq!(running.subscriptions(), &["alarm/state".to_string()]);
        running.close();
        assert_eq!(rx.borrow().connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_connecting() {
        let (tx, _rx) = watch::channel(SessionStatus::default());
        let settings = BrokerSettings {
            url: "http://broker".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            BrokerSession::<Prepared>::create(settings, Vec::new(), Arc::new(tx)),
            Err(SessionError::InvalidBrokerUrl(_))
        ));
    }

    #[tokio::test]
    async fn insecure_tls_session_can_be_prepared() {
        let (tx, _rx) = watch::channel(SessionStatus::default());
        let settings = BrokerSettings {
            url: "mqtts://broker.local".to_string(),
            reject_unauthorized: false,
            ..Default::default()
        };
        assert!(BrokerSession::<Prepared>::create(settings, Vec::new(), Arc::new(tx)).is_ok());
    }
}
