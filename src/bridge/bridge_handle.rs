//! Bridge Handle - async API and runtime task for the bridge
//!
//! One tokio task owns the [`Bridge`] and the broker session. Everything else
//! talks to it through a [`BridgeHandle`]: commands go in over an mpsc channel
//! and are answered through oneshot responders, connection status comes out of
//! a watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Bridge;
use crate::error::BridgeError;
use crate::mqtt::session::{
    BrokerSession, Prepared, Running, SessionError, SessionEvent, SessionStatus,
};
use crate::panel::SecurityMode;
use crate::persistence::{SettingChange, SettingEntry};

/// Wait between a connection error and the next reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const COMMAND_CAPACITY: usize = 32;

macro_rules! respond {
    ($response_tx:expr, $value:expr) => {
        if $response_tx.send($value).is_err() {
            debug!("Caller dropped before the response was sent");
        }
    };
}

/// Requests handled by the runtime task.
#[derive(Debug)]
pub enum BridgeCommand {
    /// Arm into a mode, or disarm with [`SecurityMode::Disarmed`].
    Arm {
        mode: SecurityMode,
        response_tx: oneshot::Sender<Result<(), BridgeError>>,
    },
    PutSetting {
        key: String,
        value: String,
        response_tx: oneshot::Sender<Result<SettingChange, BridgeError>>,
    },
    ListSettings {
        response_tx: oneshot::Sender<Vec<SettingEntry>>,
    },
    /// Tear down the session and connect again with the current settings.
    Reconnect,
}

/// Cheap, cloneable access to a running bridge.
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    commands: mpsc::Sender<BridgeCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl BridgeHandle {
    /// Starts the runtime task. It stops when `cancel` fires or every handle
    /// is dropped.
    pub fn spawn(bridge: Bridge, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let runtime = BridgeRuntime {
            bridge,
            session: None,
            retry_at: None,
            commands: commands_rx,
            status: Arc::new(status_tx),
            cancel,
        };
        let task = tokio::spawn(runtime.run());

        (
            Self {
                commands: commands_tx,
                status: status_rx,
            },
            task,
        )
    }

    pub async fn arm(&self, mode: SecurityMode) -> Result<(), BridgeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(BridgeCommand::Arm { mode, response_tx }).await?;
        response_rx.await.map_err(|_| BridgeError::Stopped)?
    }

    pub async fn disarm(&self) -> Result<(), BridgeError> {
        self.arm(SecurityMode::Disarmed).await
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<SettingChange, BridgeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(BridgeCommand::PutSetting {
            key: key.to_string(),
            value: value.to_string(),
            response_tx,
        })
        .await?;
        response_rx.await.map_err(|_| BridgeError::Stopped)?
    }

    pub async fn settings(&self) -> Result<Vec<SettingEntry>, BridgeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(BridgeCommand::ListSettings { response_tx }).await?;
        response_rx.await.map_err(|_| BridgeError::Stopped)
    }

    pub async fn reconnect(&self) -> Result<(), BridgeError> {
        self.send(BridgeCommand::Reconnect).await
    }

    /// Latest connection status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    async fn send(&self, command: BridgeCommand) -> Result<(), BridgeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BridgeError::Stopped)
    }
}

enum Step {
    Shutdown,
    Command(BridgeCommand),
    Session(Result<SessionEvent, SessionError>),
}

struct BridgeRuntime {
    bridge: Bridge,
    session: Option<BrokerSession<Running>>,
    /// Set after a connection error; polling resumes once it has passed.
    retry_at: Option<Instant>,
    commands: mpsc::Receiver<BridgeCommand>,
    status: Arc<watch::Sender<SessionStatus>>,
    cancel: CancellationToken,
}

impl BridgeRuntime {
    async fn run(mut self) {
        info!("Bridge runtime started");
        self.bridge.check_topics();
        self.connect();

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Shutdown,
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Shutdown,
                },
                event = next_event(&mut self.session, &mut self.retry_at) => Step::Session(event),
            };

            match step {
                Step::Shutdown => break,
                Step::Command(command) => self.handle_command(command),
                Step::Session(Ok(event)) => self.handle_event(event),
                Step::Session(Err(_)) => {
                    self.bridge.on_connection_lost();
                    if let Some(session) = &self.session {
                        session.mark_reconnecting();
                    }
                    self.retry_at = Some(Instant::now() + RECONNECT_DELAY);
                }
            }
        }

        self.disconnect();
        info!("Bridge runtime stopped");
    }

    /// Drops any existing session, then starts a new one from the current
    /// settings.
    fn connect(&mut self) {
        self.disconnect();
        self.retry_at = None;
        let settings = self.bridge.settings().broker.clone();
        info!("Connecting MQTT {} ...", settings.url);
        let subscriptions = self.bridge.subscriptions();
        match BrokerSession::<Prepared>::create(settings, subscriptions, self.status.clone()) {
            Ok(session) => self.session = Some(session.start()),
            Err(e) => error!("Cannot start MQTT session: {}", e),
        }
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => {
                if let Some(session) = &mut self.session {
                    session.set_subscriptions(self.bridge.subscriptions());
                }
                self.bridge.on_connected();
            }
            SessionEvent::Message(message) => {
                self.bridge.handle_message(&message.topic, &message.payload);
            }
            SessionEvent::Disconnected => self.bridge.on_connection_lost(),
            SessionEvent::Other => {}
        }
    }

    fn handle_command(&mut self, command: BridgeCommand) {
        match command {
            BridgeCommand::Arm { mode, response_tx } => {
                respond!(response_tx, self.arm(mode));
            }
            BridgeCommand::PutSetting {
                key,
                value,
                response_tx,
            } => {
                let result = self.bridge.apply_setting(&key, &value);
                let reconnect = matches!(
                    result,
                    Ok(SettingChange::Sensors | SettingChange::Connection)
                );
                respond!(response_tx, result);
                if reconnect {
                    self.bridge.check_topics();
                    self.connect();
                }
            }
            BridgeCommand::ListSettings { response_tx } => {
                respond!(response_tx, self.bridge.describe_settings());
            }
            BridgeCommand::Reconnect => self.connect(),
        }
    }

    /// Resolves once the publish is queued. A failed enqueue is logged, not
    /// returned.
    fn arm(&mut self, mode: SecurityMode) -> Result<(), BridgeError> {
        let Some(session) = &self.session else {
            return Err(BridgeError::NotConfigured("no MQTT session".to_string()));
        };
        let message = self.bridge.prepare_command(mode)?;
        if let Err(e) = session.publish(&message) {
            warn!("Publish to {} failed: {}", message.topic, e);
        }
        Ok(())
    }
}

/// Polls the session if there is one; otherwise never resolves.
///
/// While a retry deadline is pending it waits for it first. If the wait is
/// interrupted by another branch the deadline stays in place.
async fn next_event(
    session: &mut Option<BrokerSession<Running>>,
    retry_at: &mut Option<Instant>,
) -> Result<SessionEvent, SessionError> {
    if let Some(deadline) = *retry_at {
        tokio::time::sleep_until(deadline).await;
        *retry_at = None;
    }
    match session {
        Some(session) => session.poll().await,
        None => std::future::pending().await,
    }
}
