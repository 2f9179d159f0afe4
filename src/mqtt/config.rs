use rumqttc::QoS;
use url::Url;

use super::session::SessionError;

pub const DEFAULT_BROKER_URL: &str = "mqtt://127.0.0.1:1883";
pub const DEFAULT_CLIENT_ID: &str = "alarm-bridge";

const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;

/// Broker connection and publish options.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub tls: bool,
    pub reject_unauthorized: bool,
    pub qos: QoS,
    pub retain: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BROKER_URL.to_string(),
            username: None,
            password: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            tls: false,
            reject_unauthorized: true,
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }
}

/// Host, port and transport resolved from [`BrokerSettings::url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerSettings {
    /// Resolves the broker URL. A bare `host:port` is read as `mqtt://host:port`.
    pub fn endpoint(&self) -> Result<BrokerEndpoint, SessionError> {
        let raw = self.url.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("mqtt://{}", raw)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| SessionError::InvalidBrokerUrl(format!("{}: {}", raw, e)))?;

        let scheme_tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" | "tls" => true,
            other => {
                return Err(SessionError::InvalidBrokerUrl(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };
        let tls = scheme_tls || self.tls;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SessionError::InvalidBrokerUrl(format!("{}: missing host", raw)))?
            .to_string();
        let port = url.port().unwrap_or(if tls { TLS_PORT } else { PLAIN_PORT });

        Ok(BrokerEndpoint { host, port, tls })
    }
}
