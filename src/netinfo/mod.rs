//! Public address display info.
//!
//! Stateless: asks a configurable HTTP endpoint for the public IP and reads
//! the advertised port out of server.properties. Nothing in the lifecycle
//! core depends on this; callers show the result to operators who want to
//! hand out "connect here" details.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::properties::PropertiesDocument;

/// Minecraft's default server port, used when server.properties is missing
/// or does not carry a usable `server-port`.
pub const DEFAULT_SERVER_PORT: u16 = 25565;

#[derive(Error, Debug)]
pub enum NetInfoError {
    #[error("public IP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("public IP endpoint returned an unusable body: {0:?}")]
    InvalidResponse(String),
}

/// What a caller renders as the join address.
#[derive(Debug, Clone, Serialize)]
pub struct AddressInfo {
    /// None when the lookup failed; display layers show a placeholder
    pub public_ip: Option<String>,
    pub port: u16,
}

pub struct NetworkInfoProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl NetworkInfoProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NetInfoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("mcwarden-core")
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Fetch the public IP as plain text (api.ipify.org style endpoints).
    pub async fn public_ip(&self) -> Result<String, NetInfoError> {
        let body = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let ip = body.trim().to_string();
        // sanity check: an IP literal, not an error page
        if ip.is_empty() || ip.len() > 45 || ip.chars().any(char::is_whitespace) {
            return Err(NetInfoError::InvalidResponse(truncate(&body, 80)));
        }
        Ok(ip)
    }

    /// Advertised port from a properties document (`server-port`).
    /// Unparseable or missing values fall back to the Minecraft default.
    pub fn advertised_port(properties: &PropertiesDocument) -> u16 {
        match properties.get("server-port") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Unusable server-port value {:?}, assuming {}", raw, DEFAULT_SERVER_PORT);
                DEFAULT_SERVER_PORT
            }),
            None => DEFAULT_SERVER_PORT,
        }
    }

    /// Best-effort join address: IP lookup failures degrade to None rather
    /// than failing the caller, missing properties degrade to the default
    /// port. Both degradations are logged.
    pub async fn display_info(&self, properties_path: &Path) -> AddressInfo {
        let public_ip = match self.public_ip().await {
            Ok(ip) => Some(ip),
            Err(e) => {
                tracing::warn!("[NetInfo] Public IP lookup failed: {}", e);
                None
            }
        };
        let port = match PropertiesDocument::load(properties_path) {
            Ok(doc) => Self::advertised_port(&doc),
            Err(e) => {
                tracing::debug!("[NetInfo] No readable properties ({}), assuming port {}", e, DEFAULT_SERVER_PORT);
                DEFAULT_SERVER_PORT
            }
        };
        AddressInfo { public_ip, port }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_from_properties() {
        let doc = PropertiesDocument::parse("server-port=25570\n");
        assert_eq!(NetworkInfoProvider::advertised_port(&doc), 25570);
    }

    #[test]
    fn missing_port_uses_default() {
        let doc = PropertiesDocument::parse("motd=hi\n");
        assert_eq!(NetworkInfoProvider::advertised_port(&doc), DEFAULT_SERVER_PORT);
    }

    #[test]
    fn garbage_port_uses_default() {
        let doc = PropertiesDocument::parse("server-port=not-a-number\n");
        assert_eq!(NetworkInfoProvider::advertised_port(&doc), DEFAULT_SERVER_PORT);
    }

    #[test]
    fn duplicate_port_takes_last() {
        let doc = PropertiesDocument::parse("server-port=1000\nserver-port=2000\n");
        assert_eq!(NetworkInfoProvider::advertised_port(&doc), 2000);
    }

    #[tokio::test]
    async fn display_info_degrades_without_network() {
        // unroutable endpoint with a tiny timeout: lookup fails, port falls
        // back to the default because the properties path does not exist
        let provider =
            NetworkInfoProvider::new("http://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        let info = provider.display_info(Path::new("/does/not/exist.properties")).await;
        assert!(info.public_ip.is_none());
        assert_eq!(info.port, DEFAULT_SERVER_PORT);
    }
}
