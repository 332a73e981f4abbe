use crate::core::errors::PlatformError;
use url::Url;

/// Default slice of the event loop driven by one `service()` call, in ms.
pub const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 250;
/// Default delay between connection attempts, in ms.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;
/// Default budget of connection attempts before `connect()` gives up.
pub const DEFAULT_CONNECTION_ATTEMPTS: u32 = 5;
/// Default number of `service()` rounds to wait for a subscription confirm.
pub const DEFAULT_SUBSCRIBE_RETRIES: u32 = 10;

/// Connection descriptor plus the timing knobs of the cooperative loop.
///
/// Built from a venue URI; `wss`/`https` schemes select TLS, the port
/// defaults to 443 and the path to `/`.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub use_tls: bool,
    pub service_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub connection_attempts: u32,
    pub subscribe_retries: u32,
}

impl PlatformConfig {
    pub fn from_uri(uri: &str) -> Result<Self, PlatformError> {
        let url =
            Url::parse(uri).map_err(|e| PlatformError::InvalidUri(format!("{uri}: {e}")))?;

        let host = url
            .host_str()
            .ok_or_else(|| PlatformError::InvalidUri(format!("{uri}: missing host")))?
            .to_string();

        let scheme = url.scheme().to_string();
        let use_tls = matches!(scheme.as_str(), "https" | "wss");
        let port = url.port().unwrap_or(443);
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            scheme,
            host,
            port,
            path,
            use_tls,
            service_timeout_ms: DEFAULT_SERVICE_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connection_attempts: DEFAULT_CONNECTION_ATTEMPTS,
            subscribe_retries: DEFAULT_SUBSCRIBE_RETRIES,
        })
    }

    /// Set the `service()` slice length in milliseconds.
    #[must_use]
    pub fn with_service_timeout(mut self, ms: u64) -> Self {
        self.service_timeout_ms = ms;
        self
    }

    /// Set the delay between connection attempts in milliseconds.
    #[must_use]
    pub fn with_reconnect_delay(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    /// Set the connection-attempt budget.
    #[must_use]
    pub fn with_connection_attempts(mut self, attempts: u32) -> Self {
        self.connection_attempts = attempts;
        self
    }

    /// Set the subscription-confirm wait budget, in `service()` rounds.
    #[must_use]
    pub fn with_subscribe_retries(mut self, retries: u32) -> Self {
        self.subscribe_retries = retries;
        self
    }

    /// The URL handed to the WebSocket connector.
    pub fn ws_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uri_defaults() {
        let config = PlatformConfig::from_uri("wss://api.example.com/ws/2").unwrap();
        assert_eq!(config.host, "api.example.com");
        assert_eq!(config.port, 443);
        assert_eq!(config.path, "/ws/2");
        assert!(config.use_tls);
        assert_eq!(config.service_timeout_ms, 250);
        assert_eq!(config.reconnect_delay_ms, 500);
        assert_eq!(config.connection_attempts, 5);
        assert_eq!(config.subscribe_retries, 10);
    }

    #[test]
    fn test_from_uri_plain_ws() {
        let config = PlatformConfig::from_uri("ws://localhost:9001").unwrap();
        assert!(!config.use_tls);
        assert_eq!(config.port, 9001);
        assert_eq!(config.path, "/");
        assert_eq!(config.ws_url(), "ws://localhost:9001/");
    }

    #[test]
    fn test_from_uri_rejects_garbage() {
        assert!(PlatformConfig::from_uri("not a uri").is_err());
    }

    #[test]
    fn test_builder_setters() {
        let config = PlatformConfig::from_uri("wss://api.example.com")
            .unwrap()
            .with_service_timeout(1000)
            .with_reconnect_delay(100)
            .with_connection_attempts(3)
            .with_subscribe_retries(2);
        assert_eq!(config.service_timeout_ms, 1000);
        assert_eq!(config.reconnect_delay_ms, 100);
        assert_eq!(config.connection_attempts, 3);
        assert_eq!(config.subscribe_retries, 2);
    }
}
