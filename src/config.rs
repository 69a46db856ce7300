use std::time::Duration;

use clap::ValueEnum;

use crate::error::DbProxyError;

/// Base URL of an HTTP proxy, e.g. `http://127.0.0.1:8080/db`.
pub const HTTP_PROXY_ENV: &str = "HTTP_DB_PROXY_BASEURL";
/// `host:port` of a JSONL-RPC proxy reachable over plain TCP.
pub const JSONL_PROXY_ENV: &str = "JSONLRPC_DB_PROXY_HOST";
/// `host:port` of a JSONL-RPC proxy reachable over WebSocket.
pub const WEBSOCKET_PROXY_ENV: &str = "JSONLRPC_DB_PROXY_WS_HOST";
/// Upgrade path used by the WebSocket flavour of the persistent protocol.
pub const WEBSOCKET_PATH: &str = "/websocket";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Redial attempts after a persistent connection is found shut down.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

/// Transport family, selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum TransportKind {
    /// Request/response over HTTP
    Http,
    /// Persistent JSONL-RPC over TCP
    Jsonl,
    /// Persistent JSONL-RPC over WebSocket
    Websocket,
}

/// Where the proxy lives. Exactly one is active per driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEndpoint {
    Http { base_url: String },
    Jsonl { addr: String },
    WebSocket { addr: String },
}

impl ProxyEndpoint {
    #[must_use]
    pub fn new(kind: TransportKind, location: impl Into<String>) -> Self {
        let location = location.into();
        match kind {
            TransportKind::Http => ProxyEndpoint::Http { base_url: location },
            TransportKind::Jsonl => ProxyEndpoint::Jsonl { addr: location },
            TransportKind::Websocket => ProxyEndpoint::WebSocket { addr: location },
        }
    }

    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            ProxyEndpoint::Http { .. } => TransportKind::Http,
            ProxyEndpoint::Jsonl { .. } => TransportKind::Jsonl,
            ProxyEndpoint::WebSocket { .. } => TransportKind::Websocket,
        }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            ProxyEndpoint::Http { base_url } => base_url,
            ProxyEndpoint::Jsonl { addr } | ProxyEndpoint::WebSocket { addr } => addr,
        }
    }
}

/// Proxy endpoint plus the knobs of the calling layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub endpoint: ProxyEndpoint,
    /// Redial attempts after a persistent connection is found shut down.
    pub reconnect_attempts: u32,
    /// Bound on dialing (persistent transport) and on the connect phase of HTTP requests.
    pub connect_timeout: Duration,
}

impl ProxyConfig {
    #[must_use]
    pub fn new(endpoint: ProxyEndpoint) -> Self {
        Self {
            endpoint,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Select the endpoint from the process environment.
    ///
    /// # Errors
    /// Returns [`DbProxyError::ConfigError`] when none of the proxy variables is set.
    pub fn from_env() -> Result<Self, DbProxyError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same selection as [`from_env`](Self::from_env) over an arbitrary lookup.
    ///
    /// The persistent protocol is tried first (TCP, then WebSocket), HTTP last. Empty values
    /// count as unset.
    ///
    /// # Errors
    /// Returns [`DbProxyError::ConfigError`] when nothing is configured.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DbProxyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(addr) = get(JSONL_PROXY_ENV) {
            return Ok(Self::new(ProxyEndpoint::Jsonl { addr }));
        }
        if let Some(addr) = get(WEBSOCKET_PROXY_ENV) {
            return Ok(Self::new(ProxyEndpoint::WebSocket { addr }));
        }
        if let Some(base_url) = get(HTTP_PROXY_ENV) {
            return Ok(Self::new(ProxyEndpoint::Http { base_url }));
        }
        Err(DbProxyError::ConfigError(format!(
            "env {JSONL_PROXY_ENV} or {WEBSOCKET_PROXY_ENV} or {HTTP_PROXY_ENV} expected"
        )))
    }

    /// Check the endpoint before any connection is attempted.
    ///
    /// # Errors
    /// Returns [`DbProxyError::ConfigError`] for an empty location, an HTTP base URL without an
    /// `http://`/`https://` scheme, or a persistent address that is not `host:port`.
    pub fn validate(&self) -> Result<(), DbProxyError> {
        if self.endpoint.location().trim().is_empty() {
            return Err(DbProxyError::ConfigError("proxy endpoint is empty".into()));
        }
        match &self.endpoint {
            ProxyEndpoint::Http { base_url } => {
                if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                    return Err(DbProxyError::ConfigError(format!(
                        "HTTP proxy base URL must start with http:// or https://, got {base_url}"
                    )));
                }
            }
            ProxyEndpoint::Jsonl { addr } | ProxyEndpoint::WebSocket { addr } => {
                if addr.contains("://") || !addr.contains(':') {
                    return Err(DbProxyError::ConfigError(format!(
                        "persistent proxy address must be host:port, got {addr}"
                    )));
                }
            }
        }
        if self.reconnect_attempts == 0 {
            return Err(DbProxyError::ConfigError(
                "reconnect_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
