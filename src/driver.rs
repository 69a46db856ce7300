use std::sync::Arc;

use tracing::info;

use crate::config::{ProxyConfig, ProxyEndpoint};
use crate::connection::ProxyConnection;
use crate::error::DbProxyError;
use crate::transport::Connector;

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "dbproxy";

/// Entry point: a configured transport that opens [`ProxyConnection`]s.
///
/// Which transport is used is decided once, when the driver is built.
#[derive(Clone)]
pub struct ProxyDriver {
    connector: Arc<dyn Connector>,
    endpoint: String,
}

impl std::fmt::Debug for ProxyDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyDriver")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl ProxyDriver {
    /// Validate `config` and build the matching transport.
    ///
    /// # Errors
    /// [`DbProxyError::ConfigError`] for an invalid endpoint or a transport not compiled in.
    pub fn new(config: ProxyConfig) -> Result<Self, DbProxyError> {
        config.validate()?;
        let endpoint = format!("{:?}", config.endpoint);
        let connector = build_connector(&config)?;
        info!(%endpoint, "dbproxy driver configured");
        Ok(Self {
            connector,
            endpoint,
        })
    }

    /// [`ProxyConfig::from_env`] followed by [`ProxyDriver::new`].
    ///
    /// # Errors
    /// [`DbProxyError::ConfigError`] when no proxy is configured in the environment.
    pub fn from_env() -> Result<Self, DbProxyError> {
        Self::new(ProxyConfig::from_env()?)
    }

    /// Use a custom connector, e.g. an in-process fake.
    #[must_use]
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            endpoint: "custom".into(),
        }
    }

    #[must_use]
    pub fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    /// Open a database on the proxy.
    ///
    /// # Errors
    /// `ConnectionError` if the transport cannot be set up, otherwise the `open-db` failure.
    pub async fn open(&self, dsn: &str) -> Result<ProxyConnection, DbProxyError> {
        let caller = self.connector.connect().await?;
        ProxyConnection::open(caller, dsn).await
    }
}

fn build_connector(config: &ProxyConfig) -> Result<Arc<dyn Connector>, DbProxyError> {
    match &config.endpoint {
        #[cfg(feature = "http")]
        ProxyEndpoint::Http { base_url } => {
            let caller = crate::transport::http::HttpCaller::new(base_url, config.connect_timeout)?;
            Ok(Arc::new(crate::transport::http::HttpConnector::new(caller)))
        }
        #[cfg(feature = "jsonl")]
        ProxyEndpoint::Jsonl { addr } => Ok(Arc::new(crate::transport::jsonl::JsonlConnector::new(
            crate::transport::jsonl::RpcAddr::Tcp(addr.clone()),
            config.reconnect_attempts,
            config.connect_timeout,
        ))),
        #[cfg(feature = "websocket")]
        ProxyEndpoint::WebSocket { addr } => {
            Ok(Arc::new(crate::transport::jsonl::JsonlConnector::new(
                crate::transport::jsonl::RpcAddr::WebSocket(addr.clone()),
                config.reconnect_attempts,
                config.connect_timeout,
            )))
        }
        #[allow(unreachable_patterns)]
        other => Err(DbProxyError::ConfigError(format!(
            "{:?} transport is not enabled in the current build",
            other.kind()
        ))),
    }
}

/// Database type prefix of a DSN, e.g. `"mysql"` for `"mysql://user@host/db"`.
///
/// # Errors
/// [`DbProxyError::ConfigError`] when the DSN has no `type:` prefix.
pub fn parse_dsn_db_type(dsn: &str) -> Result<&str, DbProxyError> {
    match dsn.find(':') {
        Some(pos) if pos > 0 => Ok(&dsn[..pos]),
        _ => Err(DbProxyError::ConfigError("unknown dsn".into())),
    }
}
