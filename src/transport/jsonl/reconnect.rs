use std::time::Duration;

use tracing::{info, warn};

use super::RpcAddr;
use super::client::{RpcClient, dial};
use crate::error::DbProxyError;

const RECONNECT_BACKOFF: Duration = Duration::from_millis(50);

/// Bounded redial of the configured endpoint.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    addr: RpcAddr,
    attempts: u32,
    connect_timeout: Duration,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(addr: RpcAddr, attempts: u32, connect_timeout: Duration) -> Self {
        Self {
            addr,
            attempts,
            connect_timeout,
        }
    }

    #[must_use]
    pub fn addr(&self) -> &RpcAddr {
        &self.addr
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Open the first connection for a new connection handle. Not retried.
    pub(crate) async fn dial(&self) -> Result<RpcClient, DbProxyError> {
        dial(&self.addr, self.connect_timeout).await
    }

    /// Try up to `attempts` times to open a replacement connection.
    ///
    /// # Errors
    /// [`DbProxyError::ConnectionError`] once every attempt has failed.
    pub(crate) async fn redial(&self) -> Result<RpcClient, DbProxyError> {
        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match dial(&self.addr, self.connect_timeout).await {
                Ok(client) => {
                    info!(addr = %self.addr, attempt, "jsonl-rpc reconnected");
                    return Ok(client);
                }
                Err(err) => {
                    warn!(addr = %self.addr, attempt, max = self.attempts, %err, "jsonl-rpc reconnect attempt failed");
                    last_error = Some(err);
                    if attempt < self.attempts {
                        tokio::time::sleep(RECONNECT_BACKOFF * attempt).await;
                    }
                }
            }
        }
        Err(DbProxyError::ConnectionError(format!(
            "reconnect to {} gave up after {} attempts{}",
            self.addr,
            self.attempts,
            last_error.map(|e| format!(": {e}")).unwrap_or_default()
        )))
    }
}
