//! Persistent-connection transport (JSONL-RPC over TCP or WebSocket).
//!
//! Each connection handle owns one [`JsonlCaller`], and with it one long-lived channel.
//! Non-query calls that find the channel already shut down trigger the [`ReconnectPolicy`] and
//! are retried exactly once on the replacement channel. Calls that were on the wire when the
//! channel died, and query calls, are not retried.
mod client;
mod reconnect;
mod wire;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use self::client::{RpcClient, RpcError, RpcReply};
use super::{CallReply, Connector, ProxyCaller};
use crate::error::DbProxyError;
use crate::protocol::{Action, ProxyArgs, ProxyRequest};

pub use reconnect::ReconnectPolicy;

/// Where the persistent channel is dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcAddr {
    /// Newline-delimited frames over plain TCP (`host:port`).
    Tcp(String),
    /// One frame per text message on `ws://host:port/websocket`.
    #[cfg(feature = "websocket")]
    WebSocket(String),
}

impl std::fmt::Display for RpcAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcAddr::Tcp(host) => write!(f, "tcp://{host}"),
            #[cfg(feature = "websocket")]
            RpcAddr::WebSocket(host) => write!(f, "ws://{host}{}", crate::config::WEBSOCKET_PATH),
        }
    }
}

/// [`ProxyCaller`] bound to one persistent channel, swapped out on reconnect.
pub struct JsonlCaller {
    current: RwLock<Arc<RpcClient>>,
    policy: ReconnectPolicy,
    reconnecting: Mutex<()>,
}

impl JsonlCaller {
    /// Dial a fresh channel for a new connection handle.
    ///
    /// # Errors
    /// [`DbProxyError::ConnectionError`] if the endpoint cannot be reached.
    pub async fn connect(policy: ReconnectPolicy) -> Result<Self, DbProxyError> {
        let client = policy.dial().await?;
        Ok(Self {
            current: RwLock::new(Arc::new(client)),
            policy,
            reconnecting: Mutex::new(()),
        })
    }

    fn current(&self) -> Arc<RpcClient> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace `stale` with a freshly dialed channel, unless another caller already did.
    async fn reconnect(&self, stale: &Arc<RpcClient>) -> Result<(), DbProxyError> {
        let _guard = self.reconnecting.lock().await;
        let current = self.current();
        if !Arc::ptr_eq(&current, stale) && !current.is_shut_down() {
            debug!(peer = current.peer(), "channel already replaced by a concurrent caller");
            return Ok(());
        }
        let fresh = Arc::new(self.policy.redial().await?);
        let old = std::mem::replace(
            &mut *self.current.write().unwrap_or_else(PoisonError::into_inner),
            fresh,
        );
        old.close();
        Ok(())
    }

    async fn call_once(
        &self,
        request: &ProxyRequest<'_>,
    ) -> Result<RpcReply, DbProxyError> {
        let client = self.current();
        match client.call(request, false).await {
            Ok(reply) => Ok(reply),
            Err(RpcError::Shutdown) => {
                warn!(action = %request.action, peer = client.peer(), "jsonl-rpc connection shut down; reconnecting");
                self.reconnect(&client).await?;
                self.current()
                    .call(request, false)
                    .await
                    .map_err(|e| e.into_error(request.action.verb()))
            }
            Err(err @ RpcError::Interrupted) => Err(err.into_error(request.action.verb())),
            Err(RpcError::Failed(err)) => Err(err),
        }
    }
}

#[async_trait]
impl ProxyCaller for JsonlCaller {
    async fn call(
        &self,
        action: Action,
        args: ProxyArgs,
        is_query: bool,
    ) -> Result<CallReply, DbProxyError> {
        let request = ProxyRequest {
            action,
            args: &args,
        };
        debug!(%action, is_query, "dbproxy jsonl-rpc call");

        let reply = if is_query {
            self.current()
                .call(&request, true)
                .await
                .map_err(|e| e.into_error(action.verb()))?
        } else {
            self.call_once(&request).await?
        };

        let status = reply.response.code;
        let result = reply.response.into_result()?;
        Ok(CallReply {
            status,
            result,
            rows: reply.rows,
        })
    }

    async fn shutdown(&self) {
        self.current().close();
    }

    fn transport(&self) -> &'static str {
        "jsonl"
    }
}

/// Dials one [`JsonlCaller`] per connection handle.
#[derive(Debug, Clone)]
pub struct JsonlConnector {
    policy: ReconnectPolicy,
}

impl JsonlConnector {
    #[must_use]
    pub fn new(addr: RpcAddr, reconnect_attempts: u32, connect_timeout: Duration) -> Self {
        Self {
            policy: ReconnectPolicy::new(addr, reconnect_attempts, connect_timeout),
        }
    }
}

#[async_trait]
impl Connector for JsonlConnector {
    async fn connect(&self) -> Result<Arc<dyn ProxyCaller>, DbProxyError> {
        Ok(Arc::new(JsonlCaller::connect(self.policy.clone()).await?))
    }
}
