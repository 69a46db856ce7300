//! Transport callers: one remote action in, one envelope (plus an optional row stream) out.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::DbProxyError;
use crate::protocol::{Action, ProxyArgs};
use crate::stream::RowStream;

#[cfg(feature = "http")]
pub(crate) mod framing;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "jsonl")]
pub mod jsonl;

/// Decoded answer to one remote action.
#[derive(Debug)]
pub struct CallReply {
    /// Envelope code; always the success sentinel when returned through `Ok`.
    pub status: i64,
    /// The envelope's `result` payload, `None` when absent or `null`.
    pub result: Option<JsonValue>,
    /// Rows trailing the envelope; only produced for `query` calls.
    pub rows: Option<RowStream>,
}

/// Issues remote proxy actions over one concrete transport.
///
/// A failure envelope is reported as [`DbProxyError::RemoteError`]; transport trouble as
/// [`DbProxyError::ConnectionError`].
#[async_trait]
pub trait ProxyCaller: Send + Sync {
    async fn call(
        &self,
        action: Action,
        args: ProxyArgs,
        is_query: bool,
    ) -> Result<CallReply, DbProxyError>;

    /// Release transport resources owned by this caller. Further calls may fail.
    async fn shutdown(&self) {}

    /// Short transport label used in logs.
    fn transport(&self) -> &'static str;
}

/// Produces the caller backing a new connection handle.
///
/// The HTTP transport shares one client across connections; the persistent transport dials a
/// dedicated channel per connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ProxyCaller>, DbProxyError>;
}
