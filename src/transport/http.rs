//! Request/response transport: one `POST {base_url}/{action}` per action.
//!
//! The response body carries the envelope first; for queries, every further top-level JSON
//! array in the same body is one row.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::framing::JsonValueReader;
use super::{CallReply, Connector, ProxyCaller};
use crate::error::{DbProxyError, PROXY_OK};
use crate::protocol::{Action, ProxyArgs, ProxyRequest, ProxyResponse};
use crate::stream::{RowSender, RowStream};

/// [`ProxyCaller`] speaking to an HTTP proxy endpoint.
#[derive(Debug, Clone)]
pub struct HttpCaller {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCaller {
    /// Build a caller for `base_url` (trailing slashes are ignored).
    ///
    /// # Errors
    /// Returns [`DbProxyError::ConfigError`] if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, DbProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DbProxyError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ProxyCaller for HttpCaller {
    async fn call(
        &self,
        action: Action,
        args: ProxyArgs,
        is_query: bool,
    ) -> Result<CallReply, DbProxyError> {
        let url = format!("{}/{}", self.base_url, action.verb());
        debug!(%action, %url, "dbproxy http call");

        let response = self
            .client
            .post(&url)
            .json(&ProxyRequest {
                action,
                args: &args,
            })
            .send()
            .await
            .map_err(|e| DbProxyError::ConnectionError(format!("HTTP request failed: {e}")))?;

        let http_status = response.status();
        let mut body = JsonValueReader::new(Box::pin(response.bytes_stream()));

        let envelope = match body.next_value().await {
            Ok(Some(value)) => serde_json::from_value::<ProxyResponse>(value),
            Ok(None) if http_status.is_success() => {
                return Err(DbProxyError::DecodeError(format!(
                    "{action}: empty response body"
                )));
            }
            Ok(None) => return Err(status_error(http_status)),
            Err(err) if http_status.is_success() => return Err(err),
            Err(_) => return Err(status_error(http_status)),
        };
        let envelope = match envelope {
            Ok(env) => env,
            Err(_) if !http_status.is_success() => return Err(status_error(http_status)),
            Err(err) => {
                return Err(DbProxyError::DecodeError(format!(
                    "{action}: malformed envelope: {err}"
                )));
            }
        };

        if envelope.code != PROXY_OK {
            return Err(DbProxyError::remote(envelope.code, envelope.msg));
        }
        if !http_status.is_success() {
            return Err(DbProxyError::remote(
                i64::from(http_status.as_u16()),
                envelope.msg,
            ));
        }

        let status = envelope.code;
        let result = envelope.into_result()?;
        let rows = if is_query {
            let (sender, stream) = RowStream::channel();
            tokio::spawn(produce_rows(action, body, sender));
            Some(stream)
        } else {
            None
        };

        Ok(CallReply {
            status,
            result,
            rows,
        })
    }

    fn transport(&self) -> &'static str {
        "http"
    }
}

fn status_error(status: reqwest::StatusCode) -> DbProxyError {
    DbProxyError::remote(
        i64::from(status.as_u16()),
        status.canonical_reason().unwrap_or("HTTP error"),
    )
}

/// Decode trailing rows until the body ends or the consumer goes away.
async fn produce_rows<S, B, E>(action: Action, mut body: JsonValueReader<S>, sender: RowSender)
where
    S: futures_util::Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut count = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            () = sender.cancelled() => {
                debug!(%action, rows = count, "row consumer closed; dropping response body");
                return;
            }
            next = body.next_value() => next,
        };
        match next {
            Ok(Some(serde_json::Value::Array(row))) => {
                count += 1;
                trace!(%action, row = count, "http row decoded");
                if !sender.send(Ok(row)).await {
                    return;
                }
            }
            Ok(Some(other)) => {
                warn!(%action, "non-array value in row stream");
                let _ = sender
                    .send(Err(DbProxyError::DecodeError(format!(
                        "expected a row array, got {other}"
                    ))))
                    .await;
                return;
            }
            Ok(None) => {
                debug!(%action, rows = count, "http row stream finished");
                return;
            }
            Err(err) => {
                let _ = sender.send(Err(err)).await;
                return;
            }
        }
    }
}

/// Shares one [`HttpCaller`] across every connection handle.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    caller: Arc<HttpCaller>,
}

impl HttpConnector {
    #[must_use]
    pub fn new(caller: HttpCaller) -> Self {
        Self {
            caller: Arc::new(caller),
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self) -> Result<Arc<dyn ProxyCaller>, DbProxyError> {
        Ok(self.caller.clone())
    }
}
