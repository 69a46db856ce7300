//! Multiplexed JSONL-RPC client over one persistent connection.
//!
//! Calls are tagged with a connection-unique id. A reader task routes reply frames to the
//! waiting caller and row frames to the row stream opened by that reply; a writer task owns
//! the outbound half. When either side fails the client is shut down. Calls already written to
//! the wire fail with [`RpcError::Interrupted`], since the proxy may have acted on them; calls
//! never written, and every later call, fail with [`RpcError::Shutdown`].
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::RpcAddr;
use super::wire::{CallFrame, PROXY_METHOD, ServerFrame};
use crate::error::DbProxyError;
use crate::protocol::{ProxyRequest, ProxyResponse};
use crate::stream::{RowItem, RowStream};

const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub(crate) enum RpcError {
    /// The connection was shut down before the call reached the wire. Safe to retry.
    Shutdown,
    /// The connection went down after the call was written; its outcome is unknown.
    Interrupted,
    Failed(DbProxyError),
}

impl RpcError {
    pub(crate) fn into_error(self, context: &str) -> DbProxyError {
        match self {
            RpcError::Shutdown => {
                DbProxyError::ConnectionError(format!("{context}: connection is shut down"))
            }
            RpcError::Interrupted => DbProxyError::ConnectionError(format!(
                "{context}: connection lost while waiting for the reply"
            )),
            RpcError::Failed(err) => err,
        }
    }
}

#[derive(Debug)]
pub(crate) struct RpcReply {
    pub response: ProxyResponse,
    pub rows: Option<RowStream>,
}

struct PendingCall {
    respond_to: oneshot::Sender<Result<RpcReply, RpcError>>,
    wants_rows: bool,
    written: bool,
}

#[derive(Default)]
struct Registry {
    shut_down: bool,
    calls: HashMap<u64, PendingCall>,
    /// Row queues of open streams, each drained by its own forwarding task.
    streams: HashMap<u64, mpsc::UnboundedSender<RowItem>>,
}

struct Shared {
    peer: String,
    registry: Mutex<Registry>,
    closing: CancellationToken,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shut_down(&self, reason: &str, peer_initiated: bool) {
        let (calls, streams) = {
            let mut registry = self.registry();
            if registry.shut_down {
                return;
            }
            registry.shut_down = true;
            (
                std::mem::take(&mut registry.calls),
                std::mem::take(&mut registry.streams),
            )
        };
        if peer_initiated {
            warn!(peer = %self.peer, reason, pending = calls.len(), "jsonl-rpc connection shut down");
        } else {
            debug!(peer = %self.peer, reason, "jsonl-rpc connection closed");
        }
        self.closing.cancel();

        for call in calls.into_values() {
            let err = if call.written {
                RpcError::Interrupted
            } else {
                RpcError::Shutdown
            };
            let _ = call.respond_to.send(Err(err));
        }
        for (id, queue) in streams {
            let _ = queue.send(Err(DbProxyError::ConnectionError(format!(
                "connection closed while streaming rows of call {id}"
            ))));
        }
    }
}

/// One persistent channel to the proxy.
pub(crate) struct RpcClient {
    outbound: mpsc::UnboundedSender<(u64, String)>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub(crate) fn start<R, W>(peer: String, reader: R, writer: W) -> Self
    where
        R: Stream<Item = Result<String, String>> + Send + Unpin + 'static,
        W: Sink<String, Error = String> + Send + Unpin + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            peer,
            registry: Mutex::new(Registry::default()),
            closing: CancellationToken::new(),
        });
        tokio::spawn(write_loop(writer, outbound_rx, Arc::clone(&shared)));
        tokio::spawn(read_loop(reader, Arc::clone(&shared)));
        Self {
            outbound,
            shared,
            next_id: AtomicU64::new(1),
        }
    }

    /// Send one request and wait for its reply envelope.
    ///
    /// With `wants_rows`, a reply announcing trailing rows comes back with an open
    /// [`RowStream`] that keeps filling after this call returns.
    pub(crate) async fn call(
        &self,
        request: &ProxyRequest<'_>,
        wants_rows: bool,
    ) -> Result<RpcReply, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&CallFrame {
            id,
            method: PROXY_METHOD,
            params: request,
        })
        .map_err(|e| RpcError::Failed(e.into()))?;

        let (respond_to, reply) = oneshot::channel();
        {
            let mut registry = self.shared.registry();
            if registry.shut_down {
                return Err(RpcError::Shutdown);
            }
            registry.calls.insert(
                id,
                PendingCall {
                    respond_to,
                    wants_rows,
                    written: false,
                },
            );
        }

        trace!(id, action = %request.action, peer = %self.shared.peer, "jsonl-rpc call");
        if self.outbound.send((id, line)).is_err() {
            self.shared.registry().calls.remove(&id);
            return Err(RpcError::Shutdown);
        }
        reply.await.unwrap_or(Err(RpcError::Interrupted))
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shared.registry().shut_down
    }

    pub(crate) fn close(&self) {
        self.shared.shut_down("closed locally", false);
    }

    pub(crate) fn peer(&self) -> &str {
        &self.shared.peer
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shared.closing.cancel();
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<(u64, String)>,
    shared: Arc<Shared>,
) where
    W: Sink<String, Error = String> + Unpin,
{
    let failure = loop {
        let next = tokio::select! {
            () = shared.closing.cancelled() => break None,
            next = outbound.recv() => next,
        };
        let Some((id, line)) = next else {
            break None;
        };
        // from here on the proxy may see the call
        match shared.registry().calls.get_mut(&id) {
            Some(call) => call.written = true,
            None => continue,
        }
        if let Err(err) = writer.send(line).await {
            break Some(format!("write failed: {err}"));
        }
    };
    let _ = writer.close().await;
    match failure {
        Some(reason) => shared.shut_down(&reason, true),
        None => shared.shut_down("client dropped", false),
    }
}

async fn read_loop<R>(mut reader: R, shared: Arc<Shared>)
where
    R: Stream<Item = Result<String, String>> + Unpin,
{
    let failure = loop {
        let next = tokio::select! {
            () = shared.closing.cancelled() => break None,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(text)) => {
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    dispatch(&shared, line);
                }
            }
            Some(Err(err)) => break Some(format!("read failed: {err}")),
            None => break Some("peer closed the connection".to_string()),
        }
    };
    match failure {
        Some(reason) => shared.shut_down(&reason, true),
        None => shared.shut_down("closed locally", false),
    }
}

/// Route one frame. Never waits on a row consumer.
fn dispatch(shared: &Shared, line: &str) {
    let frame = match ServerFrame::parse(line) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(peer = %shared.peer, %err, "ignoring malformed jsonl-rpc frame");
            return;
        }
    };

    match frame {
        ServerFrame::Reply {
            id,
            response,
            streams_rows,
        } => {
            let Some(call) = shared.registry().calls.remove(&id) else {
                debug!(id, "reply for unknown call");
                return;
            };
            let rows = if streams_rows && call.wants_rows {
                let (sender, stream) = RowStream::channel();
                shared.registry().streams.insert(id, sender.buffered());
                Some(stream)
            } else {
                None
            };
            let _ = call.respond_to.send(Ok(RpcReply { response, rows }));
        }
        ServerFrame::Row { id, row } => {
            let mut registry = shared.registry();
            let Some(queue) = registry.streams.get(&id) else {
                trace!(id, "row for a closed stream dropped");
                return;
            };
            if queue.send(Ok(row)).is_err() {
                debug!(id, "row consumer went away");
                registry.streams.remove(&id);
            }
        }
        ServerFrame::Eof { id } => {
            shared.registry().streams.remove(&id);
        }
    }
}

pub(crate) async fn dial(addr: &RpcAddr, connect_timeout: Duration) -> Result<RpcClient, DbProxyError> {
    match addr {
        RpcAddr::Tcp(host) => dial_tcp(host, connect_timeout).await,
        #[cfg(feature = "websocket")]
        RpcAddr::WebSocket(host) => dial_websocket(host, connect_timeout).await,
    }
}

async fn dial_tcp(host: &str, connect_timeout: Duration) -> Result<RpcClient, DbProxyError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(host))
        .await
        .map_err(|_| DbProxyError::ConnectionError(format!("connecting to {host} timed out")))?
        .map_err(|e| DbProxyError::ConnectionError(format!("failed to connect to {host}: {e}")))?;
    stream.set_nodelay(true).map_err(|e| {
        DbProxyError::ConnectionError(format!("failed to set TCP_NODELAY: {e}"))
    })?;

    let (read, write) = stream.into_split();
    let reader = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_FRAME_BYTES))
        .map(|line| line.map_err(|e| e.to_string()));
    let writer = SinkExt::<String>::sink_map_err(FramedWrite::new(write, LinesCodec::new()), |e| {
        e.to_string()
    });
    debug!(%host, "jsonl-rpc connected over tcp");
    Ok(RpcClient::start(host.to_string(), reader, writer))
}

#[cfg(feature = "websocket")]
async fn dial_websocket(host: &str, connect_timeout: Duration) -> Result<RpcClient, DbProxyError> {
    use futures_util::future;
    use tokio_tungstenite::tungstenite::{self, Message};

    let url = format!("ws://{host}{}", crate::config::WEBSOCKET_PATH);
    let (ws, _) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .map_err(|_| DbProxyError::ConnectionError(format!("connecting to {url} timed out")))?
        .map_err(|e| DbProxyError::ConnectionError(format!("failed to connect to {url}: {e}")))?;

    let (sink, stream) = ws.split();
    let reader = stream.filter_map(|msg| {
        future::ready(match msg {
            Ok(Message::Text(text)) => Some(Ok(text.to_string())),
            Ok(Message::Binary(bytes)) => {
                Some(String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string()))
            }
            Ok(Message::Close(_)) => Some(Err("websocket closed by peer".to_string())),
            Ok(_) => None,
            Err(e) => Some(Err(e.to_string())),
        })
    });
    let writer = sink
        .with(|line: String| future::ready(Ok::<_, tungstenite::Error>(Message::Text(line.into()))))
        .sink_map_err(|e| e.to_string());
    debug!(%url, "jsonl-rpc connected over websocket");
    Ok(RpcClient::start(url, reader, writer))
}
