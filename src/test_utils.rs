//! In-memory [`ProxyCaller`] that records every action and replays scripted replies.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::DbProxyError;
use crate::protocol::{Action, ProxyArgs};
use crate::stream::RowStream;
use crate::transport::{CallReply, ProxyCaller};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub action: Action,
    pub args: JsonValue,
    pub is_query: bool,
}

pub(crate) type Scripted = Result<(Option<JsonValue>, Option<Vec<JsonValue>>), DbProxyError>;

pub(crate) fn ok(result: JsonValue) -> Scripted {
    Ok((Some(result).filter(|r| !r.is_null()), None))
}

#[derive(Default)]
pub(crate) struct RecordingCaller {
    calls: Mutex<Vec<RecordedCall>>,
    script: Mutex<VecDeque<Scripted>>,
    shutdowns: AtomicUsize,
}

impl RecordingCaller {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, reply: Scripted) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_rows(&self, result: JsonValue, rows: Vec<JsonValue>) {
        self.push(Ok((Some(result), Some(rows))));
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyCaller for RecordingCaller {
    async fn call(
        &self,
        action: Action,
        args: ProxyArgs,
        is_query: bool,
    ) -> Result<CallReply, DbProxyError> {
        self.calls.lock().unwrap().push(RecordedCall {
            action,
            args: JsonValue::Object(args),
            is_query,
        });
        let scripted = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DbProxyError::ConnectionError("no scripted reply".into())));
        let (result, rows) = scripted?;
        let rows = rows.map(|rows| {
            let (sender, stream) = RowStream::channel();
            tokio::spawn(async move {
                for row in rows {
                    let row = match row {
                        JsonValue::Array(cells) => Ok(cells),
                        other => Err(DbProxyError::DecodeError(format!("not a row: {other}"))),
                    };
                    if !sender.send(row).await {
                        break;
                    }
                }
            });
            stream
        });
        Ok(CallReply {
            status: crate::error::PROXY_OK,
            result,
            rows,
        })
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn transport(&self) -> &'static str {
        "recording"
    }
}
