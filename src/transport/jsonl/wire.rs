//! JSONL-RPC frames. One JSON object per line (or per WebSocket text message).
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DbProxyError;
use crate::protocol::{ProxyRequest, ProxyResponse};

/// Remote method every proxy action is dispatched through.
pub(crate) const PROXY_METHOD: &str = "DBProxy.Do";

#[derive(Debug, Serialize)]
pub(crate) struct CallFrame<'a> {
    pub id: u64,
    pub method: &'static str,
    pub params: &'a ProxyRequest<'a>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    id: u64,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    jsonl: bool,
    #[serde(default)]
    row: Option<Vec<JsonValue>>,
    #[serde(default)]
    eof: bool,
}

/// A decoded frame coming back from the proxy.
#[derive(Debug)]
pub(crate) enum ServerFrame {
    /// Envelope answering call `id`; `streams_rows` announces trailing row frames.
    Reply {
        id: u64,
        response: ProxyResponse,
        streams_rows: bool,
    },
    Row {
        id: u64,
        row: Vec<JsonValue>,
    },
    Eof {
        id: u64,
    },
}

impl ServerFrame {
    pub(crate) fn parse(line: &str) -> Result<Self, DbProxyError> {
        let raw: RawFrame = serde_json::from_str(line)?;
        if let Some(row) = raw.row {
            return Ok(ServerFrame::Row { id: raw.id, row });
        }
        if raw.eof {
            return Ok(ServerFrame::Eof { id: raw.id });
        }
        let Some(code) = raw.code else {
            return Err(DbProxyError::DecodeError(format!(
                "frame {} carries neither code, row nor eof",
                raw.id
            )));
        };
        Ok(ServerFrame::Reply {
            id: raw.id,
            response: ProxyResponse {
                code,
                msg: raw.msg,
                result: raw.result,
            },
            streams_rows: raw.jsonl,
        })
    }
}
