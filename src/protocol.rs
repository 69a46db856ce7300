//! Request and response envelopes exchanged with the DB proxy.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{DbProxyError, PROXY_OK};
use crate::types::{DbId, StmtId, TxId};

/// Argument mapping of one action, keyed by the proxy's short field names.
pub type ProxyArgs = Map<String, JsonValue>;

/// The ten remote actions understood by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    OpenDb,
    CloseDb,
    Ping,
    BeginTx,
    Commit,
    Rollback,
    Prepare,
    CloseStmt,
    Exec,
    Query,
}

impl Action {
    /// Verb used on the wire (and as the HTTP path segment).
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Action::OpenDb => "open-db",
            Action::CloseDb => "close-db",
            Action::Ping => "ping",
            Action::BeginTx => "begin-tx",
            Action::Commit => "commit",
            Action::Rollback => "rollback",
            Action::Prepare => "prepare",
            Action::CloseStmt => "close-stmt",
            Action::Exec => "exec",
            Action::Query => "query",
        }
    }

    #[must_use]
    pub fn from_verb(verb: &str) -> Option<Self> {
        Some(match verb {
            "open-db" => Action::OpenDb,
            "close-db" => Action::CloseDb,
            "ping" => Action::Ping,
            "begin-tx" => Action::BeginTx,
            "commit" => Action::Commit,
            "rollback" => Action::Rollback,
            "prepare" => Action::Prepare,
            "close-stmt" => Action::CloseStmt,
            "exec" => Action::Exec,
            "query" => Action::Query,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.verb())
    }
}

/// `{"action": <verb>, "args": {...}}`
#[derive(Debug, Serialize)]
pub struct ProxyRequest<'a> {
    pub action: Action,
    pub args: &'a ProxyArgs,
}

/// `{"code": <int>, "msg": <string>, "result": <any>}`
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub result: Option<JsonValue>,
}

impl ProxyResponse {
    /// Split the envelope into its payload, turning a failure code into [`DbProxyError::RemoteError`].
    ///
    /// # Errors
    /// Returns `RemoteError` carrying the proxy's code and message verbatim.
    pub fn into_result(self) -> Result<Option<JsonValue>, DbProxyError> {
        if self.code != PROXY_OK {
            return Err(DbProxyError::remote(self.code, self.msg));
        }
        Ok(self.result.filter(|r| !r.is_null()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenDbResult {
    #[serde(rename = "db-id")]
    pub db_id: DbId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BeginTxResult {
    #[serde(rename = "tx-id")]
    pub tx_id: TxId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrepareResult {
    #[serde(rename = "stmt-id")]
    pub stmt_id: StmtId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResult {
    pub columns: Vec<String>,
}

/// Decode the typed payload an action is expected to return.
///
/// An absent payload is a [`DbProxyError::DecodeError`], never a zero value.
pub(crate) fn decode_result<T: DeserializeOwned>(
    action: Action,
    result: Option<JsonValue>,
) -> Result<T, DbProxyError> {
    let Some(payload) = result else {
        return Err(DbProxyError::DecodeError(format!(
            "{action} succeeded without a result payload"
        )));
    };
    serde_json::from_value(payload)
        .map_err(|e| DbProxyError::DecodeError(format!("{action} result: {e}")))
}
