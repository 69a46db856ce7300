//! Names and argument shapes of the ten proxy actions.
//!
//! [`DriverAdapter`] builds each action's argument mapping, hands it to the configured
//! [`ProxyCaller`] and decodes the typed field it expects from the reply. It keeps no state of
//! its own; handle bookkeeping lives in [`crate::connection`].
use std::sync::Arc;

use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::cursor::ResultCursor;
use crate::error::DbProxyError;
use crate::protocol::{
    Action, BeginTxResult, OpenDbResult, PrepareResult, ProxyArgs, QueryResult, decode_result,
};
use crate::results::ExecOutcome;
use crate::transport::{CallReply, ProxyCaller};
use crate::types::{DbId, RowValues, StmtId, TxId, TxOptions};

#[derive(Clone)]
pub struct DriverAdapter {
    caller: Arc<dyn ProxyCaller>,
}

impl std::fmt::Debug for DriverAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverAdapter")
            .field("transport", &self.caller.transport())
            .finish()
    }
}

fn args(value: JsonValue) -> ProxyArgs {
    match value {
        JsonValue::Object(map) => map,
        _ => ProxyArgs::new(),
    }
}

fn positional(params: &[RowValues]) -> JsonValue {
    JsonValue::Array(params.iter().map(RowValues::to_json).collect())
}

fn tx_field(tx: Option<&TxId>) -> &str {
    tx.map_or("", TxId::as_str)
}

impl DriverAdapter {
    #[must_use]
    pub fn new(caller: Arc<dyn ProxyCaller>) -> Self {
        Self { caller }
    }

    #[must_use]
    pub fn transport(&self) -> &'static str {
        self.caller.transport()
    }

    async fn invoke(
        &self,
        action: Action,
        args: ProxyArgs,
    ) -> Result<CallReply, DbProxyError> {
        let is_query = action == Action::Query;
        let reply = self.caller.call(action, args, is_query).await;
        match &reply {
            Ok(_) => debug!(%action, transport = self.caller.transport(), "dbproxy action"),
            Err(err) => {
                debug!(%action, transport = self.caller.transport(), %err, "dbproxy action failed");
            }
        }
        reply
    }

    /// `open-db {dsn}` → `db-id`
    ///
    /// # Errors
    /// `RemoteError` from the proxy, `DecodeError` if no `db-id` comes back.
    pub async fn open_db(&self, dsn: &str) -> Result<DbId, DbProxyError> {
        let reply = self.invoke(Action::OpenDb, args(json!({ "dsn": dsn }))).await?;
        let res: OpenDbResult = decode_result(Action::OpenDb, reply.result)?;
        Ok(res.db_id)
    }

    /// `close-db {did}`
    ///
    /// # Errors
    /// Propagates transport and remote failures.
    pub async fn close_db(&self, db: &DbId) -> Result<(), DbProxyError> {
        self.invoke(Action::CloseDb, args(json!({ "did": db })))
            .await
            .map(drop)
    }

    /// `ping {did, tid}`; an empty `tid` when no transaction is active.
    ///
    /// # Errors
    /// Propagates transport and remote failures.
    pub async fn ping(&self, db: &DbId, tx: Option<&TxId>) -> Result<(), DbProxyError> {
        self.invoke(
            Action::Ping,
            args(json!({ "did": db, "tid": tx_field(tx) })),
        )
        .await
        .map(drop)
    }

    /// `begin-tx {did, opts}` → `tx-id`
    ///
    /// # Errors
    /// `RemoteError` from the proxy, `DecodeError` if no `tx-id` comes back.
    pub async fn begin_tx(&self, db: &DbId, opts: TxOptions) -> Result<TxId, DbProxyError> {
        let reply = self
            .invoke(Action::BeginTx, args(json!({ "did": db, "opts": opts })))
            .await?;
        let res: BeginTxResult = decode_result(Action::BeginTx, reply.result)?;
        Ok(res.tx_id)
    }

    /// `commit {tid}`
    ///
    /// # Errors
    /// Propagates transport and remote failures.
    pub async fn commit(&self, tx: &TxId) -> Result<(), DbProxyError> {
        self.invoke(Action::Commit, args(json!({ "tid": tx })))
            .await
            .map(drop)
    }

    /// `rollback {tid}`
    ///
    /// # Errors
    /// Propagates transport and remote failures.
    pub async fn rollback(&self, tx: &TxId) -> Result<(), DbProxyError> {
        self.invoke(Action::Rollback, args(json!({ "tid": tx })))
            .await
            .map(drop)
    }

    /// `prepare {did, tid, query}` → `stmt-id`
    ///
    /// # Errors
    /// `RemoteError` from the proxy, `DecodeError` if no `stmt-id` comes back.
    pub async fn prepare(
        &self,
        db: &DbId,
        tx: Option<&TxId>,
        query: &str,
    ) -> Result<StmtId, DbProxyError> {
        let reply = self
            .invoke(
                Action::Prepare,
                args(json!({ "did": db, "tid": tx_field(tx), "query": query })),
            )
            .await?;
        let res: PrepareResult = decode_result(Action::Prepare, reply.result)?;
        Ok(res.stmt_id)
    }

    /// `close-stmt {sid}`
    ///
    /// # Errors
    /// Propagates transport and remote failures.
    pub async fn close_stmt(&self, stmt: &StmtId) -> Result<(), DbProxyError> {
        self.invoke(Action::CloseStmt, args(json!({ "sid": stmt })))
            .await
            .map(drop)
    }

    /// `exec {sid, args}` → `{lastInsertId, rowsAffected}`
    ///
    /// # Errors
    /// `RemoteError` from the proxy, `DecodeError` if either count is missing.
    pub async fn exec(
        &self,
        stmt: &StmtId,
        params: &[RowValues],
    ) -> Result<ExecOutcome, DbProxyError> {
        let reply = self
            .invoke(
                Action::Exec,
                args(json!({ "sid": stmt, "args": positional(params) })),
            )
            .await?;
        decode_result(Action::Exec, reply.result)
    }

    /// `query {sid, args}` → `{columns}` followed by the row stream.
    ///
    /// # Errors
    /// `RemoteError` from the proxy, `DecodeError` if no column list comes back.
    pub async fn query(
        &self,
        stmt: &StmtId,
        params: &[RowValues],
    ) -> Result<ResultCursor, DbProxyError> {
        let reply = self
            .invoke(
                Action::Query,
                args(json!({ "sid": stmt, "args": positional(params) })),
            )
            .await?;
        // rows (if any) are cancelled on drop when the columns fail to decode
        let res: QueryResult = decode_result(Action::Query, reply.result)?;
        Ok(ResultCursor::new(res.columns, reply.rows))
    }

    /// Release the transport behind this adapter.
    pub async fn shutdown(&self) {
        self.caller.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingCaller, ok};
    use serde_json::json;

    #[tokio::test]
    async fn every_action_sends_its_verb_and_fields() {
        let caller = RecordingCaller::new();
        caller.push(ok(json!({"db-id": "c1"})));
        caller.push(ok(json!(null)));
        caller.push(ok(json!({"tx-id": "t1"})));
        caller.push(ok(json!({"stmt-id": "s1"})));
        caller.push(ok(json!({"lastInsertId": 9, "rowsAffected": 2})));
        caller.push(ok(json!(null)));
        caller.push(ok(json!(null)));
        caller.push(ok(json!(null)));
        caller.push(ok(json!(null)));
        let adapter = DriverAdapter::new(caller.clone());

        let db = adapter.open_db("mysql://u@h/db").await.unwrap();
        assert_eq!(db.as_str(), "c1");
        adapter.ping(&db, None).await.unwrap();
        let tx = adapter.begin_tx(&db, TxOptions::default()).await.unwrap();
        assert_eq!(tx.as_str(), "t1");
        let stmt = adapter
            .prepare(&db, Some(&tx), "UPDATE t SET a = ?")
            .await
            .unwrap();
        let outcome = adapter
            .exec(&stmt, &[RowValues::Int(5)])
            .await
            .unwrap();
        assert_eq!(outcome, ExecOutcome::new(9, 2));
        adapter.close_stmt(&stmt).await.unwrap();
        adapter.commit(&tx).await.unwrap();
        adapter.rollback(&tx).await.unwrap();
        adapter.close_db(&db).await.unwrap();

        let calls = caller.calls();
        let verbs: Vec<_> = calls.iter().map(|c| c.action.verb()).collect();
        assert_eq!(
            verbs,
            [
                "open-db", "ping", "begin-tx", "prepare", "exec", "close-stmt", "commit",
                "rollback", "close-db"
            ]
        );
        assert_eq!(calls[0].args, json!({"dsn": "mysql://u@h/db"}));
        assert_eq!(calls[1].args, json!({"did": "c1", "tid": ""}));
        assert_eq!(
            calls[2].args,
            json!({"did": "c1", "opts": {"Isolation": 0, "ReadOnly": false}})
        );
        assert_eq!(
            calls[3].args,
            json!({"did": "c1", "tid": "t1", "query": "UPDATE t SET a = ?"})
        );
        assert_eq!(calls[4].args, json!({"sid": "s1", "args": [5]}));
        assert!(calls.iter().all(|c| !c.is_query));
    }

    #[tokio::test]
    async fn query_sets_the_query_flag_and_wraps_rows() {
        let caller = RecordingCaller::new();
        caller.push_rows(
            json!({"columns": ["a", "b"]}),
            vec![json!([1, "x"]), json!([2, "y"])],
        );
        let adapter = DriverAdapter::new(caller.clone());

        let mut cursor = adapter
            .query(&StmtId::new("s1"), &[RowValues::Text("k".into())])
            .await
            .unwrap();
        assert_eq!(cursor.columns(), ["a".to_string(), "b".to_string()]);
        let mut dest = vec![RowValues::Null; 2];
        assert!(cursor.next(&mut dest).await.unwrap());
        assert!(cursor.next(&mut dest).await.unwrap());
        assert_eq!(dest[1], RowValues::Text("y".into()));
        assert!(!cursor.next(&mut dest).await.unwrap());

        let calls = caller.calls();
        assert!(calls[0].is_query);
        assert_eq!(calls[0].args, json!({"sid": "s1", "args": ["k"]}));
    }

    #[tokio::test]
    async fn missing_result_fields_are_decode_errors() {
        let caller = RecordingCaller::new();
        caller.push(ok(json!(null)));
        caller.push(ok(json!({"lastInsertId": 1})));
        caller.push(ok(json!({"rows": []})));
        let adapter = DriverAdapter::new(caller.clone());

        assert!(matches!(
            adapter.open_db("dsn").await,
            Err(DbProxyError::DecodeError(_))
        ));
        assert!(matches!(
            adapter.exec(&StmtId::new("s"), &[]).await,
            Err(DbProxyError::DecodeError(_))
        ));
        assert!(matches!(
            adapter.query(&StmtId::new("s"), &[]).await,
            Err(DbProxyError::DecodeError(_))
        ));
    }

    #[tokio::test]
    async fn remote_errors_pass_through_verbatim() {
        let caller = RecordingCaller::new();
        caller.push(Err(DbProxyError::remote(500, "unknown dsn")));
        let adapter = DriverAdapter::new(caller.clone());
        match adapter.open_db("bogus").await {
            Err(DbProxyError::RemoteError { code, msg }) => {
                assert_eq!(code, 500);
                assert_eq!(msg, "unknown dsn");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
