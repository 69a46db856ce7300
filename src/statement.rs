use crate::adapter::DriverAdapter;
use crate::cursor::ResultCursor;
use crate::error::DbProxyError;
use crate::results::ExecOutcome;
use crate::types::{DbId, RowValues, StmtId, TxId};

/// Handle to a statement prepared on the proxy.
///
/// The transaction binding is captured when the statement is prepared and never changes
/// afterwards. The handle stays usable for [`exec`](Self::exec) and [`query`](Self::query)
/// until [`close`](Self::close).
#[derive(Debug)]
pub struct ProxyStatement {
    adapter: DriverAdapter,
    db_id: DbId,
    tx_id: Option<TxId>,
    stmt_id: StmtId,
}

impl ProxyStatement {
    pub(crate) fn new(
        adapter: DriverAdapter,
        db_id: DbId,
        tx_id: Option<TxId>,
        stmt_id: StmtId,
    ) -> Self {
        Self {
            adapter,
            db_id,
            tx_id,
            stmt_id,
        }
    }

    #[must_use]
    pub fn id(&self) -> &StmtId {
        &self.stmt_id
    }

    #[must_use]
    pub fn connection(&self) -> &DbId {
        &self.db_id
    }

    /// Transaction this statement was prepared in, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&TxId> {
        self.tx_id.as_ref()
    }

    /// # Errors
    /// Propagates the `exec` failure.
    pub async fn exec(&self, params: &[RowValues]) -> Result<ExecOutcome, DbProxyError> {
        self.adapter.exec(&self.stmt_id, params).await
    }

    /// # Errors
    /// Propagates the `query` failure.
    pub async fn query(&self, params: &[RowValues]) -> Result<ResultCursor, DbProxyError> {
        self.adapter.query(&self.stmt_id, params).await
    }

    /// # Errors
    /// Propagates the `close-stmt` failure.
    pub async fn close(self) -> Result<(), DbProxyError> {
        self.adapter.close_stmt(&self.stmt_id).await
    }
}
