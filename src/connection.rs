use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::adapter::DriverAdapter;
use crate::error::DbProxyError;
use crate::results::{ExecOutcome, ResultSet};
use crate::statement::ProxyStatement;
use crate::transaction::ProxyTransaction;
use crate::transport::ProxyCaller;
use crate::types::{DbId, RowValues, TxId, TxOptions};

/// Transaction state of one connection handle.
#[derive(Debug, Default)]
pub(crate) enum TxSlot {
    #[default]
    Idle,
    /// `begin-tx` is in flight; a second begin is already a state error.
    Beginning,
    Active(TxId),
}

/// Shared between a connection and the transaction handle it hands out.
#[derive(Debug, Default)]
pub(crate) struct TxState {
    slot: Mutex<TxSlot>,
}

impl TxState {
    fn lock(&self) -> MutexGuard<'_, TxSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn active(&self) -> Option<TxId> {
        match &*self.lock() {
            TxSlot::Active(tx) => Some(tx.clone()),
            TxSlot::Idle | TxSlot::Beginning => None,
        }
    }

    /// Forget `tx` if it is still the active transaction.
    pub(crate) fn clear(&self, tx: &TxId) {
        let mut slot = self.lock();
        if matches!(&*slot, TxSlot::Active(active) if active == tx) {
            *slot = TxSlot::Idle;
        }
    }
}

/// Connection handle: one database opened on the proxy.
///
/// At most one transaction may be live on a connection. Statements prepared while a
/// transaction is active stay bound to it.
#[derive(Debug)]
pub struct ProxyConnection {
    adapter: DriverAdapter,
    db_id: DbId,
    tx: Arc<TxState>,
}

impl ProxyConnection {
    /// Issue `open-db` over `caller`. On failure the caller is shut down before returning.
    ///
    /// # Errors
    /// Propagates the `open-db` failure.
    pub async fn open(caller: Arc<dyn ProxyCaller>, dsn: &str) -> Result<Self, DbProxyError> {
        let adapter = DriverAdapter::new(caller);
        match adapter.open_db(dsn).await {
            Ok(db_id) => {
                debug!(%db_id, transport = adapter.transport(), "dbproxy connection opened");
                Ok(Self {
                    adapter,
                    db_id,
                    tx: Arc::new(TxState::default()),
                })
            }
            Err(err) => {
                adapter.shutdown().await;
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn db_id(&self) -> &DbId {
        &self.db_id
    }

    /// Id of the transaction currently live on this connection, if any.
    #[must_use]
    pub fn active_transaction(&self) -> Option<TxId> {
        self.tx.active()
    }

    /// # Errors
    /// Propagates transport and remote failures.
    pub async fn ping(&self) -> Result<(), DbProxyError> {
        self.adapter
            .ping(&self.db_id, self.tx.active().as_ref())
            .await
    }

    /// Start a transaction.
    ///
    /// # Errors
    /// [`DbProxyError::StateError`] without any remote call when a transaction is already
    /// live (or being started) on this connection; otherwise the `begin-tx` failure.
    pub async fn begin(&self, opts: TxOptions) -> Result<ProxyTransaction, DbProxyError> {
        {
            let mut slot = self.tx.lock();
            if !matches!(*slot, TxSlot::Idle) {
                return Err(DbProxyError::StateError(
                    "only one transaction allowed".into(),
                ));
            }
            *slot = TxSlot::Beginning;
        }

        match self.adapter.begin_tx(&self.db_id, opts).await {
            Ok(tx_id) => {
                *self.tx.lock() = TxSlot::Active(tx_id.clone());
                Ok(ProxyTransaction::new(
                    self.adapter.clone(),
                    tx_id,
                    Arc::clone(&self.tx),
                ))
            }
            Err(err) => {
                *self.tx.lock() = TxSlot::Idle;
                Err(err)
            }
        }
    }

    /// Prepare `query`, bound to the transaction active right now (if any).
    ///
    /// # Errors
    /// Propagates the `prepare` failure.
    pub async fn prepare(&self, query: &str) -> Result<ProxyStatement, DbProxyError> {
        let tx = self.tx.active();
        let stmt_id = self
            .adapter
            .prepare(&self.db_id, tx.as_ref(), query)
            .await?;
        Ok(ProxyStatement::new(
            self.adapter.clone(),
            self.db_id.clone(),
            tx,
            stmt_id,
        ))
    }

    /// Prepare, execute once and close a statement.
    ///
    /// # Errors
    /// The first failure among prepare, exec and close-stmt.
    pub async fn execute(
        &self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ExecOutcome, DbProxyError> {
        let stmt = self.prepare(query).await?;
        let outcome = stmt.exec(params).await;
        let closed = stmt.close().await;
        let outcome = outcome?;
        closed?;
        Ok(outcome)
    }

    /// Prepare, run and drain a query, then close the statement.
    ///
    /// # Errors
    /// The first failure among prepare, query, row decoding and close-stmt.
    pub async fn query_all(
        &self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DbProxyError> {
        let stmt = self.prepare(query).await?;
        let rows = match stmt.query(params).await {
            Ok(cursor) => cursor.collect_result_set().await,
            Err(err) => Err(err),
        };
        let closed = stmt.close().await;
        let rows = rows?;
        closed?;
        Ok(rows)
    }

    /// Issue `close-db`, then release the transport whatever the outcome.
    ///
    /// # Errors
    /// Propagates the `close-db` failure.
    pub async fn close(self) -> Result<(), DbProxyError> {
        let res = self.adapter.close_db(&self.db_id).await;
        self.adapter.shutdown().await;
        debug!(db_id = %self.db_id, ok = res.is_ok(), "dbproxy connection closed");
        res
    }
}
