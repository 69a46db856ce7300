use std::sync::Arc;

use crate::adapter::DriverAdapter;
use crate::connection::TxState;
use crate::error::DbProxyError;
use crate::types::TxId;

/// Transaction handle, bound to the connection that began it.
///
/// Consumed by [`commit`](Self::commit) or [`rollback`](Self::rollback). Either way the
/// connection forgets the transaction id, even when the remote call fails. Dropping the handle
/// does not roll back.
#[derive(Debug)]
pub struct ProxyTransaction {
    adapter: DriverAdapter,
    tx_id: TxId,
    state: Arc<TxState>,
}

impl ProxyTransaction {
    pub(crate) fn new(adapter: DriverAdapter, tx_id: TxId, state: Arc<TxState>) -> Self {
        Self {
            adapter,
            tx_id,
            state,
        }
    }

    #[must_use]
    pub fn id(&self) -> &TxId {
        &self.tx_id
    }

    /// # Errors
    /// Propagates the `commit` failure; local state is cleared regardless.
    pub async fn commit(self) -> Result<(), DbProxyError> {
        let res = self.adapter.commit(&self.tx_id).await;
        self.state.clear(&self.tx_id);
        res
    }

    /// # Errors
    /// Propagates the `rollback` failure; local state is cleared regardless.
    pub async fn rollback(self) -> Result<(), DbProxyError> {
        let res = self.adapter.rollback(&self.tx_id).await;
        self.state.clear(&self.tx_id);
        res
    }
}
