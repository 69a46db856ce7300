//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{ProxyConfig, ProxyEndpoint, TransportKind};
pub use crate::connection::ProxyConnection;
pub use crate::cursor::ResultCursor;
pub use crate::driver::{ProxyDriver, parse_dsn_db_type};
pub use crate::error::DbProxyError;
pub use crate::results::{CustomDbRow, ExecOutcome, ResultSet};
pub use crate::statement::ProxyStatement;
pub use crate::transaction::ProxyTransaction;
pub use crate::types::{DbId, IsolationLevel, RowValues, StmtId, TxId, TxOptions};

#[cfg(feature = "http")]
pub use crate::transport::http::{HttpCaller, HttpConnector};
#[cfg(feature = "jsonl")]
pub use crate::transport::jsonl::{JsonlCaller, JsonlConnector, RpcAddr};
