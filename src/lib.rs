//! Async SQL driver that forwards every database operation to a remote DB proxy.
//!
//! The driver itself holds no database code. Opening a connection, beginning a
//! transaction, preparing and running statements are turned into `{action, args}`
//! requests and sent over one of two transports:
//!
//! - HTTP: one POST per call to `{base_url}/{action}`.
//! - JSONL-RPC: a persistent TCP (or WebSocket) connection carrying one JSON object
//!   per line, with query rows streamed back as separate frames.
//!
//! ```rust,no_run
//! use sql_dbproxy::prelude::*;
//!
//! # async fn run() -> Result<(), DbProxyError> {
//! let driver = ProxyDriver::from_env()?;
//! let conn = driver.open("mysql://app@db/main").await?;
//! let stmt = conn.prepare("SELECT id, name FROM users WHERE id > ?").await?;
//! let mut cursor = stmt.query(&[RowValues::Int(10)]).await?;
//! while let Some(row) = cursor.next_row().await? {
//!     println!("{:?} {:?}", row.get("id"), row.get("name"));
//! }
//! stmt.close().await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod results;
pub mod statement;
pub mod stream;
pub mod transaction;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use adapter::DriverAdapter;
pub use config::{ProxyConfig, ProxyEndpoint, TransportKind};
pub use connection::ProxyConnection;
pub use cursor::ResultCursor;
pub use driver::{DRIVER_NAME, ProxyDriver, parse_dsn_db_type};
pub use error::DbProxyError;
pub use protocol::Action;
pub use results::{CustomDbRow, ExecOutcome, ResultSet};
pub use statement::ProxyStatement;
pub use stream::RowStream;
pub use transaction::ProxyTransaction;
pub use transport::{CallReply, Connector, ProxyCaller};
pub use types::{DbId, IsolationLevel, RowValues, StmtId, TxId, TxOptions};
