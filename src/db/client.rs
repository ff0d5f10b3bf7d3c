//! Driver boundary.
//!
//! A [`Client`] is one named database connection pool; a
//! [`TransactionHandle`] is a dedicated connection with an open transaction.
//! Both receive fully formatted SQL text.

use std::future::Future;

use crate::error::DaoResult;
use crate::models::{Row, WriteResult};
use crate::sql::Escape;

/// One named database client.
pub trait Client: Escape + Send + Sync + 'static {
    type Transaction: TransactionHandle;

    /// Run a statement and return its rows.
    fn fetch(&self, sql: &str) -> impl Future<Output = DaoResult<Vec<Row>>> + Send;

    /// Run a statement that returns no rows.
    fn execute(&self, sql: &str) -> impl Future<Output = DaoResult<WriteResult>> + Send;

    /// Check out a connection and open a transaction on it.
    fn begin_transaction(&self) -> impl Future<Output = DaoResult<Self::Transaction>> + Send;
}

/// An open transaction on one client.
///
/// `commit` and `rollback` finalize the handle; any later call fails with
/// [`DaoError::TransactionState`](crate::DaoError::TransactionState).
pub trait TransactionHandle: Send + Sync + 'static {
    fn fetch(&self, sql: &str) -> impl Future<Output = DaoResult<Vec<Row>>> + Send;

    fn execute(&self, sql: &str) -> impl Future<Output = DaoResult<WriteResult>> + Send;

    fn commit(&self) -> impl Future<Output = DaoResult<()>> + Send;

    fn rollback(&self) -> impl Future<Output = DaoResult<()>> + Send;
}
