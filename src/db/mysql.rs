//! MySQL client backed by a sqlx pool.
//!
//! Statements arrive fully formatted, so they are sent over the text
//! protocol without prepared-statement arguments. Every statement is bounded
//! by the client's query timeout.

use std::str::FromStr;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlQueryResult};
use sqlx::{MySql, MySqlPool, Transaction};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use super::client::{Client, TransactionHandle};
use super::types::RowToJson;
use crate::config::ClientConfig;
use crate::error::{DaoError, DaoResult, client_label};
use crate::models::{Row, WriteResult};
use crate::sql::Escape;

/// A named MySQL client.
#[derive(Debug, Clone)]
pub struct MySqlClient {
    name: Option<String>,
    pool: MySqlPool,
    query_timeout: Duration,
}

impl MySqlClient {
    /// Wrap an existing pool.
    pub fn from_pool(name: Option<String>, pool: MySqlPool, query_timeout: Duration) -> Self {
        Self {
            name,
            pool,
            query_timeout,
        }
    }

    /// Create the pool described by `config`.
    pub async fn connect(
        config: &ClientConfig,
        connect_timeout: Duration,
        query_timeout: Duration,
    ) -> DaoResult<Self> {
        let options = &config.pool_options;
        let connect_options = MySqlConnectOptions::from_str(&config.connection_string)
            .map_err(|e| DaoError::connection(e.to_string(), "Check the connection URL"))?;

        info!(
            client = %client_label(config.name.as_deref()),
            max_connections = options.max_connections_or_default(),
            "Connecting to database"
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(options.max_connections_or_default())
            .min_connections(options.min_connections_or_default())
            .idle_timeout(Duration::from_secs(options.idle_timeout_or_default()))
            .acquire_timeout(Duration::from_secs(options.acquire_timeout_or_default()))
            .test_before_acquire(options.test_before_acquire_or_default())
            .connect_with(connect_options);

        let pool = match timeout(connect_timeout, pool).await {
            Ok(result) => result.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("connect", connect_timeout)),
        };

        Ok(Self::from_pool(config.name.clone(), pool, query_timeout))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Escape for MySqlClient {}

impl Client for MySqlClient {
    type Transaction = MySqlTransaction;

    async fn fetch(&self, sql: &str) -> DaoResult<Vec<Row>> {
        debug!(client = %client_label(self.name()), sql = %sql, "Executing query");
        fetch_rows(&self.pool, sql, self.query_timeout).await
    }

    async fn execute(&self, sql: &str) -> DaoResult<WriteResult> {
        debug!(client = %client_label(self.name()), sql = %sql, "Executing write");
        execute_write(&self.pool, sql, self.query_timeout).await
    }

    async fn begin_transaction(&self) -> DaoResult<MySqlTransaction> {
        let tx = match timeout(self.query_timeout, self.pool.begin()).await {
            Ok(result) => result.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("begin transaction", self.query_timeout)),
        };
        info!(client = %client_label(self.name()), "Transaction started");
        Ok(MySqlTransaction {
            name: self.name.clone(),
            transaction: Mutex::new(Some(tx)),
            query_timeout: self.query_timeout,
        })
    }
}

/// A transaction holding one pooled MySQL connection.
///
/// Statements issued concurrently are serialized on the connection.
pub struct MySqlTransaction {
    name: Option<String>,
    transaction: Mutex<Option<Transaction<'static, MySql>>>,
    query_timeout: Duration,
}

impl MySqlTransaction {
    fn finalized(&self) -> DaoError {
        DaoError::transaction_state("Transaction is no longer active", self.name.as_deref())
    }
}

impl TransactionHandle for MySqlTransaction {
    async fn fetch(&self, sql: &str) -> DaoResult<Vec<Row>> {
        let mut guard = self.transaction.lock().await;
        let tx = guard.as_mut().ok_or_else(|| self.finalized())?;
        debug!(
            client = %client_label(self.name.as_deref()),
            sql = %sql,
            "Executing query in transaction"
        );
        fetch_rows(&mut **tx, sql, self.query_timeout).await
    }

    async fn execute(&self, sql: &str) -> DaoResult<WriteResult> {
        let mut guard = self.transaction.lock().await;
        let tx = guard.as_mut().ok_or_else(|| self.finalized())?;
        debug!(
            client = %client_label(self.name.as_deref()),
            sql = %sql,
            "Executing write in transaction"
        );
        execute_write(&mut **tx, sql, self.query_timeout).await
    }

    async fn commit(&self) -> DaoResult<()> {
        let tx = self
            .transaction
            .lock()
            .await
            .take()
            .ok_or_else(|| self.finalized())?;
        tx.commit().await.map_err(DaoError::from)
    }

    async fn rollback(&self) -> DaoResult<()> {
        let tx = self
            .transaction
            .lock()
            .await
            .take()
            .ok_or_else(|| self.finalized())?;
        tx.rollback().await.map_err(DaoError::from)
    }
}

async fn fetch_rows<'c, E>(executor: E, sql: &str, query_timeout: Duration) -> DaoResult<Vec<Row>>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    match timeout(query_timeout, executor.fetch_all(sql)).await {
        Ok(Ok(rows)) => Ok(rows.iter().map(RowToJson::to_json_map).collect()),
        Ok(Err(e)) => Err(DaoError::from(e)),
        Err(_) => Err(timeout_error("query execution", query_timeout)),
    }
}

async fn execute_write<'c, E>(
    executor: E,
    sql: &str,
    query_timeout: Duration,
) -> DaoResult<WriteResult>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    match timeout(query_timeout, executor.execute(sql)).await {
        Ok(Ok(result)) => Ok(write_result(&result)),
        Ok(Err(e)) => Err(DaoError::from(e)),
        Err(_) => Err(timeout_error("write operation", query_timeout)),
    }
}

fn write_result(result: &MySqlQueryResult) -> WriteResult {
    let last_insert_id = result.last_insert_id();
    WriteResult {
        rows_affected: result.rows_affected(),
        last_insert_id: (last_insert_id != 0).then_some(last_insert_id),
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DaoError {
    DaoError::timeout(operation, timeout.as_secs())
}
