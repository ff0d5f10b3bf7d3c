//! In-memory client that records every statement and transaction event.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use sql_dao::{
    Client, Clients, DaoError, DaoResult, Escape, RequestContext, Row, TransactionHandle,
    WriteResult,
};

/// Total returned for every `select count(1)` statement.
pub const COUNT_TOTAL: u64 = 25;

/// Shared, ordered event log. Entries look like `begin:orders`,
/// `tx:orders:<sql>` or `run:primary:<sql>`.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    /// SQL text of every statement, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.entries()
            .iter()
            .filter_map(|e| {
                let (kind, rest) = e.split_once(':')?;
                if kind != "tx" && kind != "run" {
                    return None;
                }
                rest.split_once(':').map(|(_, sql)| sql.to_string())
            })
            .collect()
    }

    pub fn last_statement(&self) -> String {
        self.statements().pop().unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone)]
struct Behavior {
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
    begin_delay: Option<Duration>,
    rows: Vec<Row>,
}

pub struct RecordingClient {
    name: String,
    log: Log,
    behavior: Arc<Behavior>,
}

impl RecordingClient {
    pub fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            behavior: Arc::new(Behavior::default()),
        }
    }

    fn configure(mut self, f: impl FnOnce(&mut Behavior)) -> Self {
        f(Arc::make_mut(&mut self.behavior));
        self
    }

    pub fn failing_begin(self) -> Self {
        self.configure(|b| b.fail_begin = true)
    }

    pub fn failing_commit(self) -> Self {
        self.configure(|b| b.fail_commit = true)
    }

    pub fn failing_rollback(self) -> Self {
        self.configure(|b| b.fail_rollback = true)
    }

    pub fn begin_delay(self, delay: Duration) -> Self {
        self.configure(|b| b.begin_delay = Some(delay))
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.configure(|b| b.rows = rows)
    }
}

fn canned_rows(behavior: &Behavior, sql: &str) -> Vec<Row> {
    if sql.starts_with("select count(1)") {
        let row = json!({ "total": COUNT_TOTAL });
        return vec![row.as_object().cloned().unwrap()];
    }
    behavior.rows.clone()
}

fn write_result(sql: &str) -> WriteResult {
    WriteResult {
        rows_affected: 1,
        last_insert_id: sql.starts_with("insert").then_some(1),
    }
}

impl Escape for RecordingClient {}

impl Client for RecordingClient {
    type Transaction = RecordingTransaction;

    async fn fetch(&self, sql: &str) -> DaoResult<Vec<Row>> {
        self.log.record(format!("run:{}:{}", self.name, sql));
        Ok(canned_rows(&self.behavior, sql))
    }

    async fn execute(&self, sql: &str) -> DaoResult<WriteResult> {
        self.log.record(format!("run:{}:{}", self.name, sql));
        Ok(write_result(sql))
    }

    async fn begin_transaction(&self) -> DaoResult<RecordingTransaction> {
        if let Some(delay) = self.behavior.begin_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_begin {
            self.log.record(format!("begin-failed:{}", self.name));
            return Err(DaoError::connection("pool exhausted", "retry later"));
        }
        self.log.record(format!("begin:{}", self.name));
        Ok(RecordingTransaction {
            name: self.name.clone(),
            log: self.log.clone(),
            behavior: Arc::clone(&self.behavior),
            finished: AtomicBool::new(false),
        })
    }
}

pub struct RecordingTransaction {
    name: String,
    log: Log,
    behavior: Arc<Behavior>,
    finished: AtomicBool,
}

impl RecordingTransaction {
    fn check_open(&self) -> DaoResult<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(DaoError::transaction_state(
                "Transaction already finished",
                Some(self.name.as_str()),
            ));
        }
        Ok(())
    }
}

impl TransactionHandle for RecordingTransaction {
    async fn fetch(&self, sql: &str) -> DaoResult<Vec<Row>> {
        self.check_open()?;
        self.log.record(format!("tx:{}:{}", self.name, sql));
        Ok(canned_rows(&self.behavior, sql))
    }

    async fn execute(&self, sql: &str) -> DaoResult<WriteResult> {
        self.check_open()?;
        self.log.record(format!("tx:{}:{}", self.name, sql));
        Ok(write_result(sql))
    }

    async fn commit(&self) -> DaoResult<()> {
        self.check_open()?;
        self.finished.store(true, Ordering::SeqCst);
        self.log.record(format!("commit:{}", self.name));
        if self.behavior.fail_commit {
            return Err(DaoError::database("Deadlock found", Some("40001".into())));
        }
        Ok(())
    }

    async fn rollback(&self) -> DaoResult<()> {
        self.check_open()?;
        self.finished.store(true, Ordering::SeqCst);
        self.log.record(format!("rollback:{}", self.name));
        if self.behavior.fail_rollback {
            return Err(DaoError::connection("connection lost", "reconnect"));
        }
        Ok(())
    }
}

/// A primary client plus `orders` and `billing` named clients.
pub fn clients(log: &Log) -> Clients<RecordingClient> {
    Clients::new()
        .with(None, RecordingClient::new("primary", log))
        .with(Some("orders"), RecordingClient::new("orders", log))
        .with(Some("billing"), RecordingClient::new("billing", log))
}

pub fn context(clients: Clients<RecordingClient>) -> Arc<RequestContext<RecordingClient>> {
    RequestContext::new(Arc::new(clients))
}

pub fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}
