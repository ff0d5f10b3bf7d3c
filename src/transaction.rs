//! Transaction coordination for one request.
//!
//! A [`TransactionScope`] tracks one [`ClientTransaction`] per client name.
//! The first statement routed to a client inside the scope begins its
//! transaction; statements racing that first one wait for the same begin.
//! When the scope ends every participant is committed or rolled back
//! together.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::db::{Client, TransactionHandle};
use crate::error::{DaoError, DaoResult, client_label};
use crate::models::{Row, WriteResult};

/// A client's transaction inside a scope.
pub struct ClientTransaction<T> {
    client: Option<String>,
    /// Empty until the begin resolves; concurrent callers await the same init.
    handle: OnceCell<T>,
}

impl<T: TransactionHandle> ClientTransaction<T> {
    fn new(client: Option<&str>) -> Self {
        Self {
            client: client.map(String::from),
            handle: OnceCell::new(),
        }
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    fn handle(&self) -> DaoResult<&T> {
        self.handle.get().ok_or_else(|| {
            DaoError::transaction_state("Transaction was never started", self.client())
        })
    }
}

/// Where a statement runs: the plain client, or its transaction in the current scope.
pub enum ExecutionTarget<C: Client> {
    Client(Arc<C>),
    Transaction(Arc<ClientTransaction<C::Transaction>>),
}

impl<C: Client> ExecutionTarget<C> {
    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    pub async fn fetch(&self, sql: &str) -> DaoResult<Vec<Row>> {
        match self {
            Self::Client(client) => client.fetch(sql).await,
            Self::Transaction(tx) => tx.handle()?.fetch(sql).await,
        }
    }

    pub async fn execute(&self, sql: &str) -> DaoResult<WriteResult> {
        match self {
            Self::Client(client) => client.execute(sql).await,
            Self::Transaction(tx) => tx.handle()?.execute(sql).await,
        }
    }
}

struct ScopeState<T> {
    participants: Vec<Arc<ClientTransaction<T>>>,
    finalized: bool,
}

/// Participants of one `transaction()` call.
pub struct TransactionScope<C: Client> {
    state: Mutex<ScopeState<C::Transaction>>,
}

impl<C: Client> Default for TransactionScope<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Client> TransactionScope<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScopeState {
                participants: Vec::new(),
                finalized: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState<C::Transaction>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered participants.
    pub fn len(&self) -> usize {
        self.lock().participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    /// Find or register the participant for `name`.
    fn participant(&self, name: Option<&str>) -> DaoResult<Arc<ClientTransaction<C::Transaction>>> {
        let mut state = self.lock();
        if state.finalized {
            return Err(DaoError::transaction_state(
                "Transaction scope has already been committed or rolled back",
                name,
            ));
        }
        if let Some(existing) = state.participants.iter().find(|p| p.client() == name) {
            return Ok(Arc::clone(existing));
        }
        let participant = Arc::new(ClientTransaction::new(name));
        state.participants.push(Arc::clone(&participant));
        Ok(participant)
    }

    /// Resolve the transactional target for `client`, beginning its
    /// transaction on first use. A failed begin leaves the participant
    /// unstarted so the next statement retries.
    pub async fn resolve(&self, name: Option<&str>, client: &C) -> DaoResult<ExecutionTarget<C>> {
        let participant = self.participant(name)?;
        participant
            .handle
            .get_or_try_init(|| client.begin_transaction())
            .await?;

        if self.is_finalized() {
            return Err(DaoError::transaction_state(
                "Transaction scope ended while the transaction was starting",
                name,
            ));
        }
        Ok(ExecutionTarget::Transaction(participant))
    }

    /// Mark the scope finalized and take its started participants.
    fn finalize(&self) -> Vec<Arc<ClientTransaction<C::Transaction>>> {
        let mut state = self.lock();
        state.finalized = true;
        std::mem::take(&mut state.participants)
            .into_iter()
            .filter(|p| p.handle.initialized())
            .collect()
    }

    /// Commit every participant concurrently. All commits are attempted;
    /// the failed clients are reported together.
    pub async fn commit_all(&self) -> DaoResult<()> {
        let participants = self.finalize();
        let results = join_all(participants.iter().map(|p| async move {
            let result = match p.handle() {
                Ok(handle) => handle.commit().await,
                Err(e) => Err(e),
            };
            (p.client(), result)
        }))
        .await;

        let mut failed = Vec::new();
        let mut messages = Vec::new();
        for (client, result) in results {
            match result {
                Ok(()) => info!(client = %client_label(client), "Transaction committed"),
                Err(e) => {
                    warn!(client = %client_label(client), error = %e, "Commit failed");
                    failed.push(client_label(client).to_string());
                    messages.push(e.to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(DaoError::CommitFailed {
                clients: failed,
                message: messages.join("; "),
            })
        }
    }

    /// Roll back every participant concurrently and return the failures.
    pub async fn rollback_all(&self) -> Vec<(String, DaoError)> {
        let participants = self.finalize();
        let results = join_all(participants.iter().map(|p| async move {
            let result = match p.handle() {
                Ok(handle) => handle.rollback().await,
                Err(e) => Err(e),
            };
            (p.client(), result)
        }))
        .await;

        let mut failures = Vec::new();
        for (client, result) in results {
            match result {
                Ok(()) => info!(client = %client_label(client), "Transaction rolled back"),
                Err(e) => {
                    warn!(client = %client_label(client), error = %e, "Rollback failed");
                    failures.push((client_label(client).to_string(), e));
                }
            }
        }
        failures
    }
}
