//! Request-scoped context.
//!
//! A [`RequestContext`] is created per inbound request and shared with every
//! DAO built for that request. It owns the single transaction-scope slot;
//! nothing about transactions lives in global or task-local state.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::connection::Connection;
use crate::dao::Dao;
use crate::db::{Client, Clients};
use crate::error::{DaoError, DaoResult};
use crate::transaction::{ExecutionTarget, TransactionScope};

type ScopeSlot<C> = Option<Arc<TransactionScope<C>>>;

pub struct RequestContext<C: Client> {
    clients: Arc<Clients<C>>,
    scope: Mutex<ScopeSlot<C>>,
}

impl<C: Client> RequestContext<C> {
    pub fn new(clients: Arc<Clients<C>>) -> Arc<Self> {
        Arc::new(Self {
            clients,
            scope: Mutex::new(None),
        })
    }

    pub fn clients(&self) -> &Clients<C> {
        &self.clients
    }

    fn slot(&self) -> MutexGuard<'_, ScopeSlot<C>> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a `transaction()` call is in progress.
    pub fn in_transaction(&self) -> bool {
        self.slot().is_some()
    }

    /// The active scope, if any.
    pub fn current_scope(&self) -> Option<Arc<TransactionScope<C>>> {
        self.slot().clone()
    }

    /// Build a DAO bound to this request.
    pub fn dao<D: Dao<C>>(self: &Arc<Self>) -> DaoResult<D> {
        D::new(self)
    }

    /// Run `f` as one unit of work across every client it touches.
    ///
    /// Nested calls join the outer scope. When the outermost `f` succeeds all
    /// participants are committed; when it fails all are rolled back and the
    /// error from `f` is returned, unless a rollback itself failed, in which
    /// case [`DaoError::TransactionRollbackFailed`] carries both messages.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> DaoResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DaoResult<T>>,
    {
        let scope = {
            let mut slot = self.slot();
            if slot.is_some() {
                None
            } else {
                let scope = Arc::new(TransactionScope::new());
                *slot = Some(Arc::clone(&scope));
                Some(scope)
            }
        };

        let Some(scope) = scope else {
            debug!("Joining the active transaction scope");
            return f().await;
        };

        let _clear = ClearScopeOnDrop { ctx: self };

        match f().await {
            Ok(value) => {
                scope.commit_all().await?;
                Ok(value)
            }
            Err(error) => {
                let failures = scope.rollback_all().await;
                if failures.is_empty() {
                    return Err(error);
                }
                let rollback_error = failures
                    .iter()
                    .map(|(client, e)| format!("{}: {}", client, e))
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(DaoError::TransactionRollbackFailed {
                    transaction_error: error.to_string(),
                    rollback_error,
                })
            }
        }
    }

    /// Resolve where a statement for `name` runs right now.
    pub(crate) async fn resolve(
        &self,
        name: Option<&str>,
        client: &Arc<C>,
    ) -> DaoResult<ExecutionTarget<C>> {
        match self.current_scope() {
            None => Ok(ExecutionTarget::Client(Arc::clone(client))),
            Some(scope) => scope.resolve(name, client).await,
        }
    }

    /// A connection bound to this request and the named client.
    pub fn connection(self: &Arc<Self>, name: Option<&str>) -> DaoResult<Connection<C>> {
        Connection::new(Arc::clone(self), name)
    }
}

/// Clears the scope slot when the outermost `transaction()` call ends,
/// including when its future is dropped mid-flight. Dropped transaction
/// handles roll back on their own.
struct ClearScopeOnDrop<'a, C: Client> {
    ctx: &'a RequestContext<C>,
}

impl<C: Client> Drop for ClearScopeOnDrop<'_, C> {
    fn drop(&mut self) {
        self.ctx.slot().take();
    }
}
