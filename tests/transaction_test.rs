//! Request-scoped transaction coordination across named clients.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Log, RecordingClient, clients, context};
use indexmap::IndexMap;
use sql_dao::{
    Clients, Connection, Dao, DaoError, DaoResult, QueryArgs, RequestContext, SelectOptions,
    SqlValue, Where,
};

struct OrderDao {
    connection: Connection<RecordingClient>,
}

impl Dao<RecordingClient> for OrderDao {
    fn client_name(_ctx: &RequestContext<RecordingClient>) -> Option<String> {
        Some("orders".to_string())
    }

    fn from_connection(connection: Connection<RecordingClient>) -> Self {
        Self { connection }
    }

    fn connection(&self) -> &Connection<RecordingClient> {
        &self.connection
    }
}

impl OrderDao {
    async fn create(&self, user_id: i64) -> DaoResult<()> {
        let mut values = IndexMap::new();
        values.insert("user_id".to_string(), SqlValue::from(user_id));
        self.connection.insert("orders", &values).await?;
        Ok(())
    }
}

struct OrderItemDao {
    connection: Connection<RecordingClient>,
}

impl Dao<RecordingClient> for OrderItemDao {
    fn client_name(_ctx: &RequestContext<RecordingClient>) -> Option<String> {
        Some("orders".to_string())
    }

    fn from_connection(connection: Connection<RecordingClient>) -> Self {
        Self { connection }
    }

    fn connection(&self) -> &Connection<RecordingClient> {
        &self.connection
    }
}

/// Uses the primary client.
struct UserDao {
    connection: Connection<RecordingClient>,
}

impl Dao<RecordingClient> for UserDao {
    fn from_connection(connection: Connection<RecordingClient>) -> Self {
        Self { connection }
    }

    fn connection(&self) -> &Connection<RecordingClient> {
        &self.connection
    }
}

fn by_id(id: i64) -> Where {
    Where::new().field("id", id)
}

#[tokio::test]
async fn test_no_transaction_outside_scope() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let orders: OrderDao = ctx.dao().unwrap();

    orders.create(1).await.unwrap();

    assert!(!ctx.in_transaction());
    assert_eq!(
        log.entries(),
        vec!["run:orders:insert into `orders`(`user_id`) values (1)"]
    );
}

#[tokio::test]
async fn test_same_client_shares_one_transaction() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let orders: OrderDao = ctx.dao().unwrap();
    let items: OrderItemDao = ctx.dao().unwrap();

    let value = ctx
        .transaction(|| async {
            orders.create(1).await?;
            items
                .connection()
                .delete("order_items", &Where::new().field("order_id", 1))
                .await?;
            Ok(42)
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(
        log.entries(),
        vec![
            "begin:orders",
            "tx:orders:insert into `orders`(`user_id`) values (1)",
            "tx:orders:delete from `order_items` where `order_id`=1",
            "commit:orders",
        ]
    );
    assert!(!ctx.in_transaction());
}

#[tokio::test]
async fn test_different_clients_get_separate_transactions() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let orders: OrderDao = ctx.dao().unwrap();
    let users: UserDao = ctx.dao().unwrap();

    ctx.transaction(|| async {
        orders.create(1).await?;
        users.connection().delete("users", &by_id(1)).await?;
        orders.create(2).await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(log.count("begin:orders"), 1);
    assert_eq!(log.count("begin:primary"), 1);
    assert_eq!(log.count("commit:orders"), 1);
    assert_eq!(log.count("commit:primary"), 1);
    assert_eq!(log.count("begin:billing"), 0);
    assert!(log.entries().iter().all(|e| !e.starts_with("run:")));
}

#[tokio::test]
async fn test_untouched_clients_are_not_started() {
    let log = Log::default();
    let ctx = context(clients(&log));

    ctx.transaction(|| async { Ok(()) }).await.unwrap();

    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_failure_rolls_back_every_participant_once() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let orders: OrderDao = ctx.dao().unwrap();
    let users: UserDao = ctx.dao().unwrap();

    let err = ctx
        .transaction(|| async {
            orders.create(1).await?;
            users.connection().delete("users", &by_id(1)).await?;
            Err::<(), _>(DaoError::invalid_input("stock exhausted"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DaoError::InvalidInput { ref message } if message == "stock exhausted"));
    assert_eq!(log.count("rollback:orders"), 1);
    assert_eq!(log.count("rollback:primary"), 1);
    assert!(log.entries().iter().all(|e| !e.starts_with("commit:")));
    assert!(!ctx.in_transaction());
}

#[tokio::test]
async fn test_nested_transaction_joins_outer_scope() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let orders: OrderDao = ctx.dao().unwrap();

    ctx.transaction(|| async {
        orders.create(1).await?;
        ctx.transaction(|| async {
            orders.create(2).await?;
            assert!(ctx.in_transaction());
            Ok(())
        })
        .await?;
        orders.create(3).await
    })
    .await
    .unwrap();

    assert_eq!(log.count("begin:orders"), 1);
    assert_eq!(log.count("commit:orders"), 1);
    assert_eq!(log.entries().last().map(String::as_str), Some("commit:orders"));
}

#[tokio::test]
async fn test_nested_failure_rolls_back_outer_scope() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let orders: OrderDao = ctx.dao().unwrap();

    let result = ctx
        .transaction(|| async {
            orders.create(1).await?;
            ctx.transaction(|| async {
                orders.create(2).await?;
                Err::<(), _>(DaoError::internal("inner failed"))
            })
            .await
        })
        .await;

    assert!(matches!(result, Err(DaoError::Internal { .. })));
    assert_eq!(log.count("begin:orders"), 1);
    assert_eq!(log.count("rollback:orders"), 1);
    assert_eq!(log.count("commit:orders"), 0);
}

#[tokio::test]
async fn test_concurrent_first_statements_begin_once() {
    let log = Log::default();
    let clients = Clients::new().with(
        Some("orders"),
        RecordingClient::new("orders", &log).begin_delay(Duration::from_millis(20)),
    );
    let ctx = context(clients);
    let orders: OrderDao = ctx.dao().unwrap();
    let items: OrderItemDao = ctx.dao().unwrap();

    ctx.transaction(|| async {
        let options = SelectOptions::new();
        let where_all = Where::new();
        tokio::try_join!(
            orders.connection().select::<&str>(&[], "orders", &options),
            items.connection().select::<&str>(&[], "order_items", &options),
            orders.connection().count("orders", &where_all),
        )?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(log.count("begin:orders"), 1);
    assert_eq!(log.count("commit:orders"), 1);
    assert_eq!(
        log.entries()
            .iter()
            .filter(|e| e.starts_with("tx:orders:"))
            .count(),
        3
    );
}

#[tokio::test]
async fn test_commit_failure_reports_clients() {
    let log = Log::default();
    let clients = Clients::new()
        .with(None, RecordingClient::new("primary", &log))
        .with(
            Some("orders"),
            RecordingClient::new("orders", &log).failing_commit(),
        );
    let ctx = context(clients);
    let orders: OrderDao = ctx.dao().unwrap();
    let users: UserDao = ctx.dao().unwrap();

    let err = ctx
        .transaction(|| async {
            orders.create(1).await?;
            users.connection().delete("users", &by_id(1)).await?;
            Ok(())
        })
        .await
        .unwrap_err();

    match err {
        DaoError::CommitFailed { clients, .. } => assert_eq!(clients, vec!["orders"]),
        other => panic!("expected CommitFailed, got {other:?}"),
    }
    // Every participant is still attempted.
    assert_eq!(log.count("commit:primary"), 1);
    assert_eq!(log.count("commit:orders"), 1);
}

#[tokio::test]
async fn test_rollback_failure_keeps_both_errors() {
    let log = Log::default();
    let clients = Clients::new().with(
        Some("orders"),
        RecordingClient::new("orders", &log).failing_rollback(),
    );
    let ctx = context(clients);
    let orders: OrderDao = ctx.dao().unwrap();

    let err = ctx
        .transaction(|| async {
            orders.create(1).await?;
            Err::<(), _>(DaoError::invalid_input("bad order"))
        })
        .await
        .unwrap_err();

    match err {
        DaoError::TransactionRollbackFailed {
            transaction_error,
            rollback_error,
        } => {
            assert!(transaction_error.contains("bad order"));
            assert!(rollback_error.contains("orders"));
            assert!(rollback_error.contains("connection lost"));
        }
        other => panic!("expected TransactionRollbackFailed, got {other:?}"),
    }
    assert!(!ctx.in_transaction());
}

#[tokio::test]
async fn test_failed_begin_surfaces_and_rolls_back_others() {
    let log = Log::default();
    let clients = Clients::new()
        .with(None, RecordingClient::new("primary", &log))
        .with(
            Some("orders"),
            RecordingClient::new("orders", &log).failing_begin(),
        );
    let ctx = context(clients);
    let orders: OrderDao = ctx.dao().unwrap();
    let users: UserDao = ctx.dao().unwrap();

    let err = ctx
        .transaction(|| async {
            users.connection().delete("users", &by_id(1)).await?;
            orders.create(1).await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DaoError::Connection { .. }));
    assert_eq!(log.count("rollback:primary"), 1);
    assert_eq!(log.count("rollback:orders"), 0);
}

#[tokio::test]
async fn test_scope_is_cleared_after_each_call() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let orders: OrderDao = ctx.dao().unwrap();

    ctx.transaction(|| async { orders.create(1).await })
        .await
        .unwrap();
    let _ = ctx
        .transaction(|| async {
            orders.create(2).await?;
            Err::<(), _>(DaoError::internal("boom"))
        })
        .await;
    orders.create(3).await.unwrap();

    assert_eq!(log.count("begin:orders"), 2);
    assert_eq!(
        log.entries().last().map(String::as_str),
        Some("run:orders:insert into `orders`(`user_id`) values (3)")
    );
    assert!(ctx.current_scope().is_none());
}

#[tokio::test]
async fn test_requests_do_not_share_scopes() {
    let log = Log::default();
    let shared = Arc::new(clients(&log));
    let first = RequestContext::new(Arc::clone(&shared));
    let second = RequestContext::new(Arc::clone(&shared));
    let first_orders: OrderDao = first.dao().unwrap();
    let second_orders: OrderDao = second.dao().unwrap();

    first
        .transaction(|| async {
            second_orders.create(2).await?;
            first_orders.create(1).await
        })
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "run:orders:insert into `orders`(`user_id`) values (2)",
            "begin:orders",
            "tx:orders:insert into `orders`(`user_id`) values (1)",
            "commit:orders",
        ]
    );
}

#[tokio::test]
async fn test_statements_after_scope_ends_use_the_client() {
    let log = Log::default();
    let ctx = context(clients(&log));
    let users: UserDao = ctx.dao().unwrap();

    ctx.transaction(|| async {
        users
            .connection()
            .execute("update users set seen = ?", &QueryArgs::mixed([true]))
            .await
    })
    .await
    .unwrap();
    users
        .connection()
        .execute("update users set seen = ?", &QueryArgs::mixed([false]))
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "begin:primary",
            "tx:primary:update users set seen = true",
            "commit:primary",
            "run:primary:update users set seen = false",
        ]
    );
}
