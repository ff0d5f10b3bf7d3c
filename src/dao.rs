//! Data access object binding.
//!
//! A DAO type picks its client by name and owns one [`Connection`] built for
//! the current request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sql_dao::{
//!     Connection, Dao, DaoResult, MySqlClient, RequestContext, Row, SelectOptions, Where,
//! };
//!
//! struct OrderDao {
//!     connection: Connection<MySqlClient>,
//! }
//!
//! impl Dao<MySqlClient> for OrderDao {
//!     fn client_name(_ctx: &RequestContext<MySqlClient>) -> Option<String> {
//!         Some("orders".to_string())
//!     }
//!
//!     fn from_connection(connection: Connection<MySqlClient>) -> Self {
//!         Self { connection }
//!     }
//!
//!     fn connection(&self) -> &Connection<MySqlClient> {
//!         &self.connection
//!     }
//! }
//!
//! impl OrderDao {
//!     async fn by_user(&self, user_id: i64) -> DaoResult<Vec<Row>> {
//!         let filter = Where::new().field("user_id", user_id);
//!         self.connection
//!             .select(&["id", "total"], "orders", &SelectOptions::new().filter(filter))
//!             .await
//!     }
//! }
//!
//! # async fn handle(ctx: Arc<RequestContext<MySqlClient>>) -> DaoResult<()> {
//! let orders: OrderDao = ctx.dao()?;
//! let _rows = orders.by_user(7).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::connection::Connection;
use crate::context::RequestContext;
use crate::db::Client;
use crate::error::DaoResult;

pub trait Dao<C: Client>: Sized {
    /// Client this DAO type reads and writes; `None` is the primary client.
    fn client_name(_ctx: &RequestContext<C>) -> Option<String> {
        None
    }

    fn from_connection(connection: Connection<C>) -> Self;

    fn connection(&self) -> &Connection<C>;

    /// Build the DAO for `ctx`.
    fn new(ctx: &Arc<RequestContext<C>>) -> DaoResult<Self> {
        let name = Self::client_name(ctx);
        let connection = Connection::new(Arc::clone(ctx), name.as_deref())?;
        Ok(Self::from_connection(connection))
    }
}
