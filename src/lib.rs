//! Request-scoped data access layer for MySQL.
//!
//! Every inbound request gets a [`RequestContext`]. DAOs built from it format
//! SQL text with [`sql`] and run it through a named [`Client`]; inside
//! [`RequestContext::transaction`] every client a DAO touches joins one unit
//! of work that is committed or rolled back together.

pub mod config;
pub mod connection;
pub mod context;
pub mod dao;
pub mod db;
pub mod error;
pub mod models;
pub mod sql;
pub mod transaction;

pub use config::{ClientConfig, Config, PoolOptions};
pub use connection::Connection;
pub use context::RequestContext;
pub use dao::Dao;
pub use db::{Client, Clients, MySqlClient, MySqlTransaction, TransactionHandle};
pub use error::{DaoError, DaoResult};
pub use models::{
    Condition, Direction, Limit, OrderBy, Page, PageOptions, QueryArgs, Row, SelectOptions,
    SqlValue, Where, WriteResult,
};
pub use sql::{Escape, MySqlEscape};
pub use transaction::{ExecutionTarget, TransactionScope};
