//! Database clients.
//!
//! - [`Client`] / [`TransactionHandle`]: the driver boundary
//! - [`Clients`]: the process-wide set of named clients
//! - [`MySqlClient`]: the sqlx MySQL implementation
//! - [`types`]: MySQL column to JSON decoding

pub mod client;
pub mod clients;
pub mod mysql;
pub mod types;

pub use client::{Client, TransactionHandle};
pub use clients::Clients;
pub use mysql::{MySqlClient, MySqlTransaction};
pub use types::RowToJson;
