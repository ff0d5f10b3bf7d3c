//! SQL formatter.
//!
//! - Identifier and literal quoting (`escape`)
//! - Template placeholders and where/order/limit clause building (`format`)

pub mod escape;
pub mod format;

pub use escape::{Escape, MySqlEscape, escape_id, escape_value};
pub use format::{build_limit, build_order_by, build_where, escape_columns, query_format};
