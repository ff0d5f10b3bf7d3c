//! Data models for the DAO layer.
//!
//! This module re-exports the value and builder types used throughout the crate.

pub mod query;
pub mod value;

pub use query::{
    Condition, DEFAULT_PAGE_SIZE, Direction, Limit, OrderBy, Page, PageOptions, QueryArgs, Row,
    SelectOptions, Where, WriteResult,
};
pub use value::SqlValue;
