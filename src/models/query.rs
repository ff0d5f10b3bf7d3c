//! Structured inputs and outputs of the query builder.
//!
//! The builder is lenient: shapes that cannot be turned into a clause (a
//! nested group under a plain column, an oversized limit slice, a non-object
//! JSON filter) simply produce no clause.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::value::SqlValue;

/// Default page size for `select_page`.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A decoded result row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Values for a query template, tagged with the placeholder dialect.
///
/// A template containing `?` is always formatted with the `?`/`??` dialect,
/// whichever variant is supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryArgs {
    #[default]
    None,
    /// `?` for values and `??` for identifiers, consumed left to right.
    Mixed(Vec<SqlValue>),
    /// `@p0`, `@p1`, ... by index.
    Positional(Vec<SqlValue>),
    /// `{key}` by name.
    Named(IndexMap<String, SqlValue>),
}

impl QueryArgs {
    /// Build `?`/`??` arguments.
    pub fn mixed<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Self::Mixed(values.into_iter().map(Into::into).collect())
    }

    /// Build `@pN` arguments.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Build `{key}` arguments.
    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        Self::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Mixed(v) | Self::Positional(v) => v.is_empty(),
            Self::Named(m) => m.is_empty(),
        }
    }
}

/// One entry of a [`Where`] filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Value(SqlValue),
    /// Nested filter, only meaningful under the `or` / `and` keys.
    Group(Where),
}

/// An ordered filter mapping, key to condition.
///
/// Keys are interpreted when the clause is built:
/// - `or` / `and` hold a nested group;
/// - a key containing `?` is a raw fragment formatted with its value;
/// - any other key is a column compared with `=` (or `in` for a list).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    entries: IndexMap<String, Condition>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column condition. A list value becomes `in (...)`.
    pub fn field(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.entries
            .insert(column.into(), Condition::Value(value.into()));
        self
    }

    /// Add a raw fragment such as `"age > ?"`; a list value supplies several placeholders.
    pub fn raw(self, fragment: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.field(fragment, value)
    }

    /// Nested group joined with `or`.
    pub fn or(mut self, group: Where) -> Self {
        self.entries.insert("or".to_string(), Condition::Group(group));
        self
    }

    /// Nested group joined with `and`.
    pub fn and(mut self, group: Where) -> Self {
        self.entries.insert("and".to_string(), Condition::Group(group));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, condition: Condition) {
        self.entries.insert(key.into(), condition);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a filter from a JSON object. Objects under `or`/`and` become
    /// nested groups; anything that is not an object yields an empty filter.
    pub fn from_json(value: &JsonValue) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let entries = object
            .iter()
            .map(|(key, value)| {
                let condition = match value {
                    JsonValue::Object(_) if key == "or" || key == "and" => {
                        Condition::Group(Self::from_json(value))
                    }
                    other => Condition::Value(other.clone().into()),
                };
                (key.clone(), condition)
            })
            .collect();
        Self { entries }
    }
}

/// Sort direction for one `order by` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// `true` and `"asc"` sort ascending, every other value descending.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Bool(true) => Self::Asc,
            JsonValue::String(s) if s == "asc" => Self::Asc,
            _ => Self::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl From<bool> for Direction {
    fn from(ascending: bool) -> Self {
        if ascending { Self::Asc } else { Self::Desc }
    }
}

/// Ordered `order by` specification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBy {
    columns: IndexMap<String, Direction>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(self, column: impl Into<String>) -> Self {
        self.by(column, Direction::Asc)
    }

    pub fn desc(self, column: impl Into<String>) -> Self {
        self.by(column, Direction::Desc)
    }

    pub fn by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.columns.insert(column.into(), direction);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Direction)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Build from a JSON object; anything else yields no ordering.
    pub fn from_json(value: &JsonValue) -> Self {
        let columns = value
            .as_object()
            .map(|object| {
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), Direction::from_json(v)))
                    .collect()
            })
            .unwrap_or_default();
        Self { columns }
    }
}

/// Row limit of a select.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Limit {
    #[default]
    None,
    Count(u64),
    OffsetCount(u64, u64),
}

impl Limit {
    /// One element is a row count, two are offset and count; other lengths mean no limit.
    pub fn from_slice(values: &[u64]) -> Self {
        match values {
            [count] => Self::Count(*count),
            [offset, count] => Self::OffsetCount(*offset, *count),
            _ => Self::None,
        }
    }

    /// Limit for a 1-based page. Page 0 is treated as page 1.
    pub fn page(page_index: u64, page_size: u64) -> Self {
        let offset = page_index.max(1).saturating_sub(1).saturating_mul(page_size);
        Self::OffsetCount(offset, page_size)
    }
}

impl From<u64> for Limit {
    fn from(count: u64) -> Self {
        Self::Count(count)
    }
}

impl From<(u64, u64)> for Limit {
    fn from((offset, count): (u64, u64)) -> Self {
        Self::OffsetCount(offset, count)
    }
}

/// Options for `select`.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    pub r#where: Where,
    pub order_by: OrderBy,
    pub limit: Limit,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.r#where = filter;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = limit.into();
        self
    }
}

/// Options for `select_page`.
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub r#where: Where,
    pub order_by: OrderBy,
    /// 1-based page number
    pub page_index: u64,
    pub page_size: u64,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            r#where: Where::default(),
            order_by: OrderBy::default(),
            page_index: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.r#where = filter;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn page(mut self, page_index: u64, page_size: u64) -> Self {
        self.page_index = page_index;
        self.page_size = page_size;
        self
    }
}

/// One page of rows plus the total matching the filter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Page {
    pub total: u64,
    pub data: Vec<Row>,
}

/// Outcome of an insert, update or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub rows_affected: u64,
    /// Auto-increment id generated by an insert, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
}
