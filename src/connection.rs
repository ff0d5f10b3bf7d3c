//! CRUD builders bound to one request and one named client.
//!
//! A [`Connection`] never holds a transaction itself: every statement asks
//! the [`RequestContext`] where to run, so a DAO used inside
//! `ctx.transaction(..)` joins the request's transaction without knowing it.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::context::RequestContext;
use crate::db::Client;
use crate::error::{DaoError, DaoResult, client_label};
use crate::models::{
    Limit, Page, PageOptions, QueryArgs, Row, SelectOptions, SqlValue, Where, WriteResult,
};
use crate::sql::Escape;
use crate::sql::format::{
    build_limit, build_order_by, build_where, escape_columns, push_clause, query_format,
};

pub struct Connection<C: Client> {
    ctx: Arc<RequestContext<C>>,
    name: Option<String>,
    client: Arc<C>,
}

impl<C: Client> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            name: self.name.clone(),
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: Client> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("client", &client_label(self.client_name()))
            .finish()
    }
}

impl<C: Client> Connection<C> {
    /// Bind to `ctx` and the named client (`None` is the primary client).
    pub fn new(ctx: Arc<RequestContext<C>>, name: Option<&str>) -> DaoResult<Self> {
        let client = ctx.clients().get(name)?;
        Ok(Self {
            ctx,
            name: name.map(String::from),
            client,
        })
    }

    pub fn client_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn context(&self) -> &Arc<RequestContext<C>> {
        &self.ctx
    }

    /// The client's quoting rules.
    pub fn escaper(&self) -> &C {
        &self.client
    }

    /// Format a template with this client's quoting rules.
    pub fn format(&self, sql: &str, args: &QueryArgs) -> String {
        query_format(&*self.client, sql, args)
    }

    /// Format and run a statement that returns rows.
    pub async fn query(&self, sql: &str, args: &QueryArgs) -> DaoResult<Vec<Row>> {
        self.fetch(&self.format(sql, args)).await
    }

    /// Format and run a statement that returns no rows.
    pub async fn execute(&self, sql: &str, args: &QueryArgs) -> DaoResult<WriteResult> {
        self.run(&self.format(sql, args)).await
    }

    async fn fetch(&self, sql: &str) -> DaoResult<Vec<Row>> {
        let target = self.ctx.resolve(self.client_name(), &self.client).await?;
        target.fetch(sql).await
    }

    async fn run(&self, sql: &str) -> DaoResult<WriteResult> {
        let target = self.ctx.resolve(self.client_name(), &self.client).await?;
        target.execute(sql).await
    }

    fn where_sql(&self, filter: &Where) -> String {
        build_where(&*self.client, filter, true)
    }

    /// `select <columns> from <table> [where] [order by] [limit]`.
    /// An empty column list selects `*`.
    pub async fn select<S: AsRef<str>>(
        &self,
        columns: &[S],
        table: &str,
        options: &SelectOptions,
    ) -> DaoResult<Vec<Row>> {
        let sql = self.select_sql(columns, table, &options.r#where, options);
        self.fetch(&sql).await
    }

    fn select_sql<S: AsRef<str>>(
        &self,
        columns: &[S],
        table: &str,
        filter: &Where,
        options: &SelectOptions,
    ) -> String {
        let client = &*self.client;
        let mut sql = format!(
            "select {} from {}",
            escape_columns(client, columns),
            client.escape_id(table)
        );
        push_clause(&mut sql, "where", &self.where_sql(filter));
        push_clause(&mut sql, "", &build_order_by(client, &options.order_by));
        push_clause(&mut sql, "", &build_limit(&options.limit));
        sql
    }

    /// First row matching `filter`, if any.
    pub async fn select_one<S: AsRef<str>>(
        &self,
        columns: &[S],
        table: &str,
        filter: &Where,
    ) -> DaoResult<Option<Row>> {
        let options = SelectOptions::new().limit(1u64);
        let sql = self.select_sql(columns, table, filter, &options);
        Ok(self.fetch(&sql).await?.into_iter().next())
    }

    /// Number of rows matching `filter`.
    pub async fn count(&self, table: &str, filter: &Where) -> DaoResult<u64> {
        let sql = self.count_sql(table, filter);
        let rows = self.fetch(&sql).await?;
        Ok(total_of(&rows))
    }

    fn count_sql(&self, table: &str, filter: &Where) -> String {
        let mut sql = format!(
            "select count(1) as total from {}",
            self.client.escape_id(table)
        );
        push_clause(&mut sql, "where", &self.where_sql(filter));
        sql
    }

    /// One page of rows and the total matching the filter. The count and the
    /// page are queried concurrently with the same filter.
    pub async fn select_page<S: AsRef<str>>(
        &self,
        columns: &[S],
        table: &str,
        options: &PageOptions,
    ) -> DaoResult<Page> {
        let select = SelectOptions {
            r#where: Where::new(),
            order_by: options.order_by.clone(),
            limit: Limit::page(options.page_index, options.page_size),
        };
        let count_sql = self.count_sql(table, &options.r#where);
        let data_sql = self.select_sql(columns, table, &options.r#where, &select);

        let (count_rows, data) = tokio::try_join!(self.fetch(&count_sql), self.fetch(&data_sql))?;

        Ok(Page {
            total: total_of(&count_rows),
            data,
        })
    }

    /// Insert one row from a column to value mapping.
    pub async fn insert(
        &self,
        table: &str,
        values: &IndexMap<String, SqlValue>,
    ) -> DaoResult<WriteResult> {
        if values.is_empty() {
            return Err(DaoError::invalid_input("insert requires at least one column"));
        }
        let client = &*self.client;
        let columns: Vec<String> = values.keys().map(|k| client.escape_id(k)).collect();
        let row: Vec<String> = values.values().map(|v| client.escape_value(v)).collect();
        let sql = format!(
            "insert into {}({}) values ({})",
            client.escape_id(table),
            columns.join(","),
            row.join(",")
        );
        self.run(&sql).await
    }

    /// Insert many rows in one statement. A row missing one of `columns`
    /// gets NULL for it.
    pub async fn batch_insert<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        rows: &[IndexMap<String, SqlValue>],
    ) -> DaoResult<WriteResult> {
        if columns.is_empty() || rows.is_empty() {
            return Err(DaoError::invalid_input(
                "batch insert requires at least one column and one row",
            ));
        }
        let client = &*self.client;
        let column_sql: Vec<String> = columns
            .iter()
            .map(|c| client.escape_id(c.as_ref()))
            .collect();
        let values_sql: Vec<String> = rows
            .iter()
            .map(|row| {
                let values: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        client.escape_value(row.get(c.as_ref()).unwrap_or(&SqlValue::Undefined))
                    })
                    .collect();
                format!("({})", values.join(","))
            })
            .collect();
        let sql = format!(
            "insert into {}({}) values {}",
            client.escape_id(table),
            column_sql.join(","),
            values_sql.join(",")
        );
        self.run(&sql).await
    }

    /// `update <table> set ... [where]`. An empty filter updates every row.
    pub async fn update(
        &self,
        table: &str,
        values: &IndexMap<String, SqlValue>,
        filter: &Where,
    ) -> DaoResult<WriteResult> {
        if values.is_empty() {
            return Err(DaoError::invalid_input("update requires at least one column"));
        }
        let client = &*self.client;
        let assignments: Vec<String> = values
            .iter()
            .map(|(k, v)| format!("{} = {}", client.escape_id(k), client.escape_value(v)))
            .collect();
        let mut sql = format!(
            "update {} set {}",
            client.escape_id(table),
            assignments.join(", ")
        );
        let where_sql = self.where_sql(filter);
        if where_sql.is_empty() {
            warn!(table = %table, "Update without a where clause affects every row");
        }
        push_clause(&mut sql, "where", &where_sql);
        self.run(&sql).await
    }

    /// `delete from <table> [where]`. An empty filter deletes every row.
    pub async fn delete(&self, table: &str, filter: &Where) -> DaoResult<WriteResult> {
        let mut sql = format!("delete from {}", self.client.escape_id(table));
        let where_sql = self.where_sql(filter);
        if where_sql.is_empty() {
            warn!(table = %table, "Delete without a where clause affects every row");
        }
        push_clause(&mut sql, "where", &where_sql);
        self.run(&sql).await
    }
}

/// Read the `total` column of a count query.
fn total_of(rows: &[Row]) -> u64 {
    match rows.first().and_then(|row| row.get("total")) {
        Some(JsonValue::Number(n)) => n.as_u64().unwrap_or(0),
        Some(JsonValue::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
