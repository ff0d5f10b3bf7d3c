//! SQL text generation from templates and structured clauses.
//!
//! Pure functions, no I/O. Each takes the client's [`Escape`] rules so that
//! every embedded identifier and literal is quoted the driver's way.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::escape::Escape;
use crate::models::{Condition, Limit, OrderBy, QueryArgs, SqlValue, Where};

static UNDEFINED: SqlValue = SqlValue::Undefined;

static POSITIONAL_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@p(\d+)").expect("valid regex"));

static NAMED_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Substitute placeholders in `template`.
///
/// With no values the template is returned unchanged. A template containing
/// `?` is formatted with the `?`/`??` dialect, otherwise `@pN` is used for
/// sequences and `{key}` for named values.
pub fn query_format<E: Escape + ?Sized>(escape: &E, template: &str, args: &QueryArgs) -> String {
    if args.is_empty() {
        return template.to_string();
    }

    if template.contains('?') {
        return match args {
            QueryArgs::Named(map) => {
                let values: Vec<SqlValue> = map.values().cloned().collect();
                format_question_marks(escape, template, &values)
            }
            QueryArgs::Mixed(values) | QueryArgs::Positional(values) => {
                format_question_marks(escape, template, values)
            }
            QueryArgs::None => template.to_string(),
        };
    }

    match args {
        QueryArgs::Mixed(values) | QueryArgs::Positional(values) => POSITIONAL_PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let value = caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| values.get(idx));
                escape.escape_value(value.unwrap_or(&UNDEFINED))
            })
            .into_owned(),
        QueryArgs::Named(map) => NAMED_PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                escape.escape_value(map.get(&caps[1]).unwrap_or(&UNDEFINED))
            })
            .into_owned(),
        QueryArgs::None => template.to_string(),
    }
}

/// `??` takes an identifier and `?` a value, sharing one left-to-right index.
fn format_question_marks<E: Escape + ?Sized>(
    escape: &E,
    template: &str,
    values: &[SqlValue],
) -> String {
    let mut values = values.iter();
    let mut next = || values.next().unwrap_or(&UNDEFINED);
    let mut sql = String::with_capacity(template.len());

    let id_parts: Vec<&str> = template.split("??").collect();
    for (i, id_part) in id_parts.iter().enumerate() {
        let value_parts: Vec<&str> = id_part.split('?').collect();
        for (j, value_part) in value_parts.iter().enumerate() {
            sql.push_str(value_part);
            if j + 1 < value_parts.len() {
                sql.push_str(&escape.escape_value(next()));
            }
        }
        if i + 1 < id_parts.len() {
            sql.push_str(&escape.escape_id_value(next()));
        }
    }
    sql
}

/// Build a boolean expression from a filter, joined with `and` or `or`.
///
/// Returns an empty string when nothing survives, so the caller can leave
/// out the `where` keyword.
pub fn build_where<E: Escape + ?Sized>(escape: &E, filter: &Where, and: bool) -> String {
    let mut fragments = Vec::with_capacity(filter.len());

    for (key, condition) in filter.iter() {
        match (key, condition) {
            ("or" | "and", Condition::Group(group)) => {
                let nested = build_where(escape, group, key == "and");
                if !nested.is_empty() {
                    fragments.push(format!("({})", nested));
                }
            }
            // Malformed: groups belong under or/and, and or/and need a group.
            (_, Condition::Group(_)) | ("or" | "and", _) => {}
            (_, Condition::Value(value)) if value.is_undefined() => {}
            (_, Condition::Value(value)) if key.contains('?') => {
                let values = match value {
                    SqlValue::List(items) => items.clone(),
                    other => vec![other.clone()],
                };
                fragments.push(query_format(escape, key, &QueryArgs::Mixed(values)));
            }
            (_, Condition::Value(SqlValue::List(items))) if items.is_empty() => {
                fragments.push(format!("{} in (NULL)", escape.escape_id(key)));
            }
            (_, Condition::Value(value @ SqlValue::List(_))) => {
                fragments.push(format!(
                    "{} in ({})",
                    escape.escape_id(key),
                    escape.escape_value(value)
                ));
            }
            (_, Condition::Value(value)) => {
                fragments.push(format!(
                    "{}={}",
                    escape.escape_id(key),
                    escape.escape_value(value)
                ));
            }
        }
    }

    fragments.join(if and { " and " } else { " or " })
}

/// Build an `order by` clause, or an empty string.
pub fn build_order_by<E: Escape + ?Sized>(escape: &E, order_by: &OrderBy) -> String {
    if order_by.is_empty() {
        return String::new();
    }
    let columns: Vec<String> = order_by
        .iter()
        .map(|(column, direction)| format!("{} {}", escape.escape_id(column), direction.as_sql()))
        .collect();
    format!("order by {}", columns.join(","))
}

/// Build a `limit` clause, or an empty string.
pub fn build_limit(limit: &Limit) -> String {
    match limit {
        Limit::None => String::new(),
        Limit::Count(count) => format!("limit {}", count),
        Limit::OffsetCount(offset, count) => format!("limit {},{}", offset, count),
    }
}

/// Quote a column list; an empty list selects every column.
pub fn escape_columns<E, S>(escape: &E, columns: &[S]) -> String
where
    E: Escape + ?Sized,
    S: AsRef<str>,
{
    if columns.is_empty() {
        return "*".to_string();
    }
    columns
        .iter()
        .map(|column| escape.escape_id(column.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Append ` <keyword> <fragment>` when the fragment is not empty.
pub(crate) fn push_clause(sql: &mut String, keyword: &str, fragment: &str) {
    if fragment.is_empty() {
        return;
    }
    sql.push(' ');
    if !keyword.is_empty() {
        sql.push_str(keyword);
        sql.push(' ');
    }
    sql.push_str(fragment);
}
