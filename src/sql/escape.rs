//! Identifier and literal quoting.
//!
//! This is the only injection defense in the crate: every identifier and
//! every caller-supplied literal goes through [`Escape`] before it is
//! concatenated into SQL text. The provided methods follow MySQL quoting
//! rules; a client for another dialect overrides them.

use crate::models::SqlValue;

/// Quoting rules of a database client.
pub trait Escape {
    /// Quote a table or column name.
    fn escape_id(&self, name: &str) -> String {
        escape_id(name)
    }

    /// Render a literal value.
    fn escape_value(&self, value: &SqlValue) -> String {
        escape_value(value)
    }

    /// Quote a value supplied for an identifier placeholder (`??`).
    /// A list becomes a comma separated identifier list.
    fn escape_id_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::List(items) => items
                .iter()
                .map(|item| self.escape_id_value(item))
                .collect::<Vec<_>>()
                .join(", "),
            SqlValue::String(s) => self.escape_id(s),
            SqlValue::Int(i) => self.escape_id(&i.to_string()),
            SqlValue::UInt(u) => self.escape_id(&u.to_string()),
            _ => self.escape_id(""),
        }
    }
}

/// MySQL quoting rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlEscape;

impl Escape for MySqlEscape {}

/// Quote a MySQL identifier: backticks, embedded backticks doubled, each
/// dotted part quoted separately. `*` is left bare so `t.*` stays valid.
pub fn escape_id(name: &str) -> String {
    name.split('.')
        .map(|part| {
            if part == "*" {
                part.to_string()
            } else {
                format!("`{}`", part.replace('`', "``"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a MySQL literal.
pub fn escape_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Undefined | SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::UInt(u) => u.to_string(),
        SqlValue::Float(f) if f.is_finite() => f.to_string(),
        SqlValue::Float(_) => "NULL".to_string(),
        SqlValue::String(s) => escape_string(s),
        SqlValue::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("X'{}'", hex)
        }
        SqlValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
        SqlValue::List(items) => items
            .iter()
            .map(|item| match item {
                SqlValue::List(_) => format!("({})", escape_value(item)),
                _ => escape_value(item),
            })
            .collect::<Vec<_>>()
            .join(","),
        SqlValue::Map(map) => map
            .iter()
            .map(|(k, v)| format!("{} = {}", escape_id(k), escape_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Single-quote a string, backslash-escaping the characters MySQL treats specially.
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use indexmap::IndexMap;

    #[test]
    fn test_escape_id() {
        assert_eq!(escape_id("users"), "`users`");
        assert_eq!(escape_id("u.name"), "`u`.`name`");
        assert_eq!(escape_id("we`ird"), "`we``ird`");
        assert_eq!(escape_id("*"), "*");
        assert_eq!(escape_id("u.*"), "`u`.*");
    }

    #[test]
    fn test_escape_id_cannot_break_out() {
        let escaped = escape_id("name` from secrets; --");
        assert_eq!(escaped, "`name`` from secrets; --`");
    }

    #[test]
    fn test_escape_scalars() {
        assert_eq!(escape_value(&SqlValue::Null), "NULL");
        assert_eq!(escape_value(&SqlValue::Undefined), "NULL");
        assert_eq!(escape_value(&true.into()), "true");
        assert_eq!(escape_value(&42.into()), "42");
        assert_eq!(escape_value(&1.5.into()), "1.5");
        assert_eq!(escape_value(&f64::NAN.into()), "NULL");
        assert_eq!(escape_value(&"bob".into()), "'bob'");
    }

    #[test]
    fn test_escape_string_injection_probe() {
        let escaped = escape_value(&"'; DROP TABLE x; --".into());
        assert_eq!(escaped, "'\\'; DROP TABLE x; --'");
        // Every quote inside the literal is preceded by a backslash.
        let inner = &escaped[1..escaped.len() - 1];
        for (i, c) in inner.char_indices() {
            if c == '\'' {
                assert_eq!(&inner[i - 1..i], "\\");
            }
        }
    }

    #[test]
    fn test_escape_string_control_chars() {
        assert_eq!(
            escape_value(&"a\nb\tc\\d\0\u{1a}\"".into()),
            "'a\\nb\\tc\\\\d\\0\\Z\\\"'"
        );
    }

    #[test]
    fn test_escape_bytes_and_datetime() {
        assert_eq!(escape_value(&SqlValue::Bytes(vec![0x01, 0xab])), "X'01ab'");
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(8, 5, 1, 20)
            .unwrap();
        assert_eq!(escape_value(&dt.into()), "'2024-03-09 08:05:01.020'");
    }

    #[test]
    fn test_escape_lists() {
        assert_eq!(escape_value(&vec![2, 3].into()), "2,3");
        let nested = SqlValue::List(vec![vec![1, 2].into(), vec![3, 4].into()]);
        assert_eq!(escape_value(&nested), "(1,2),(3,4)");
    }

    #[test]
    fn test_escape_map() {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), SqlValue::from("x"));
        map.insert("age".to_string(), SqlValue::from(3));
        assert_eq!(escape_value(&map.into()), "`name` = 'x', `age` = 3");
    }

    #[test]
    fn test_escape_id_value() {
        let e = MySqlEscape;
        assert_eq!(e.escape_id_value(&"users".into()), "`users`");
        assert_eq!(
            e.escape_id_value(&vec!["id", "name"].into()),
            "`id`, `name`"
        );
    }
}
