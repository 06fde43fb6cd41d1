//! Placeholder casts from catalog column types.
//!
//! Postgres takes a parameter's type from what sqlx binds, not from the
//! column it is compared to, so a string bound against a uuid column fails
//! with `operator does not exist: uuid = text`. Placeholders whose column
//! type is known are wrapped in an explicit `CAST`.

use intentql_core::{BindCast, BindSpecEntry, Dialect, SqlDialect};
use regex::{Captures, Regex};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)\b").expect("valid regex"));

/// Column name to SQL type name.
type TableColumns = HashMap<String, String>;

/// Column types per table, fetched once per provider.
#[derive(Default)]
pub(crate) struct ColumnTypes {
    tables: Mutex<HashMap<String, TableColumns>>,
}

impl ColumnTypes {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TableColumns>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The cast target of each placeholder, `None` where the column is unknown.
    pub(crate) async fn resolve(
        &self,
        pool: &PgPool,
        bind_spec: &[BindSpecEntry],
    ) -> anyhow::Result<Vec<Option<String>>> {
        let mut tables: Vec<&str> = bind_spec
            .iter()
            .map(|b| b.table.as_str())
            .filter(|t| !t.is_empty())
            .collect();
        tables.sort_unstable();
        tables.dedup();

        for table in tables {
            if self.lock().contains_key(table) {
                continue;
            }
            let columns = fetch_columns(pool, table).await?;
            tracing::debug!(table, columns = columns.len(), "column types loaded");
            self.lock().insert(table.to_string(), columns);
        }

        let tables = self.lock();
        Ok(cast_targets(&tables, bind_spec))
    }
}

async fn fetch_columns(pool: &PgPool, table: &str) -> anyhow::Result<TableColumns> {
    let rows = sqlx::query(
        r#"
        select a.attname::text as column_name,
               format_type(a.atttypid, null) as column_type
        from pg_attribute a
        where a.attrelid = to_regclass($1)
          and a.attnum > 0
          and not a.attisdropped
        "#,
    )
    .bind(Dialect::Postgres.quote_identifier(table))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("column_name"), row.get("column_type")))
        .collect())
}

fn cast_targets(
    tables: &HashMap<String, TableColumns>,
    bind_spec: &[BindSpecEntry],
) -> Vec<Option<String>> {
    bind_spec
        .iter()
        .map(|entry| {
            let ty = tables.get(&entry.table)?.get(&entry.column)?;
            Some(match entry.cast {
                Some(BindCast::Array) => format!("{ty}[]"),
                None => ty.clone(),
            })
        })
        .collect()
}

/// Wrap each `$n` with a known target in `CAST($n AS <type>)`.
pub(crate) fn typed_statement(statement: &str, targets: &[Option<String>]) -> String {
    PLACEHOLDER
        .replace_all(statement, |caps: &Captures<'_>| {
            let target = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| targets.get(i))
                .and_then(Option::as_deref);
            match target {
                Some(ty) => format!("CAST({} AS {})", &caps[0], ty),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
