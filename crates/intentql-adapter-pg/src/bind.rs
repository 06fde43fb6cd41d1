//! JSON parameter values to Postgres bind arguments.
//!
//! Each value is bound with the Postgres type its JSON shape suggests. The
//! statement casts placeholders to their column types where those are known.

use serde_json::Value;
use sqlx::Arguments;
use sqlx::postgres::PgArguments;

fn args_add<T>(args: &mut PgArguments, v: T) -> anyhow::Result<()>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(v).map_err(|e| anyhow::anyhow!(e))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgBind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    TextArray(Vec<String>),
    Json(Value),
}

impl PgBind {
    pub(crate) fn from_value(v: &Value) -> Self {
        match v {
            Value::Null => PgBind::Null,
            Value::Bool(b) => PgBind::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PgBind::Int(i),
                None => PgBind::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => PgBind::Text(s.clone()),
            Value::Array(items) => array(items),
            Value::Object(_) => PgBind::Json(v.clone()),
        }
    }

    pub(crate) fn add_to(self, args: &mut PgArguments) -> anyhow::Result<()> {
        match self {
            PgBind::Null => args_add(args, Option::<String>::None),
            PgBind::Bool(b) => args_add(args, b),
            PgBind::Int(i) => args_add(args, i),
            PgBind::Float(f) => args_add(args, f),
            PgBind::Text(s) => args_add(args, s),
            PgBind::IntArray(items) => args_add(args, items),
            PgBind::FloatArray(items) => args_add(args, items),
            PgBind::TextArray(items) => args_add(args, items),
            PgBind::Json(v) => args_add(args, sqlx::types::Json(v)),
        }
    }
}

/// Homogeneous scalar arrays bind as Postgres arrays, anything else as JSON.
fn array(items: &[Value]) -> PgBind {
    if let Some(ints) = items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
        return PgBind::IntArray(ints);
    }
    if let Some(floats) = items.iter().map(Value::as_f64).collect::<Option<Vec<_>>>() {
        return PgBind::FloatArray(floats);
    }
    if let Some(texts) = items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
    {
        return PgBind::TextArray(texts);
    }
    PgBind::Json(Value::Array(items.to_vec()))
}

/// Build the argument list for `values`, in placeholder order.
pub(crate) fn arguments(values: &[Value]) -> anyhow::Result<PgArguments> {
    let mut args = PgArguments::default();
    for value in values {
        PgBind::from_value(value).add_to(&mut args)?;
    }
    Ok(args)
}
