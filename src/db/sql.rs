//! Parameterized PostgreSQL statements for buffered write operations.

use super::types::{DbOperation, DbValue, WhereClause};

/// A statement with `$n` placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<DbValue>,
}

impl From<&DbOperation> for Statement {
    fn from(op: &DbOperation) -> Self {
        match op {
            DbOperation::Upsert {
                table,
                columns,
                values,
                conflict_columns,
                update_columns,
            } => upsert(table, columns, values, conflict_columns, update_columns),
            DbOperation::Insert {
                table,
                columns,
                values,
            } => insert(table, columns, values),
            DbOperation::Update {
                table,
                set_columns,
                where_clause,
            } => update(table, set_columns, where_clause),
            DbOperation::Delete {
                table,
                where_clause,
            } => delete(table, where_clause),
            DbOperation::RawSql { query, params } => Statement {
                sql: query.clone(),
                params: params.clone(),
            },
        }
    }
}

/// Placeholder for the value at `idx`. Timestamps are sent as seconds and
/// numerics as text, so both need a cast on the server side.
fn placeholder_for(value: &DbValue, idx: usize) -> String {
    match value {
        DbValue::Timestamp(_) => format!("to_timestamp(${})", idx),
        DbValue::Numeric(_) => format!("${}::text::numeric", idx),
        _ => format!("${}", idx),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_cols(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(values: &[DbValue]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| placeholder_for(v, i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert(table: &str, columns: &[String], values: &[DbValue]) -> Statement {
    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            quote_cols(columns),
            placeholders(values)
        ),
        params: values.to_vec(),
    }
}

fn upsert(
    table: &str,
    columns: &[String],
    values: &[DbValue],
    conflict_columns: &[String],
    update_columns: &[String],
) -> Statement {
    let on_conflict = if update_columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let updates = update_columns
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("DO UPDATE SET {}", updates)
    };

    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            table,
            quote_cols(columns),
            placeholders(values),
            quote_cols(conflict_columns),
            on_conflict
        ),
        params: values.to_vec(),
    }
}

fn update(table: &str, set_columns: &[(String, DbValue)], where_clause: &WhereClause) -> Statement {
    let mut params = Vec::new();

    let sets = set_columns
        .iter()
        .map(|(col, val)| {
            params.push(val.clone());
            format!("{} = {}", quote_ident(col), placeholder_for(val, params.len()))
        })
        .collect::<Vec<_>>()
        .join(", ");

    let condition = where_sql(where_clause, &mut params);

    Statement {
        sql: format!("UPDATE {} SET {} WHERE {}", table, sets, condition),
        params,
    }
}

fn delete(table: &str, where_clause: &WhereClause) -> Statement {
    let mut params = Vec::new();
    let condition = where_sql(where_clause, &mut params);

    Statement {
        sql: format!("DELETE FROM {} WHERE {}", table, condition),
        params,
    }
}

/// Render `clause`, appending its values to `params`. A raw condition must
/// number its placeholders after the ones already in `params`.
fn where_sql(clause: &WhereClause, params: &mut Vec<DbValue>) -> String {
    match clause {
        WhereClause::Eq(col, val) => {
            params.push(val.clone());
            format!("{} = {}", quote_ident(col), placeholder_for(val, params.len()))
        }
        WhereClause::And(conditions) => conditions
            .iter()
            .map(|(col, val)| {
                params.push(val.clone());
                format!("{} = {}", quote_ident(col), placeholder_for(val, params.len()))
            })
            .collect::<Vec<_>>()
            .join(" AND "),
        WhereClause::Raw {
            condition,
            params: raw_params,
        } => {
            params.extend(raw_params.iter().cloned());
            condition.clone()
        }
    }
}
