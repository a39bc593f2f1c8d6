//! SQLite-backed Table Store.
//!
//! # Responsibility
//! - Persist rows of arbitrarily shaped tables as positional JSON arrays.
//! - Translate match specifications into SQL over `json_extract`.
//! - Honor transactional vs dirty execution per operation.
//!
//! # Invariants
//! - Row order is insertion order; an upsert keeps the original position.
//! - Transactional operations run inside `BEGIN IMMEDIATE ... COMMIT`.
//! - Dirty operations never open a transaction of their own.
//! - Callers must not hold an open transaction on the same connection when
//!   using the transactional path.

use crate::db::migrations::ensure_migrated;
use crate::model::context::CallingContext;
use crate::model::options::{ComparisonOperator, ExecutionMode};
use crate::model::record::TableSchema;
use crate::model::reference::Identifier;
use crate::store::{
    Continuation, Cursor, GuardOperand, MatchSpec, Placeholder, Row, StoreError, StoreResult,
    TableStore,
};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;
use std::collections::BTreeMap;

const DATA_TABLE_PREFIX: &str = "rs_";

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("valid table name regex"));

/// Table store over a migrated SQLite connection.
pub struct SqliteTableStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTableStore<'conn> {
    /// Constructs a store from a connection returned by `open_db*`.
    ///
    /// # Errors
    /// - Returns `StoreError::Db` when catalog migrations are missing.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_migrated(conn)?;
        Ok(Self { conn })
    }

    fn run<T>(
        &self,
        mode: ExecutionMode,
        operation: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        match mode {
            ExecutionMode::Dirty => operation(self.conn),
            ExecutionMode::Transactional => {
                let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
                let output = operation(&tx)?;
                tx.commit()?;
                Ok(output)
            }
        }
    }

    fn registered_attributes(conn: &Connection, table: &str) -> StoreResult<Option<Vec<String>>> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT attributes FROM refstore_tables WHERE name = ?1;",
                [table],
                |row| row.get(0),
            )
            .optional()?;

        stored
            .map(|text| {
                serde_json::from_str::<Vec<String>>(&text).map_err(|err| {
                    StoreError::Corrupt(format!("catalog attributes for `{table}`: {err}"))
                })
            })
            .transpose()
    }
}

impl TableStore for SqliteTableStore<'_> {
    fn ensure_table(&self, schema: &TableSchema) -> StoreResult<()> {
        let data_table = data_table(schema.name())?;
        self.run(ExecutionMode::Transactional, |conn| {
            match Self::registered_attributes(conn, schema.name())? {
                Some(registered) if registered != schema.attributes() => {
                    return Err(StoreError::SchemaMismatch {
                        table: schema.name().to_string(),
                        registered,
                        requested: schema.attributes().to_vec(),
                    });
                }
                Some(_) => return Ok(()),
                None => {}
            }

            let attributes = serde_json::to_string(schema.attributes())
                .map_err(|err| StoreError::BadArgument(err.to_string()))?;
            conn.execute(
                "INSERT INTO refstore_tables (name, attributes) VALUES (?1, ?2);",
                params![schema.name(), attributes],
            )?;
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {data_table} (
                    position INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL UNIQUE,
                    row_json TEXT NOT NULL
                );"
            ))?;
            debug!(
                "event=table_create module=store status=ok table={} arity={}",
                schema.name(),
                schema.arity()
            );
            Ok(())
        })
    }

    fn attributes(&self, table: &str) -> StoreResult<Vec<String>> {
        Self::registered_attributes(self.conn, table)?
            .ok_or_else(|| StoreError::InvalidTable(table.to_string()))
    }

    fn read(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        key: &Identifier,
        mode: ExecutionMode,
    ) -> StoreResult<Option<Row>> {
        let data_table = data_table(schema.name())?;
        log_op(context, "read", schema, mode);
        self.run(mode, |conn| {
            let stored: Option<String> = conn
                .query_row(
                    &format!("SELECT row_json FROM {data_table} WHERE key = ?1;"),
                    [key.to_text()],
                    |row| row.get(0),
                )
                .optional()?;
            stored.map(|text| decode_row(&text)).transpose()
        })
    }

    fn write(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        key: &Identifier,
        row: Row,
        mode: ExecutionMode,
    ) -> StoreResult<()> {
        let data_table = data_table(schema.name())?;
        if row.len() != schema.arity() {
            return Err(StoreError::BadArgument(format!(
                "row has {} values, table `{}` has arity {}",
                row.len(),
                schema.name(),
                schema.arity()
            )));
        }
        let row_json = Value::Array(row).to_string();
        log_op(context, "write", schema, mode);
        self.run(mode, |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {data_table} (key, row_json) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET row_json = excluded.row_json;"
                ),
                params![key.to_text(), row_json],
            )?;
            Ok(())
        })
    }

    fn delete(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        key: &Identifier,
        mode: ExecutionMode,
    ) -> StoreResult<()> {
        let data_table = data_table(schema.name())?;
        log_op(context, "delete", schema, mode);
        self.run(mode, |conn| {
            conn.execute(
                &format!("DELETE FROM {data_table} WHERE key = ?1;"),
                [key.to_text()],
            )?;
            Ok(())
        })
    }

    fn select(
        &self,
        context: &CallingContext,
        schema: &TableSchema,
        limit: usize,
        spec: &MatchSpec,
    ) -> StoreResult<Option<Cursor>> {
        let continuation = Continuation {
            table: schema.clone(),
            spec: spec.clone(),
            limit,
            offset: 0,
        };
        debug!(
            "event=store_select module=store table={} caller={} request_id={} limit={} offset=0",
            schema.name(),
            context.caller_label(),
            context.request_id,
            limit
        );
        self.fetch_batch(continuation)
    }

    fn select_next(
        &self,
        context: &CallingContext,
        cursor: &Cursor,
    ) -> StoreResult<Option<Cursor>> {
        let continuation = cursor.continuation().clone();
        debug!(
            "event=store_select module=store table={} caller={} request_id={} limit={} offset={}",
            continuation.table.name(),
            context.caller_label(),
            context.request_id,
            continuation.limit,
            continuation.offset
        );
        self.fetch_batch(continuation)
    }
}

impl SqliteTableStore<'_> {
    fn fetch_batch(&self, mut continuation: Continuation) -> StoreResult<Option<Cursor>> {
        if continuation.limit == 0 {
            return Err(StoreError::BadArgument("select limit must be >= 1".to_string()));
        }
        let data_table = data_table(continuation.table.name())?;
        let (where_sql, mut binds) = compile_match_spec(&continuation.table, &continuation.spec)?;
        binds.push(SqlValue::Integer(to_sql_int(continuation.limit)));
        binds.push(SqlValue::Integer(to_sql_int(continuation.offset)));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT row_json FROM {data_table}
             WHERE {where_sql}
             ORDER BY position ASC
             LIMIT ? OFFSET ?;"
        ))?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut batch = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            batch.push(decode_row(&text)?);
        }

        if batch.is_empty() {
            return Ok(None);
        }
        continuation.offset += batch.len();
        Ok(Some(Cursor::new(batch, continuation)))
    }
}

fn data_table(name: &str) -> StoreResult<String> {
    if !TABLE_NAME_RE.is_match(name) {
        return Err(StoreError::InvalidTable(name.to_string()));
    }
    Ok(format!("{DATA_TABLE_PREFIX}{name}"))
}

/// Compiles pattern + guards into a SQL predicate and its bind values.
fn compile_match_spec(
    schema: &TableSchema,
    spec: &MatchSpec,
) -> StoreResult<(String, Vec<SqlValue>)> {
    if spec.pattern.len() != schema.arity() {
        return Err(StoreError::BadArgument(format!(
            "pattern binds {} positions, table `{}` has arity {}",
            spec.pattern.len(),
            schema.name(),
            schema.arity()
        )));
    }

    let mut positions: BTreeMap<Placeholder, usize> = BTreeMap::new();
    for (index, placeholder) in spec.pattern.iter().enumerate() {
        if positions.insert(*placeholder, index).is_some() {
            return Err(StoreError::BadArgument(format!(
                "placeholder {placeholder} bound more than once"
            )));
        }
    }

    let mut clauses = Vec::with_capacity(spec.guards.len());
    let mut binds = Vec::new();
    for guard in &spec.guards {
        let left = compile_operand(&positions, &guard.left, &mut binds)?;
        let right = compile_operand(&positions, &guard.right, &mut binds)?;
        clauses.push(format!("({left} {} {right})", sql_operator(guard.operator)));
    }

    if clauses.is_empty() {
        return Ok(("1 = 1".to_string(), binds));
    }
    Ok((clauses.join(" AND "), binds))
}

fn compile_operand(
    positions: &BTreeMap<Placeholder, usize>,
    operand: &GuardOperand,
    binds: &mut Vec<SqlValue>,
) -> StoreResult<String> {
    match operand {
        GuardOperand::Bound(placeholder) => positions
            .get(placeholder)
            .map(|index| format!("json_extract(row_json, '$[{index}]')"))
            .ok_or_else(|| {
                StoreError::BadArgument(format!("guard references unbound placeholder {placeholder}"))
            }),
        GuardOperand::Literal(value) => {
            binds.push(to_sql_value(value));
            Ok("?".to_string())
        }
    }
}

fn sql_operator(operator: ComparisonOperator) -> &'static str {
    match operator {
        ComparisonOperator::Eq => "IS",
        ComparisonOperator::Ne => "IS NOT",
        ComparisonOperator::Lt => "<",
        ComparisonOperator::Le => "<=",
        ComparisonOperator::Gt => ">",
        ComparisonOperator::Ge => ">=",
    }
}

/// Maps a JSON literal onto the value `json_extract` yields for it.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn decode_row(text: &str) -> StoreResult<Row> {
    serde_json::from_str::<Row>(text).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn log_op(context: &CallingContext, op: &str, schema: &TableSchema, mode: ExecutionMode) {
    debug!(
        "event=store_{op} module=store table={} mode={} caller={} request_id={}",
        schema.name(),
        mode.as_str(),
        context.caller_label(),
        context.request_id
    );
}
