//! Embedded property-graph driver on SQLite
//!
//! Native language is SQL over the schema in [`super::schema`]. Named
//! parameters bind as `$name`, `:name` or `@name`.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, Statement};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::schema;
use super::{
    elapsed_ms, ClearStats, ConnectionConfig, ConnectionState, GraphStore, GraphValue, GraphWriter,
    Params, QueryResult, Row, StoreError, StoreResult,
};
use crate::entities::RelationshipType;

/// Virtual machine instructions between query deadline checks.
const PROGRESS_INTERVAL: i32 = 1000;

const PARAM_PREFIXES: [char; 3] = ['$', ':', '@'];

type Deadline = Arc<Mutex<Option<Instant>>>;

pub struct SqliteGraphStore {
    config: ConnectionConfig,
    state: ConnectionState,
    conn: Option<Connection>,
    /// Armed for the duration of each statement; the progress handler
    /// interrupts the statement once it passes.
    deadline: Deadline,
}

impl SqliteGraphStore {
    /// Create a disconnected client.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            conn: None,
            deadline: Arc::new(Mutex::new(None)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(ConnectionConfig::in_memory())
    }

    /// Create a client for the database file at `path` and connect it.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut store = Self::new(ConnectionConfig::for_path(path));
        store.connect()?;
        Ok(store)
    }

    fn connection(&self) -> StoreResult<&Connection> {
        match (self.state, self.conn.as_ref()) {
            (ConnectionState::Connected, Some(conn)) => Ok(conn),
            _ => Err(StoreError::Connection(format!(
                "not connected to graph store {} (state: {})",
                self.config.database, self.state
            ))),
        }
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let conn = if self.config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.config.database)
        }
        .map_err(|e| connection_error(&self.config, e))?;

        conn.busy_timeout(self.config.connection_timeout())
            .map_err(|e| connection_error(&self.config, e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| connection_error(&self.config, e))?;
        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(|e| connection_error(&self.config, e))?;

        let deadline = Arc::clone(&self.deadline);
        conn.progress_handler(PROGRESS_INTERVAL, Some(move || deadline_passed(&deadline)));

        conn.query_row(schema::PROBE_QUERY, [], |row| row.get::<_, i64>(0))
            .map_err(|e| connection_error(&self.config, e))?;

        Ok(conn)
    }

    fn arm_deadline(&self) {
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = Some(Instant::now() + self.config.query_timeout());
        }
    }

    fn disarm_deadline(&self) {
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = None;
        }
    }

    fn count(&self, query: &str, params: &Params) -> StoreResult<usize> {
        let result = self.execute_query(query, Some(params), None)?;
        let n = result.scalar("n").and_then(GraphValue::as_i64).unwrap_or(0);
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl GraphStore for SqliteGraphStore {
    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn connect(&mut self) -> StoreResult<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.config.validate()?;

        self.state = ConnectionState::Connecting;
        log::info!(
            "Connecting to graph store {} ({}:{})",
            self.config.database,
            self.config.host,
            self.config.port
        );

        match self.open_connection() {
            Ok(conn) => {
                self.conn = Some(conn);
                self.state = ConnectionState::Connected;
                log::debug!("Connected to graph store {}", self.config.database);
                Ok(())
            }
            Err(e) => {
                self.conn = None;
                self.state = ConnectionState::Disconnected;
                log::error!("Failed to connect to graph store: {}", e);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) -> StoreResult<()> {
        self.state = ConnectionState::Disconnected;
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| {
            StoreError::Connection(format!(
                "failed to close graph store {}: {}",
                self.config.database, e
            ))
        })?;
        log::debug!("Disconnected from graph store {}", self.config.database);
        Ok(())
    }

    fn execute_query(
        &self,
        query: &str,
        params: Option<&Params>,
        trace_id: Option<&str>,
    ) -> StoreResult<QueryResult> {
        let conn = self.connection()?;
        let trace_id = trace_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let started = Instant::now();
        self.arm_deadline();
        let outcome = run_statement(conn, query, params);
        self.disarm_deadline();
        let execution_time_ms = elapsed_ms(started);

        match outcome {
            Ok((columns, rows, rows_affected)) => {
                log::debug!(
                    "[{}] query returned {} rows ({} affected) in {:.2}ms",
                    trace_id,
                    rows.len(),
                    rows_affected,
                    execution_time_ms
                );
                Ok(QueryResult {
                    row_count: rows.len(),
                    rows,
                    columns,
                    execution_time_ms,
                    query: query.to_string(),
                    trace_id,
                    rows_affected,
                })
            }
            Err(e) => {
                let message = if is_interrupt(&e) {
                    format!(
                        "query interrupted after {}s timeout",
                        self.config.query_timeout_secs
                    )
                } else {
                    e.to_string()
                };
                log::error!("[{}] query failed: {}", trace_id, message);
                Err(StoreError::Query(format!("[{}] {}", trace_id, message)))
            }
        }
    }

    fn ping(&self) -> bool {
        let Ok(conn) = self.connection() else {
            return false;
        };
        match conn.query_row(schema::PROBE_QUERY, [], |row| row.get::<_, i64>(0)) {
            Ok(v) => v == 1,
            Err(e) => {
                log::debug!("Ping failed: {}", e);
                false
            }
        }
    }

    fn probe_query(&self) -> &str {
        schema::PROBE_QUERY
    }
}

impl GraphWriter for SqliteGraphStore {
    fn merge_node(
        &self,
        label: &str,
        unique_key: &str,
        scope_path: &str,
        properties: &Params,
    ) -> StoreResult<()> {
        let params = params_of(json!({
            "label": label,
            "unique_key": unique_key,
            "scope_path": scope_path,
            "properties": Value::Object(properties.clone()),
        }));
        self.execute_query(schema::MERGE_NODE, Some(&params), None)?;
        Ok(())
    }

    fn merge_edge(
        &self,
        rel_type: RelationshipType,
        from_key: &str,
        to_key: &str,
        properties: &Params,
    ) -> StoreResult<()> {
        let params = params_of(json!({
            "rel_type": rel_type.as_str(),
            "from_key": from_key,
            "to_key": to_key,
            "properties": Value::Object(properties.clone()),
        }));
        let result = self.execute_query(schema::MERGE_EDGE, Some(&params), None)?;
        if result.is_empty() {
            return Err(StoreError::Query(format!(
                "cannot merge {} edge {} -> {}: endpoint not found",
                rel_type, from_key, to_key
            )));
        }
        Ok(())
    }

    fn clear(&self, path_prefix: Option<&str>) -> StoreResult<ClearStats> {
        let stats = match path_prefix {
            None => {
                let edges = self.execute_query(schema::DELETE_ALL_EDGES, None, None)?;
                let nodes = self.execute_query(schema::DELETE_ALL_NODES, None, None)?;
                ClearStats {
                    nodes_deleted: nodes.rows_affected,
                    edges_deleted: edges.rows_affected,
                }
            }
            Some(prefix) => {
                let params = params_of(json!({ "prefix": prefix }));
                let edges_deleted = self.count(schema::COUNT_SCOPED_EDGES, &params)?;
                let nodes = self.execute_query(schema::DELETE_SCOPED_NODES, Some(&params), None)?;
                ClearStats {
                    nodes_deleted: nodes.rows_affected,
                    edges_deleted,
                }
            }
        };
        log::info!(
            "Cleared {} nodes and {} edges{}",
            stats.nodes_deleted,
            stats.edges_deleted,
            path_prefix
                .map(|p| format!(" under '{}'", p))
                .unwrap_or_default()
        );
        Ok(stats)
    }

    fn count_nodes(&self, label: Option<&str>) -> StoreResult<usize> {
        self.count(schema::COUNT_NODES, &params_of(json!({ "label": label })))
    }

    fn count_edges(&self, rel_type: Option<RelationshipType>) -> StoreResult<usize> {
        let rel_type = rel_type.map(|r| r.as_str());
        self.count(schema::COUNT_EDGES, &params_of(json!({ "rel_type": rel_type })))
    }

    fn stored_file_hashes(&self) -> StoreResult<HashMap<String, String>> {
        let result = self.execute_query(schema::FILE_HASHES, None, None)?;
        let hashes = result
            .rows
            .iter()
            .filter_map(|row| {
                let path = row.get("path")?.as_str()?;
                let hash = row.get("hash")?.as_str()?;
                Some((path.to_string(), hash.to_string()))
            })
            .collect();
        Ok(hashes)
    }

    fn try_acquire_lease(&self, project: &str, owner: &str, ttl: Duration) -> StoreResult<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let params = params_of(json!({
            "project": project,
            "owner": owner,
            "now": now,
            "expires_at": now.saturating_add(ttl_ms),
        }));
        let result = self.execute_query(schema::ACQUIRE_LEASE, Some(&params), None)?;
        Ok(!result.is_empty())
    }

    fn release_lease(&self, project: &str, owner: &str) -> StoreResult<()> {
        let params = params_of(json!({ "project": project, "owner": owner }));
        self.execute_query(schema::RELEASE_LEASE, Some(&params), None)?;
        Ok(())
    }
}

type StatementOutput = (Vec<String>, Vec<Row>, usize);

fn run_statement(
    conn: &Connection,
    query: &str,
    params: Option<&Params>,
) -> rusqlite::Result<StatementOutput> {
    let mut stmt = conn.prepare(query)?;
    if let Some(params) = params {
        bind_named(&mut stmt, params)?;
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let readonly = stmt.readonly();

    let mut out = Vec::new();
    {
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), normalize_cell(row.get_ref(idx)?));
            }
            out.push(record);
        }
    }

    let rows_affected = if readonly { 0 } else { conn.changes() as usize };
    Ok((columns, out, rows_affected))
}

fn bind_named(stmt: &mut Statement<'_>, params: &Params) -> rusqlite::Result<()> {
    for (name, value) in params {
        let mut index = None;
        for prefix in PARAM_PREFIXES {
            if let Some(idx) = stmt.parameter_index(&format!("{}{}", prefix, name))? {
                index = Some(idx);
                break;
            }
        }
        match index {
            Some(idx) => stmt.raw_bind_parameter(idx, to_sql_value(value))?,
            None => log::debug!("Parameter '{}' is not referenced by the query", name),
        }
    }
    Ok(())
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn normalize_cell(cell: ValueRef<'_>) -> GraphValue {
    match cell {
        ValueRef::Null => GraphValue::null(),
        ValueRef::Integer(i) => GraphValue::Scalar(Value::from(i)),
        ValueRef::Real(f) => GraphValue::Scalar(
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        ),
        ValueRef::Text(bytes) => GraphValue::from_text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => GraphValue::Scalar(Value::String(hex::encode(bytes))),
    }
}

fn params_of(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

fn deadline_passed(deadline: &Deadline) -> bool {
    deadline
        .lock()
        .map(|d| matches!(*d, Some(limit) if Instant::now() >= limit))
        .unwrap_or(false)
}

fn is_interrupt(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::OperationInterrupted)
}

fn connection_error(config: &ConnectionConfig, e: rusqlite::Error) -> StoreError {
    StoreError::Connection(format!("cannot open graph store {}: {}", config.database, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_params_map_to_sql_values() {
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(to_sql_value(&json!(["a"])), SqlValue::Text("[\"a\"]".into()));
        assert_eq!(to_sql_value(&Value::Null), SqlValue::Null);
    }

    #[test]
    fn test_blob_cells_are_hex() {
        let value = normalize_cell(ValueRef::Blob(&[0xde, 0xad]));
        assert_eq!(value.as_str(), Some("dead"));
    }

    #[test]
    fn test_params_bind_with_any_prefix() {
        let mut store = SqliteGraphStore::in_memory();
        store.connect().unwrap();
        let params = params_of(json!({ "a": 2, "b": "x", "unused": 1 }));
        let result = store
            .execute_query("SELECT :a * 3 AS n, @b AS s", Some(&params), Some("t-1"))
            .unwrap();
        assert_eq!(result.trace_id, "t-1");
        assert_eq!(result.scalar("n").and_then(GraphValue::as_i64), Some(6));
        assert_eq!(result.scalar("s").and_then(GraphValue::as_str), Some("x"));
    }
}
