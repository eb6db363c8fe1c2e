//! Graph store client contract and the embedded SQLite driver
//!
//! [`GraphStore`] is the lifecycle/query/health contract every backend
//! implements. [`GraphWriter`] adds the idempotent write primitives the loader
//! and pipeline need. Callers that only report health depend on the former.

mod connection;
mod error;
mod health;
mod schema;
mod sqlite;
mod value;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::entities::RelationshipType;

pub use connection::{ConnectionConfig, ConnectionState, IN_MEMORY};
pub use error::{StoreError, StoreResult};
pub use health::{HealthState, HealthStatus};
pub use sqlite::SqliteGraphStore;
pub use value::{GraphEntity, GraphValue, Params, QueryResult, Row};

/// Connection lifecycle, query execution and health reporting.
///
/// `execute_query` and `ping` are only meaningful while connected: from
/// [`ConnectionState::Disconnected`] the former fails with
/// [`StoreError::Connection`] and the latter returns `false`.
pub trait GraphStore {
    fn config(&self) -> &ConnectionConfig;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the connection. A no-op when already connected.
    fn connect(&mut self) -> StoreResult<()>;

    /// Close the connection. A no-op when already disconnected.
    fn disconnect(&mut self) -> StoreResult<()>;

    /// Run one statement in the backend's native language.
    ///
    /// `trace_id` is echoed in the result and in logs; one is generated when
    /// absent.
    fn execute_query(
        &self,
        query: &str,
        params: Option<&Params>,
        trace_id: Option<&str>,
    ) -> StoreResult<QueryResult>;

    /// Cheap liveness probe. Never fails.
    fn ping(&self) -> bool;

    /// Trivial query that must return at least one row on a working backend.
    fn probe_query(&self) -> &str;

    /// Time a ping, then confirm query execution with [`Self::probe_query`].
    ///
    /// Always returns a status; failures are reported as unhealthy.
    fn healthcheck(&self) -> HealthStatus {
        let config = self.config();
        let started = Instant::now();
        let alive = self.ping();
        let response_time_ms = elapsed_ms(started);

        if !alive {
            let connected = self.is_connected();
            let reason = if connected { "ping failed" } else { "not connected" };
            log::warn!("Health check failed for {}: {}", config.database, reason);
            return HealthStatus::unhealthy(config, connected, Some(response_time_ms), reason);
        }

        match self.execute_query(self.probe_query(), None, None) {
            Ok(result) => HealthStatus::healthy(config, response_time_ms, !result.is_empty()),
            Err(e) => {
                log::error!("Health check query failed for {}: {}", config.database, e);
                HealthStatus {
                    test_query_success: Some(false),
                    ..HealthStatus::unhealthy(config, true, Some(response_time_ms), e.to_string())
                }
            }
        }
    }
}

/// Rows removed by [`GraphWriter::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClearStats {
    pub nodes_deleted: usize,
    pub edges_deleted: usize,
}

/// Idempotent graph writes plus the inspection helpers built on them.
pub trait GraphWriter: GraphStore {
    /// Upsert a node keyed on `unique_key`, merging `properties` into any
    /// existing ones.
    ///
    /// `scope_path` is the path a scoped [`Self::clear`] matches against.
    fn merge_node(
        &self,
        label: &str,
        unique_key: &str,
        scope_path: &str,
        properties: &Params,
    ) -> StoreResult<()>;

    /// Upsert an edge keyed on `(rel_type, from_key, to_key)`.
    ///
    /// Fails with [`StoreError::Query`] and writes nothing when either
    /// endpoint node does not exist.
    fn merge_edge(
        &self,
        rel_type: RelationshipType,
        from_key: &str,
        to_key: &str,
        properties: &Params,
    ) -> StoreResult<()>;

    /// Delete every node (and edge) or, with a prefix, only nodes whose scope
    /// path starts with it, cascading to their edges.
    fn clear(&self, path_prefix: Option<&str>) -> StoreResult<ClearStats>;

    fn count_nodes(&self, label: Option<&str>) -> StoreResult<usize>;

    fn count_edges(&self, rel_type: Option<RelationshipType>) -> StoreResult<usize>;

    /// `path -> hash` for every persisted File node.
    fn stored_file_hashes(&self) -> StoreResult<HashMap<String, String>>;

    /// Take the advisory lease on `project`. Returns `false` when another
    /// owner holds an unexpired lease.
    fn try_acquire_lease(&self, project: &str, owner: &str, ttl: Duration) -> StoreResult<bool>;

    fn release_lease(&self, project: &str, owner: &str) -> StoreResult<()>;
}

/// Scoped connection: connects on open, disconnects when dropped.
///
/// Disconnect failures on drop are logged, never raised.
pub struct GraphSession<'a, S: GraphStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: GraphStore + ?Sized> GraphSession<'a, S> {
    pub fn open(store: &'a mut S) -> StoreResult<Self> {
        store.connect()?;
        Ok(Self { store })
    }
}

impl<S: GraphStore + ?Sized> Deref for GraphSession<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.store
    }
}

impl<S: GraphStore + ?Sized> DerefMut for GraphSession<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.store
    }
}

impl<S: GraphStore + ?Sized> Drop for GraphSession<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.store.disconnect() {
            log::warn!("Failed to disconnect graph session: {}", e);
        }
    }
}

/// Run `f` inside a [`GraphSession`].
pub fn with_session<S, T, F>(store: &mut S, f: F) -> StoreResult<T>
where
    S: GraphStore + ?Sized,
    F: FnOnce(&mut S) -> T,
{
    let mut session = GraphSession::open(store)?;
    Ok(f(&mut session))
}

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
