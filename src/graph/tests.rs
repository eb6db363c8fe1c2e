//! Tests for graph module

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::entities::RelationshipType;
    use crate::graph::{
        with_session, ConnectionConfig, ConnectionState, GraphEntity, GraphSession, GraphStore,
        GraphWriter, Params, QueryResult, SqliteGraphStore, StoreError, StoreResult,
    };

    fn props(value: serde_json::Value) -> Params {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    fn connected() -> SqliteGraphStore {
        let mut store = SqliteGraphStore::in_memory();
        store.connect().unwrap();
        store
    }

    #[test]
    fn test_state_machine() {
        let mut store = SqliteGraphStore::in_memory();
        assert_eq!(store.state(), ConnectionState::Disconnected);

        store.connect().unwrap();
        assert_eq!(store.state(), ConnectionState::Connected);

        // Second connect is a no-op
        store.connect().unwrap();
        assert!(store.is_connected());

        store.disconnect().unwrap();
        assert_eq!(store.state(), ConnectionState::Disconnected);
        store.disconnect().unwrap();
    }

    #[test]
    fn test_disconnected_query_is_connection_error() {
        let store = SqliteGraphStore::in_memory();
        let err = store.execute_query("SELECT 1", None, None).unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert!(!store.ping());
    }

    #[test]
    fn test_invalid_config_is_rejected_at_connect() {
        let mut store = SqliteGraphStore::new(ConnectionConfig {
            connection_timeout_secs: 0,
            ..ConnectionConfig::in_memory()
        });
        let err = store.connect().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(store.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_bad_sql_is_query_error() {
        let store = connected();
        let err = store.execute_query("SELEC nonsense", None, None).unwrap_err();
        assert!(err.is_query());
        // Connection survives a failed query
        assert!(store.ping());
    }

    #[test]
    fn test_merge_node_is_idempotent_and_merges_properties() {
        let store = connected();
        store
            .merge_node("File", "File:a.py", "a.py", &props(json!({"path": "a.py", "size": 1})))
            .unwrap();
        store
            .merge_node("File", "File:a.py", "a.py", &props(json!({"hash": "abc"})))
            .unwrap();

        assert_eq!(store.count_nodes(Some("File")).unwrap(), 1);

        let result = store
            .execute_query(
                "SELECT node FROM node_values WHERE unique_key = $key",
                Some(&props(json!({"key": "File:a.py"}))),
                None,
            )
            .unwrap();
        let node = result.scalar("node").and_then(|v| v.as_entity()).unwrap();
        let properties = node.properties().unwrap();
        assert_eq!(properties["path"], "a.py");
        assert_eq!(properties["hash"], "abc");
        assert_eq!(node.labels(), ["File".to_string()]);
    }

    #[test]
    fn test_merge_edge_requires_both_endpoints() {
        let store = connected();
        store.merge_node("Function", "F:a", "a.py", &Params::new()).unwrap();

        let err = store
            .merge_edge(RelationshipType::Calls, "F:a", "F:missing", &Params::new())
            .unwrap_err();
        assert!(err.is_query());
        assert!(err.to_string().contains("endpoint not found"));
        assert_eq!(store.count_edges(None).unwrap(), 0);
    }

    #[test]
    fn test_merge_edge_is_idempotent() {
        let store = connected();
        store.merge_node("Function", "F:a", "a.py", &Params::new()).unwrap();
        store.merge_node("Function", "F:b", "a.py", &Params::new()).unwrap();
        for line in [3, 4] {
            store
                .merge_edge(
                    RelationshipType::Calls,
                    "F:a",
                    "F:b",
                    &props(json!({"call_line": line})),
                )
                .unwrap();
        }
        assert_eq!(store.count_edges(Some(RelationshipType::Calls)).unwrap(), 1);

        let result = store
            .execute_query("SELECT relationship, from_key FROM edge_values", None, None)
            .unwrap();
        let edge = result.scalar("relationship").and_then(|v| v.as_entity()).unwrap();
        match edge {
            GraphEntity::Relationship {
                relation,
                properties,
                ..
            } => {
                assert_eq!(relation, "CALLS");
                assert_eq!(properties["call_line"], 4);
            }
            other => panic!("expected relationship, got {:?}", other),
        }
        assert_eq!(result.scalar("from_key").and_then(|v| v.as_str()), Some("F:a"));
    }

    #[test]
    fn test_scoped_clear_cascades_edges() {
        let store = connected();
        store.merge_node("File", "File:src/a/x.py", "src/a/x.py", &Params::new()).unwrap();
        store.merge_node("File", "File:src/b/y.py", "src/b/y.py", &Params::new()).unwrap();
        store.merge_node("Function", "F:a", "src/a/x.py", &Params::new()).unwrap();
        store.merge_node("Function", "F:b", "src/b/y.py", &Params::new()).unwrap();
        store
            .merge_edge(RelationshipType::Contains, "File:src/a/x.py", "F:a", &Params::new())
            .unwrap();
        store
            .merge_edge(RelationshipType::Contains, "File:src/b/y.py", "F:b", &Params::new())
            .unwrap();
        store
            .merge_edge(RelationshipType::Calls, "F:b", "F:a", &Params::new())
            .unwrap();

        let stats = store.clear(Some("src/a/")).unwrap();
        assert_eq!(stats.nodes_deleted, 2);
        assert_eq!(stats.edges_deleted, 2);
        assert_eq!(store.count_nodes(None).unwrap(), 2);
        assert_eq!(store.count_edges(None).unwrap(), 1);

        let stats = store.clear(None).unwrap();
        assert_eq!(stats.nodes_deleted, 2);
        assert_eq!(store.count_nodes(None).unwrap(), 0);
    }

    #[test]
    fn test_lease_excludes_other_owners() {
        let store = connected();
        let ttl = std::time::Duration::from_secs(60);
        assert!(store.try_acquire_lease("/proj", "one", ttl).unwrap());
        assert!(store.try_acquire_lease("/proj", "one", ttl).unwrap());
        assert!(!store.try_acquire_lease("/proj", "two", ttl).unwrap());

        store.release_lease("/proj", "one").unwrap();
        assert!(store.try_acquire_lease("/proj", "two", ttl).unwrap());
    }

    #[test]
    fn test_expired_lease_can_be_taken_over() {
        let store = connected();
        assert!(store
            .try_acquire_lease("/proj", "one", std::time::Duration::ZERO)
            .unwrap());
        assert!(store
            .try_acquire_lease("/proj", "two", std::time::Duration::from_secs(60))
            .unwrap());
    }

    #[test]
    fn test_session_disconnects_on_drop() {
        let mut store = SqliteGraphStore::in_memory();
        {
            let session = GraphSession::open(&mut store).unwrap();
            assert!(session.ping());
        }
        assert_eq!(store.state(), ConnectionState::Disconnected);

        let rows = with_session(&mut store, |s| {
            s.execute_query("SELECT 1 AS one", None, None).map(|r| r.row_count)
        })
        .unwrap()
        .unwrap();
        assert_eq!(rows, 1);
        assert!(!store.is_connected());
    }

    #[test]
    fn test_healthcheck_reports_identity() {
        let store = connected();
        let health = store.healthcheck();
        assert!(health.is_healthy());
        assert_eq!(health.test_query_success, Some(true));
        assert_eq!(health.database, ":memory:");
        assert!(health.error.is_none());
    }

    /// Live store whose health query is not valid SQL.
    struct BrokenHealthQuery(SqliteGraphStore);

    impl GraphStore for BrokenHealthQuery {
        fn config(&self) -> &ConnectionConfig {
            self.0.config()
        }

        fn state(&self) -> ConnectionState {
            self.0.state()
        }

        fn connect(&mut self) -> StoreResult<()> {
            self.0.connect()
        }

        fn disconnect(&mut self) -> StoreResult<()> {
            self.0.disconnect()
        }

        fn execute_query(
            &self,
            query: &str,
            params: Option<&Params>,
            trace_id: Option<&str>,
        ) -> StoreResult<QueryResult> {
            self.0.execute_query(query, params, trace_id)
        }

        fn ping(&self) -> bool {
            self.0.ping()
        }

        fn probe_query(&self) -> &str {
            "SELEC 1"
        }
    }

    #[test]
    fn test_failed_health_query_keeps_connected_flag() {
        let store = BrokenHealthQuery(connected());
        let health = store.healthcheck();
        assert!(!health.is_healthy());
        assert!(health.connected);
        assert_eq!(health.test_query_success, Some(false));
        assert!(health.error.is_some());

        let mut store = store;
        store.disconnect().unwrap();
        let health = store.healthcheck();
        assert!(!health.connected);
        assert_eq!(health.error.as_deref(), Some("not connected"));
    }
}
