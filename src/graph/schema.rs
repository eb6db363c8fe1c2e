//! SQLite property-graph schema and the statements the driver runs against it
//!
//! Nodes are keyed by `unique_key`; edges by `(rel_type, from_id, to_id)`.
//! `scope_path` carries the owning file (or package directory) so scoped
//! clears never have to parse keys.

/// Applied on every connect; must stay idempotent.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    label       TEXT NOT NULL,
    unique_key  TEXT NOT NULL UNIQUE,
    scope_path  TEXT NOT NULL DEFAULT '',
    properties  TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_label ON graph_nodes(label);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_scope ON graph_nodes(scope_path);

CREATE TABLE IF NOT EXISTS graph_edges (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    rel_type    TEXT NOT NULL,
    from_id     INTEGER NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    to_id       INTEGER NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    properties  TEXT NOT NULL DEFAULT '{}',
    UNIQUE(rel_type, from_id, to_id)
);
CREATE INDEX IF NOT EXISTS idx_graph_edges_from ON graph_edges(from_id);
CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges(to_id);

CREATE TABLE IF NOT EXISTS project_leases (
    project     TEXT PRIMARY KEY,
    owner       TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);

CREATE VIEW IF NOT EXISTS node_values AS
SELECT
    n.id,
    n.label,
    n.unique_key,
    n.scope_path,
    json_object(
        'type', 'node',
        'id', n.id,
        'labels', json_array(n.label),
        'properties', json(n.properties)
    ) AS node
FROM graph_nodes AS n;

CREATE VIEW IF NOT EXISTS edge_values AS
SELECT
    e.id,
    e.rel_type,
    src.unique_key AS from_key,
    dst.unique_key AS to_key,
    json_object(
        'type', 'relationship',
        'id', e.id,
        'relation', e.rel_type,
        'src_node', e.from_id,
        'dest_node', e.to_id,
        'properties', json(e.properties)
    ) AS relationship
FROM graph_edges AS e
JOIN graph_nodes AS src ON src.id = e.from_id
JOIN graph_nodes AS dst ON dst.id = e.to_id;
"#;

/// Trivial query used by `ping` and the health check.
pub const PROBE_QUERY: &str = "SELECT 1 AS test";

/// Properties are merged, never replaced. A `null` property removes the key.
pub const MERGE_NODE: &str = r#"
INSERT INTO graph_nodes (label, unique_key, scope_path, properties)
VALUES ($label, $unique_key, $scope_path, json_patch('{}', $properties))
ON CONFLICT(unique_key) DO UPDATE SET
    label = excluded.label,
    scope_path = excluded.scope_path,
    properties = json_patch(graph_nodes.properties, excluded.properties)
"#;

/// Returns one row when written, none when an endpoint is missing.
pub const MERGE_EDGE: &str = r#"
INSERT INTO graph_edges (rel_type, from_id, to_id, properties)
SELECT $rel_type, src.id, dst.id, json_patch('{}', $properties)
FROM graph_nodes AS src, graph_nodes AS dst
WHERE src.unique_key = $from_key AND dst.unique_key = $to_key
ON CONFLICT(rel_type, from_id, to_id) DO UPDATE SET
    properties = json_patch(graph_edges.properties, excluded.properties)
RETURNING id
"#;

pub const DELETE_ALL_EDGES: &str = "DELETE FROM graph_edges";
pub const DELETE_ALL_NODES: &str = "DELETE FROM graph_nodes";

pub const COUNT_SCOPED_EDGES: &str = r#"
SELECT COUNT(*) AS n FROM graph_edges
WHERE from_id IN (
        SELECT id FROM graph_nodes
        WHERE substr(scope_path, 1, length($prefix)) = $prefix
    )
   OR to_id IN (
        SELECT id FROM graph_nodes
        WHERE substr(scope_path, 1, length($prefix)) = $prefix
    )
"#;

/// Edges go with their nodes through `ON DELETE CASCADE`.
pub const DELETE_SCOPED_NODES: &str = r#"
DELETE FROM graph_nodes
WHERE substr(scope_path, 1, length($prefix)) = $prefix
"#;

pub const COUNT_NODES: &str =
    "SELECT COUNT(*) AS n FROM graph_nodes WHERE $label IS NULL OR label = $label";

pub const COUNT_EDGES: &str =
    "SELECT COUNT(*) AS n FROM graph_edges WHERE $rel_type IS NULL OR rel_type = $rel_type";

pub const FILE_HASHES: &str = r#"
SELECT json_extract(properties, '$.path') AS path,
       json_extract(properties, '$.hash') AS hash
FROM graph_nodes
WHERE label = 'File'
"#;

/// Takes the lease when free, expired, or already ours.
pub const ACQUIRE_LEASE: &str = r#"
INSERT INTO project_leases (project, owner, acquired_at, expires_at)
VALUES ($project, $owner, $now, $expires_at)
ON CONFLICT(project) DO UPDATE SET
    owner = excluded.owner,
    acquired_at = excluded.acquired_at,
    expires_at = excluded.expires_at
WHERE project_leases.expires_at <= excluded.acquired_at
   OR project_leases.owner = excluded.owner
RETURNING owner
"#;

pub const RELEASE_LEASE: &str =
    "DELETE FROM project_leases WHERE project = $project AND owner = $owner";
