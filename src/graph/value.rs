//! Uniform query results
//!
//! Drivers normalize native rows into [`Row`] maps of [`GraphValue`]. Node,
//! relationship and path shaped values become a tagged [`GraphEntity`] so
//! callers never see a backend-specific type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Named query parameters, shared by every backend.
pub type Params = Map<String, Value>;

/// One result row keyed by column name.
pub type Row = BTreeMap<String, GraphValue>;

/// Graph-shaped value, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraphEntity {
    Node {
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    Relationship {
        #[serde(default)]
        id: Option<i64>,
        relation: String,
        #[serde(default)]
        src_node: Option<i64>,
        #[serde(default)]
        dest_node: Option<i64>,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    Path {
        #[serde(default)]
        nodes: Vec<GraphEntity>,
        #[serde(default)]
        edges: Vec<GraphEntity>,
    },
}

impl GraphEntity {
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        match self {
            GraphEntity::Node { properties, .. } | GraphEntity::Relationship { properties, .. } => {
                Some(properties)
            }
            GraphEntity::Path { .. } => None,
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            GraphEntity::Node { labels, .. } => labels,
            _ => &[],
        }
    }

    pub fn relation(&self) -> Option<&str> {
        match self {
            GraphEntity::Relationship { relation, .. } => Some(relation),
            _ => None,
        }
    }
}

/// A single normalized result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphValue {
    Entity(GraphEntity),
    Scalar(Value),
}

impl GraphValue {
    pub fn null() -> Self {
        GraphValue::Scalar(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, GraphValue::Scalar(Value::Null))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GraphValue::Scalar(v) => v.as_i64(),
            GraphValue::Entity(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GraphValue::Scalar(v) => v.as_f64(),
            GraphValue::Entity(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GraphValue::Scalar(v) => v.as_str(),
            GraphValue::Entity(_) => None,
        }
    }

    pub fn as_entity(&self) -> Option<&GraphEntity> {
        match self {
            GraphValue::Entity(e) => Some(e),
            GraphValue::Scalar(_) => None,
        }
    }

    /// Normalize a text cell.
    ///
    /// Text holding a JSON object tagged `node`, `relationship` or `path` is
    /// lifted into an entity; every other string stays text.
    pub fn from_text(text: String) -> Self {
        if text.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
                if let Some(entity) = entity_from_object(map) {
                    return GraphValue::Entity(entity);
                }
            }
        }
        GraphValue::Scalar(Value::String(text))
    }
}

fn entity_from_object(map: Map<String, Value>) -> Option<GraphEntity> {
    match map.get("type").and_then(Value::as_str) {
        Some("node") | Some("relationship") | Some("path") => {
            serde_json::from_value(Value::Object(map)).ok()
        }
        _ => None,
    }
}

/// Result of one query, independent of the backend that ran it.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Column names in result order
    pub columns: Vec<String>,
    pub row_count: usize,
    pub execution_time_ms: f64,
    pub query: String,
    pub trace_id: String,
    /// Rows changed by a write statement, 0 for reads
    pub rows_affected: usize,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Value of `column` in the first row.
    pub fn scalar(&self, column: &str) -> Option<&GraphValue> {
        self.first().and_then(|row| row.get(column))
    }

    /// All values of `column`, skipping rows where it is absent.
    pub fn column(&self, column: &str) -> Vec<&GraphValue> {
        self.rows.iter().filter_map(|row| row.get(column)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_node_text_is_lifted() {
        let text = r#"{"type":"node","id":7,"labels":["File"],"properties":{"path":"a.py"}}"#;
        let value = GraphValue::from_text(text.to_string());
        let entity = value.as_entity().expect("node entity");
        assert_eq!(entity.labels(), ["File".to_string()]);
        assert_eq!(entity.properties().unwrap()["path"], "a.py");
    }

    #[test]
    fn test_relationship_text_is_lifted() {
        let text = r#"{"type":"relationship","id":1,"relation":"CALLS","src_node":1,"dest_node":2,"properties":{}}"#;
        let value = GraphValue::from_text(text.to_string());
        assert_eq!(value.as_entity().and_then(GraphEntity::relation), Some("CALLS"));
    }

    #[test]
    fn test_untagged_json_stays_text() {
        let text = r#"{"path":"a.py"}"#;
        assert_eq!(GraphValue::from_text(text.to_string()).as_str(), Some(text));
        assert_eq!(GraphValue::from_text("{not json".into()).as_str(), Some("{not json"));
        assert_eq!(GraphValue::from_text("[1, 2]".into()).as_str(), Some("[1, 2]"));
    }

    #[test]
    fn test_scalar_accessors() {
        assert_eq!(GraphValue::Scalar(Value::from(3)).as_i64(), Some(3));
        assert!(GraphValue::null().is_null());
        assert_eq!(GraphValue::Scalar(Value::from(1.5)).as_f64(), Some(1.5));
    }
}
