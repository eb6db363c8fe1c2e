//! JSON envelope for command output

use serde::Serialize;
use uuid::Uuid;

/// Bumped when a command's JSON payload changes shape.
pub const JSON_SCHEMA_VERSION: &str = "1.0.0";

/// Wrapper for all JSON responses
///
/// Every response carries the schema version and an execution id so
/// scripted consumers can detect format changes and correlate with logs.
#[derive(Debug, Clone, Serialize)]
pub struct JsonResponse<T> {
    pub schema_version: String,
    pub execution_id: String,
    pub tool: String,
    pub timestamp: String,
    pub data: T,
}

impl<T> JsonResponse<T> {
    pub fn new(data: T, execution_id: &str) -> Self {
        JsonResponse {
            schema_version: JSON_SCHEMA_VERSION.to_string(),
            execution_id: execution_id.to_string(),
            tool: "mnemosyne".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            data,
        }
    }
}

pub fn generate_execution_id() -> String {
    Uuid::new_v4().to_string()
}

/// Pretty-print `data` to stdout
pub fn output_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}
