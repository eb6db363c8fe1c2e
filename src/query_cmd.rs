//! Query command: run one statement and print its rows

use anyhow::{bail, Context, Result};
use mnemosyne::graph::{GraphValue, Params};
use mnemosyne::output::{output_json, JsonResponse};
use mnemosyne::{with_session, GraphStore, MnemoConfig, QueryResult, SqliteGraphStore};
use serde_json::Value;
use std::path::Path;

use crate::cli::StoreArgs;

pub fn run(
    args: &StoreArgs,
    sql: &str,
    raw_params: &[String],
    config_file: Option<&Path>,
) -> Result<bool> {
    let config = MnemoConfig::load(None, config_file, Some(&args.overrides()))
        .context("Failed to load configuration")?;
    let params = parse_params(raw_params)?;

    let mut store = SqliteGraphStore::new(config.store);
    let result = with_session(&mut store, |s| s.execute_query(sql, Some(&params), None))
        .context("Failed to connect to graph store")??;

    if args.json {
        output_json(&JsonResponse::new(&result, &result.trace_id))?;
    } else {
        print_rows(&result);
    }
    Ok(true)
}

/// `key=value` pairs; the value is JSON when it parses as JSON, text otherwise.
fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Parameter '{}' is not KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Parameter '{}' has an empty name", pair);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

fn print_rows(result: &QueryResult) {
    if !result.columns.is_empty() {
        println!("{}", result.columns.join("\t"));
    }
    for row in &result.rows {
        let cells: Vec<String> = result
            .columns
            .iter()
            .map(|c| row.get(c).map(render).unwrap_or_default())
            .collect();
        println!("{}", cells.join("\t"));
    }
    if result.columns.is_empty() {
        println!("{} rows affected", result.rows_affected);
    } else {
        println!("({} rows, {:.1}ms)", result.row_count, result.execution_time_ms);
    }
}

fn render(value: &GraphValue) -> String {
    match value {
        GraphValue::Scalar(Value::String(s)) => s.clone(),
        GraphValue::Scalar(Value::Null) => "NULL".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params_json_then_text() {
        let params = parse_params(&[
            "n=3".to_string(),
            "name=helper".to_string(),
            "flag=true".to_string(),
            "q=\"quoted\"".to_string(),
        ])
        .unwrap();
        assert_eq!(params["n"], Value::from(3));
        assert_eq!(params["name"], Value::from("helper"));
        assert_eq!(params["flag"], Value::Bool(true));
        assert_eq!(params["q"], Value::from("quoted"));
    }

    #[test]
    fn test_parse_params_rejects_missing_equals() {
        assert!(parse_params(&["oops".to_string()]).is_err());
        assert!(parse_params(&["=1".to_string()]).is_err());
    }
}
