use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{FieldKind, FieldSpec, ObjectSpec, SideEffect, Tool, ToolError, ToolOutput};

/// Parse a JSON string and return the decoded value.
pub struct ParseJson;

#[async_trait]
impl Tool for ParseJson {
    fn name(&self) -> String {
        "parse_json".into()
    }

    fn description(&self) -> String {
        "Parse a JSON string and return the decoded structure.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![FieldSpec::required(
            "data",
            FieldKind::String,
            "Raw JSON text",
        )])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Read
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let raw = params
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("data".into()))?;
        let parsed: Value = serde_json::from_str(raw)?;
        Ok(ToolOutput::message("Parsed JSON successfully").with_data(json!({"parsed": parsed})))
    }
}

/// Parse CSV text into a list of header-keyed records.
pub struct ParseCsv;

#[async_trait]
impl Tool for ParseCsv {
    fn name(&self) -> String {
        "parse_csv".into()
    }

    fn description(&self) -> String {
        "Parse CSV text with a header row into a list of records.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![FieldSpec::required(
            "data",
            FieldKind::String,
            "Raw CSV text",
        )])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Read
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let raw = params
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("data".into()))?;

        let mut reader = csv::Reader::from_reader(raw.as_bytes());
        let headers = reader
            .headers()
            .map_err(ToolError::execution_error)?
            .clone();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(ToolError::execution_error)?;
            let record: serde_json::Map<String, Value> = headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                .collect();
            records.push(Value::Object(record));
        }

        Ok(
            ToolOutput::message(format!("Parsed {} CSV records", records.len())).with_data(json!({
                "headers": headers.iter().collect::<Vec<_>>(),
                "records": records,
                "count": records.len(),
            })),
        )
    }
}
