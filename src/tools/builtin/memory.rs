use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{FieldKind, FieldSpec, ObjectSpec, SideEffect, Tool, ToolError, ToolOutput};

/// In-process key/value fact store shared by the remember/recall tools.
#[derive(Default)]
pub struct FactStore {
    facts: Mutex<HashMap<String, String>>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, key: &str, value: &str) {
        self.facts
            .lock()
            .expect("fact store poisoned")
            .insert(key.to_string(), value.to_string());
    }

    pub fn retrieve(&self, key: &str) -> Option<String> {
        self.facts
            .lock()
            .expect("fact store poisoned")
            .get(key)
            .cloned()
    }
}

pub struct Remember {
    facts: Arc<FactStore>,
}

impl Remember {
    pub fn new(facts: Arc<FactStore>) -> Self {
        Self { facts }
    }
}

#[async_trait]
impl Tool for Remember {
    fn name(&self) -> String {
        "remember".into()
    }

    fn description(&self) -> String {
        "Store a fact under a key for later recall.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![
            FieldSpec::required("key", FieldKind::String, "Fact name"),
            FieldSpec::required("value", FieldKind::String, "Fact content"),
        ])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Write
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let key = params
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("key".into()))?;
        let value = params
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("value".into()))?;
        self.facts.store(key, value);
        Ok(ToolOutput::message(format!("Remembered {key}")).with_data(json!({"key": key})))
    }
}

pub struct Recall {
    facts: Arc<FactStore>,
}

impl Recall {
    pub fn new(facts: Arc<FactStore>) -> Self {
        Self { facts }
    }
}

#[async_trait]
impl Tool for Recall {
    fn name(&self) -> String {
        "recall".into()
    }

    fn description(&self) -> String {
        "Retrieve a fact previously stored with remember.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![FieldSpec::required(
            "key",
            FieldKind::String,
            "Fact name",
        )])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Read
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let key = params
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("key".into()))?;
        match self.facts.retrieve(key) {
            Some(value) => Ok(ToolOutput::message(value.clone())
                .with_data(json!({"key": key, "value": value}))),
            None => Err(ToolError::msg(format!("No fact stored under {key}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remember_then_recall() {
        let facts = Arc::new(FactStore::new());
        Remember::new(facts.clone())
            .call(json!({"key": "color", "value": "purple"}))
            .await
            .unwrap();

        let out = Recall::new(facts)
            .call(json!({"key": "color"}))
            .await
            .unwrap();
        assert_eq!(out.data["value"], "purple");
    }

    #[tokio::test]
    async fn test_recall_unknown_key_fails() {
        let facts = Arc::new(FactStore::new());
        assert!(Recall::new(facts).call(json!({"key": "nope"})).await.is_err());
    }
}
