use std::collections::BTreeMap;
use std::sync::Arc;

use super::Tool;

/// Name-to-handler map, populated at bootstrap and immutable afterwards.
///
/// There is no dynamic handler loading at runtime: a tool call either hits
/// a registered entry or is rejected by the router as unknown.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("Tool {name} registered twice; later registration wins");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The tools block embedded into system prompts.
    pub fn describe_all(&self) -> String {
        let mut out = String::from(
            "AVAILABLE TOOLS (call with format: TOOL: tool_name | PARAMS: {json_params}):\n\n",
        );
        for tool in self.tools.values() {
            out.push_str(&tool.to_plain_description());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use crate::tools::{SideEffect, ToolError, ToolOutput};

    use super::*;

    struct Dummy(&'static str);

    #[async_trait]
    impl Tool for Dummy {
        fn name(&self) -> String {
            self.0.into()
        }

        fn description(&self) -> String {
            "does nothing".into()
        }

        fn side_effect(&self) -> SideEffect {
            SideEffect::Read
        }

        async fn call(&self, _params: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::message("ok"))
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Dummy("ping")));
        registry.register(Arc::new(Dummy("echo")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("ping").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo".to_string(), "ping".to_string()]);
    }

    #[test]
    fn test_describe_all_lists_every_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Dummy("ping")));
        let description = registry.describe_all();
        assert!(description.contains("ping"));
        assert!(description.contains("TOOL: tool_name | PARAMS:"));
    }
}
