use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::{Tool, ToolResult};
use crate::traits::ToolExecutor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Name-indexed set of tools, usable directly as the pipeline's executor.
pub struct ToolRegistryImpl {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistryImpl {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistryImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistryImpl {
    async fn execute(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        ctx: ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        tool.execute(ctx, params).await
    }
}
