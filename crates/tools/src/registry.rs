//! In-memory catalog of tool definitions.
//!
//! The registry keeps tools in catalog order. It only stores definitions;
//! live backends belong to the [`ToolGateway`](crate::gateway::ToolGateway).

use std::collections::{BTreeMap, HashSet};

use toolchat_core::error::RegistryError;
use toolchat_core::tool::Tool;

/// The set of known tools, keyed by id, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    /// Build a registry, rejecting invalid or duplicate ids.
    pub fn new(tools: Vec<Tool>) -> Result<Self, RegistryError> {
        validate(&tools)?;
        Ok(Self { tools })
    }

    /// All tools in catalog order.
    pub fn list(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// Replace the whole catalog. The previous catalog is kept on error.
    pub fn replace_all(&mut self, tools: Vec<Tool>) -> Result<(), RegistryError> {
        validate(&tools)?;
        self.tools = tools;
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<&Tool, RegistryError> {
        let tool = self.get_mut(id)?;
        tool.enabled = enabled;
        Ok(tool)
    }

    /// Set extra launch arguments. `None` restores the package defaults.
    pub fn set_args(&mut self, id: &str, args: Option<Vec<String>>) -> Result<&Tool, RegistryError> {
        let tool = self.get_mut(id)?;
        tool.args = args;
        Ok(tool)
    }

    pub fn set_env(
        &mut self,
        id: &str,
        env: BTreeMap<String, String>,
    ) -> Result<&Tool, RegistryError> {
        let tool = self.get_mut(id)?;
        tool.env = env;
        Ok(tool)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Tool, RegistryError> {
        self.tools
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RegistryError::ToolNotFound(id.to_string()))
    }
}

/// Tool ids prefix operation names, so they must be non-empty and free of `_`.
fn validate(tools: &[Tool]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for tool in tools {
        if tool.id.is_empty() || tool.id.contains('_') {
            return Err(RegistryError::InvalidToolId(tool.id.clone()));
        }
        if !seen.insert(tool.id.as_str()) {
            return Err(RegistryError::DuplicateTool(tool.id.clone()));
        }
    }
    Ok(())
}
