//! Built-in tool handlers registered at bootstrap.
//!
//! Every filesystem tool resolves paths inside the configured workspace
//! and refuses traversal outside it.

mod workspace;
pub use workspace::*;

mod filesystem;
pub use filesystem::*;

mod search;
pub use search::*;

mod command;
pub use command::*;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

use std::sync::Arc;

use crate::config::Settings;

use super::ToolRegistry;

/// Register the standard tool set for a workspace.
pub fn register_builtin_tools(registry: &mut ToolRegistry, settings: &Settings) {
    let workspace = Arc::new(Workspace::new(
        settings.agent.workspace.clone(),
        settings.security.max_file_size,
    ));
    let facts = Arc::new(FactStore::new());

    registry.register(Arc::new(WriteFile::new(workspace.clone())));
    registry.register(Arc::new(EditFile::new(workspace.clone())));
    registry.register(Arc::new(ReadFile::new(workspace.clone())));
    registry.register(Arc::new(DeleteFile::new(workspace.clone())));
    registry.register(Arc::new(CreateFolder::new(workspace.clone())));
    registry.register(Arc::new(ListDirectory::new(workspace.clone())));
    registry.register(Arc::new(FindFiles::new(workspace.clone())));
    registry.register(Arc::new(SearchContent::new(workspace.clone())));
    registry.register(Arc::new(RunCommand::default()));
    registry.register(Arc::new(ParseJson));
    registry.register(Arc::new(ParseCsv));
    registry.register(Arc::new(Remember::new(facts.clone())));
    registry.register(Arc::new(Recall::new(facts)));
}
