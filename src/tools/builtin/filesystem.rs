use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{
    path_only_spec, FieldKind, FieldSpec, ObjectSpec, SideEffect, Tool, ToolError, ToolOutput,
};

use super::Workspace;

fn param_str<'a>(params: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::MissingParameter(name.into()))
}

/// Create a new file (or overwrite an existing one) with given content.
pub struct WriteFile {
    workspace: Arc<Workspace>,
}

impl WriteFile {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> String {
        "write_file".into()
    }

    fn description(&self) -> String {
        "Create or overwrite a file with content. Path is workspace-relative.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![
            FieldSpec::required("path", FieldKind::String, "Workspace-relative path"),
            FieldSpec::required("content", FieldKind::String, "Full file contents"),
        ])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Write
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let path = param_str(&params, "path")?;
        let content = param_str(&params, "content")?;
        self.workspace.check_size(content.len())?;

        let full_path = self.workspace.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ToolError::execution_error)?;
        }
        tokio::fs::write(&full_path, content)
            .await
            .map_err(ToolError::execution_error)?;

        Ok(
            ToolOutput::message(format!("Wrote {} bytes to {path}", content.len())).with_data(
                json!({"path": path, "bytes": content.len()}),
            ),
        )
    }
}

/// Modify an existing file in place.
pub struct EditFile {
    workspace: Arc<Workspace>,
}

impl EditFile {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for EditFile {
    fn name(&self) -> String {
        "edit_file".into()
    }

    fn description(&self) -> String {
        "Edit an existing file. Modes: append, prepend, replace (all occurrences, \
         needs search+replace), replace_once (first occurrence)."
            .into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![
            FieldSpec::required("path", FieldKind::String, "Workspace-relative path"),
            FieldSpec::required("mode", FieldKind::String, "Edit mode"),
            FieldSpec::optional("content", FieldKind::String, "Content for append/prepend"),
            FieldSpec::optional("search", FieldKind::String, "Text to find"),
            FieldSpec::optional("replace", FieldKind::String, "Replacement text"),
        ])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Write
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let path = param_str(&params, "path")?;
        let mode = param_str(&params, "mode")?;
        let full_path = self.workspace.resolve(path)?;

        let existing = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(ToolError::execution_error)?;

        let updated = match mode {
            "append" => {
                let content = param_str(&params, "content")?;
                format!("{existing}{content}")
            }
            "prepend" => {
                let content = param_str(&params, "content")?;
                format!("{content}{existing}")
            }
            "replace" => {
                let search = param_str(&params, "search")?;
                let replace = param_str(&params, "replace")?;
                existing.replace(search, replace)
            }
            "replace_once" => {
                let search = param_str(&params, "search")?;
                let replace = param_str(&params, "replace")?;
                existing.replacen(search, replace, 1)
            }
            other => {
                return Err(ToolError::InvalidParameter {
                    name: "mode".into(),
                    expected: format!("append|prepend|replace|replace_once, got {other}"),
                })
            }
        };

        self.workspace.check_size(updated.len())?;
        tokio::fs::write(&full_path, &updated)
            .await
            .map_err(ToolError::execution_error)?;

        Ok(ToolOutput::message(format!("Edited {path} ({mode})"))
            .with_data(json!({"path": path, "mode": mode, "bytes": updated.len()})))
    }
}

pub struct ReadFile {
    workspace: Arc<Workspace>,
}

impl ReadFile {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> String {
        "read_file".into()
    }

    fn description(&self) -> String {
        "Read file contents.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        path_only_spec()
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Read
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let path = param_str(&params, "path")?;
        let full_path = self.workspace.resolve(path)?;
        let content = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(ToolError::execution_error)?;
        Ok(ToolOutput::message(content.clone())
            .with_data(json!({"path": path, "content": content})))
    }
}

pub struct DeleteFile {
    workspace: Arc<Workspace>,
}

impl DeleteFile {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> String {
        "delete_file".into()
    }

    fn description(&self) -> String {
        "Delete a file.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        path_only_spec()
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Write
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let path = param_str(&params, "path")?;
        let full_path = self.workspace.resolve(path)?;
        tokio::fs::remove_file(&full_path)
            .await
            .map_err(ToolError::execution_error)?;
        Ok(ToolOutput::message(format!("Deleted {path}")).with_data(json!({"path": path})))
    }
}

pub struct CreateFolder {
    workspace: Arc<Workspace>,
}

impl CreateFolder {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for CreateFolder {
    fn name(&self) -> String {
        "create_folder".into()
    }

    fn description(&self) -> String {
        "Create a directory, including missing parents.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        path_only_spec()
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Write
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let path = param_str(&params, "path")?;
        let full_path = self.workspace.resolve(path)?;
        tokio::fs::create_dir_all(&full_path)
            .await
            .map_err(ToolError::execution_error)?;
        Ok(ToolOutput::message(format!("Created folder {path}")).with_data(json!({"path": path})))
    }
}

pub struct ListDirectory {
    workspace: Arc<Workspace>,
}

impl ListDirectory {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListDirectory {
    fn name(&self) -> String {
        "list_directory".into()
    }

    fn description(&self) -> String {
        "List files and folders in a directory.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![FieldSpec::optional(
            "path",
            FieldKind::String,
            "Workspace-relative directory, defaults to the workspace root",
        )])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Read
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let path = params
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".");
        let full_path = self.workspace.resolve(path)?;

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&full_path)
            .await
            .map_err(ToolError::execution_error)?;
        while let Some(entry) = reader.next_entry().await.map_err(ToolError::execution_error)? {
            let file_type = entry.file_type().await.map_err(ToolError::execution_error)?;
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "type": if file_type.is_dir() { "directory" } else { "file" },
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        let names: Vec<String> = entries
            .iter()
            .filter_map(|e| e["name"].as_str().map(String::from))
            .collect();
        Ok(ToolOutput::message(format!(
            "{} entries in {path}: {}",
            entries.len(),
            names.join(", ")
        ))
        .with_data(json!({"path": path, "entries": entries})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(dir: &tempfile::TempDir) -> Arc<Workspace> {
        Arc::new(Workspace::new(dir.path().to_path_buf(), 1024 * 1024))
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);

        let out = WriteFile::new(ws.clone())
            .call(json!({"path": "nested/hello.txt", "content": "Hello World"}))
            .await
            .unwrap();
        assert_eq!(out.data["bytes"], 11);

        let out = ReadFile::new(ws)
            .call(json!({"path": "nested/hello.txt"}))
            .await
            .unwrap();
        assert_eq!(out.data["content"], "Hello World");
    }

    #[tokio::test]
    async fn test_edit_modes() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        WriteFile::new(ws.clone())
            .call(json!({"path": "f.txt", "content": "b"}))
            .await
            .unwrap();

        let edit = EditFile::new(ws.clone());
        edit.call(json!({"path": "f.txt", "mode": "append", "content": "c"}))
            .await
            .unwrap();
        edit.call(json!({"path": "f.txt", "mode": "prepend", "content": "a"}))
            .await
            .unwrap();
        edit.call(json!({"path": "f.txt", "mode": "replace", "search": "b", "replace": "x"}))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "axc");
    }

    #[tokio::test]
    async fn test_edit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = EditFile::new(workspace(&dir))
            .call(json!({"path": "absent.txt", "mode": "append", "content": "x"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_create_folder() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);

        CreateFolder::new(ws.clone())
            .call(json!({"path": "sub/dir"}))
            .await
            .unwrap();
        assert!(dir.path().join("sub/dir").is_dir());

        WriteFile::new(ws.clone())
            .call(json!({"path": "gone.txt", "content": "x"}))
            .await
            .unwrap();
        DeleteFile::new(ws)
            .call(json!({"path": "gone.txt"}))
            .await
            .unwrap();
        assert!(!dir.path().join("gone.txt").exists());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        WriteFile::new(ws.clone())
            .call(json!({"path": "a.txt", "content": "1"}))
            .await
            .unwrap();
        CreateFolder::new(ws.clone())
            .call(json!({"path": "b"}))
            .await
            .unwrap();

        let out = ListDirectory::new(ws).call(json!({"path": "."})).await.unwrap();
        let entries = out.data["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "a.txt");
        assert_eq!(entries[0]["type"], "file");
        assert_eq!(entries[1]["type"], "directory");
    }

    #[tokio::test]
    async fn test_oversized_write_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::new(dir.path().to_path_buf(), 4));
        let result = WriteFile::new(ws)
            .call(json!({"path": "big.txt", "content": "too large"}))
            .await;
        assert!(result.is_err());
    }
}
