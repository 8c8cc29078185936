//! Directory-based PersonaRepository implementation.
//!
//! One directory per persona under `personas/`, plus an optional
//! `order.json` holding the display order.

use crate::paths::ConfidantPaths;
use crate::storage::{AtomicFile, run_blocking, write_atomic};
use async_trait::async_trait;
use confidant_core::conversation::{ConversationLog, LogDocument};
use confidant_core::persona::{
    DEFAULT_PERSONA_ID, DEFAULT_PERSONA_NAME, DEFAULT_PERSONA_TEXT, PersonaRepository,
    PersonaSummary, ensure_name_heading, extract_persona_name, is_valid_persona_id,
    persona_template,
};
use confidant_core::{ConfidantError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;

/// Directory-based persona repository.
///
/// Directory structure:
/// ```text
/// personas/
/// ├── order.json
/// ├── default/
/// │   ├── persona.md
/// │   └── memory.json
/// └── <id>/
/// ```
#[derive(Debug, Clone)]
pub struct FilePersonaRepository {
    paths: ConfidantPaths,
}

impl FilePersonaRepository {
    pub fn new(paths: ConfidantPaths) -> Self {
        Self { paths }
    }

    fn order_file(&self) -> AtomicFile<Vec<String>> {
        AtomicFile::json(self.paths.order_file())
    }

    fn require_valid(id: &str) -> Result<()> {
        if is_valid_persona_id(id) {
            Ok(())
        } else {
            Err(ConfidantError::validation("persona id is invalid"))
        }
    }

    fn require_existing(&self, id: &str) -> Result<()> {
        Self::require_valid(id)?;
        if self.paths.persona_dir(id).is_dir() {
            Ok(())
        } else {
            Err(ConfidantError::not_found("persona", id))
        }
    }

    fn write_empty_log(&self, id: &str) -> Result<()> {
        AtomicFile::<LogDocument>::json(self.paths.memory_file(id))
            .save(&LogDocument::from(&ConversationLog::empty()))?;
        Ok(())
    }

    /// Stored order, with invalid and duplicate entries dropped.
    ///
    /// An unreadable order file counts as no order at all.
    fn load_order(&self) -> Result<Vec<String>> {
        let Some(raw) = self.order_file().load_raw()? else {
            return Ok(Vec::new());
        };
        let ids = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Ok(_) | Err(_) => {
                tracing::warn!("order.json is malformed, ignoring it");
                Vec::new()
            }
        };
        Ok(dedup_valid(ids))
    }

    fn scan(&self) -> Result<Vec<PersonaSummary>> {
        let dir = self.paths.personas_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut personas = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            if !is_valid_persona_id(&id) {
                continue;
            }
            let Ok(content) = fs::read_to_string(self.paths.persona_file(&id)) else {
                continue;
            };
            let name = extract_persona_name(&content).unwrap_or_else(|| id.clone());
            personas.push(PersonaSummary { id, name });
        }
        Ok(personas)
    }

    fn list_sync(&self) -> Result<Vec<PersonaSummary>> {
        let mut by_id: HashMap<String, PersonaSummary> = self
            .scan()?
            .into_iter()
            .map(|persona| (persona.id.clone(), persona))
            .collect();

        let mut ordered: Vec<PersonaSummary> = self
            .load_order()?
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let mut remaining: Vec<PersonaSummary> = by_id.into_values().collect();
        remaining.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered.extend(remaining);
        Ok(ordered)
    }

    fn create_sync(&self, id: &str, display_name: &str) -> Result<PersonaSummary> {
        Self::require_valid(id)?;
        let name = display_name.trim();
        if name.is_empty() {
            return Err(ConfidantError::validation("persona name is required"));
        }
        let dir = self.paths.persona_dir(id);
        if dir.exists() {
            return Err(ConfidantError::validation("persona already exists"));
        }

        fs::create_dir_all(&dir)?;
        write_atomic(&self.paths.persona_file(id), persona_template(name).as_bytes())?;
        self.write_empty_log(id)?;

        let order_file = self.order_file();
        if order_file.path().exists() {
            let _lock = order_file.lock()?;
            let mut order = self.load_order()?;
            order.push(id.to_string());
            order_file.save(&order)?;
        }

        tracing::info!(persona_id = id, "created persona");
        Ok(PersonaSummary {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    fn delete_sync(&self, id: &str) -> Result<()> {
        self.require_existing(id)?;
        fs::remove_dir_all(self.paths.persona_dir(id))?;

        let order_file = self.order_file();
        if order_file.path().exists() {
            let _lock = order_file.lock()?;
            let order: Vec<String> = self
                .load_order()?
                .into_iter()
                .filter(|existing| existing != id)
                .collect();
            order_file.save(&order)?;
        }

        tracing::info!(persona_id = id, "deleted persona");
        Ok(())
    }

    fn set_order_sync(&self, order: &[String]) -> Result<Vec<String>> {
        let known: HashSet<String> = self.scan()?.into_iter().map(|p| p.id).collect();
        let mut sanitized: Vec<String> = dedup_valid(order.to_vec())
            .into_iter()
            .filter(|id| known.contains(id))
            .collect();

        let listed: HashSet<String> = sanitized.iter().cloned().collect();
        let mut missing: Vec<PersonaSummary> = self
            .scan()?
            .into_iter()
            .filter(|persona| !listed.contains(&persona.id))
            .collect();
        missing.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        sanitized.extend(missing.into_iter().map(|persona| persona.id));

        let order_file = self.order_file();
        let _lock = order_file.lock()?;
        order_file.save(&sanitized)?;
        Ok(sanitized)
    }

    fn ensure_default_sync(&self) -> Result<()> {
        let id = DEFAULT_PERSONA_ID;
        fs::create_dir_all(self.paths.persona_dir(id))?;

        let persona_path = self.paths.persona_file(id);
        let current = match fs::read_to_string(&persona_path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let content = current.as_deref().unwrap_or(DEFAULT_PERSONA_TEXT);
        let with_name = ensure_name_heading(content, DEFAULT_PERSONA_NAME);
        if current.as_deref() != Some(with_name.as_str()) {
            write_atomic(&persona_path, with_name.as_bytes())?;
        }

        if !self.paths.memory_file(id).exists() {
            self.write_empty_log(id)?;
            tracing::info!("created default persona");
        }
        Ok(())
    }
}

fn dedup_valid(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| is_valid_persona_id(id) && seen.insert(id.clone()))
        .collect()
}

#[async_trait]
impl PersonaRepository for FilePersonaRepository {
    async fn list(&self) -> Result<Vec<PersonaSummary>> {
        let repo = self.clone();
        run_blocking(move || repo.list_sync()).await
    }

    async fn create(&self, id: &str, display_name: &str) -> Result<PersonaSummary> {
        let repo = self.clone();
        let (id, display_name) = (id.to_string(), display_name.to_string());
        run_blocking(move || repo.create_sync(&id, &display_name)).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let repo = self.clone();
        let id = id.to_string();
        run_blocking(move || repo.delete_sync(&id)).await
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(is_valid_persona_id(id) && self.paths.persona_dir(id).is_dir())
    }

    async fn get_content(&self, id: &str) -> Result<String> {
        self.require_existing(id)?;
        match tokio::fs::read_to_string(self.paths.persona_file(id)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_content(&self, id: &str, content: &str) -> Result<()> {
        self.require_existing(id)?;
        let path = self.paths.persona_file(id);
        let content = content.to_string();
        run_blocking(move || Ok(write_atomic(&path, content.as_bytes())?)).await
    }

    async fn set_order(&self, order: &[String]) -> Result<Vec<String>> {
        let repo = self.clone();
        let order = order.to_vec();
        run_blocking(move || repo.set_order_sync(&order)).await
    }

    async fn ensure_default(&self) -> Result<()> {
        let repo = self.clone();
        run_blocking(move || repo.ensure_default_sync()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FilePersonaRepository, ConfidantPaths) {
        let temp_dir = TempDir::new().unwrap();
        let paths = ConfidantPaths::new(temp_dir.path());
        (temp_dir, FilePersonaRepository::new(paths.clone()), paths)
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_repository() {
        let (_tmp, repo, _) = setup();
        assert!(repo.list().await.unwrap().is_empty());
        assert!(!repo.exists("default").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_writes_template_and_empty_log() {
        let (_tmp, repo, paths) = setup();
        let created = repo.create("alice", "  Alice ").await.unwrap();
        assert_eq!(created.name, "Alice");

        let content = repo.get_content("alice").await.unwrap();
        assert_eq!(extract_persona_name(&content).as_deref(), Some("Alice"));
        let memory = fs::read_to_string(paths.memory_file("alice")).unwrap();
        let memory: Value = serde_json::from_str(&memory).unwrap();
        assert_eq!(memory, serde_json::json!({"status": "done", "turns": []}));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (_tmp, repo, _) = setup();
        assert!(repo.create("bad id!", "x").await.unwrap_err().is_validation());
        assert!(repo.create("ok", "   ").await.unwrap_err().is_validation());
        repo.create("ok", "Ok").await.unwrap();
        assert!(repo.create("ok", "Again").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_list_orders_by_name_then_by_order_file() {
        let (_tmp, repo, _) = setup();
        repo.create("b", "Zed").await.unwrap();
        repo.create("a", "Amy").await.unwrap();
        repo.create("c", "Mia").await.unwrap();

        let listed: Vec<String> = repo.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(listed, ["a", "c", "b"]);

        let stored = repo
            .set_order(&ids(&["c", "ghost", "c", "../x"]))
            .await
            .unwrap();
        assert_eq!(stored, ["c", "a", "b"]);

        repo.create("d", "Bob").await.unwrap();
        let listed: Vec<String> = repo.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(listed, ["c", "a", "b", "d"]);
    }

    #[tokio::test]
    async fn test_delete_removes_directory_and_order_entry() {
        let (_tmp, repo, paths) = setup();
        repo.create("a", "A").await.unwrap();
        repo.create("b", "B").await.unwrap();
        repo.set_order(&ids(&["b", "a"])).await.unwrap();

        repo.delete("b").await.unwrap();
        assert!(!paths.persona_dir("b").exists());
        let order: Vec<String> =
            serde_json::from_str(&fs::read_to_string(paths.order_file()).unwrap()).unwrap();
        assert_eq!(order, ["a"]);

        assert!(repo.delete("b").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_ensure_default_is_idempotent_and_keeps_edits() {
        let (_tmp, repo, paths) = setup();
        repo.ensure_default().await.unwrap();
        assert!(repo.exists(DEFAULT_PERSONA_ID).await.unwrap());

        repo.set_content(DEFAULT_PERSONA_ID, "just a body").await.unwrap();
        repo.ensure_default().await.unwrap();

        let content = fs::read_to_string(paths.persona_file(DEFAULT_PERSONA_ID)).unwrap();
        assert!(content.starts_with("## Name\nConfidant\n"));
        assert!(content.ends_with("just a body"));
    }

    #[tokio::test]
    async fn test_content_of_unknown_persona() {
        let (_tmp, repo, _) = setup();
        assert!(repo.get_content("nobody").await.unwrap_err().is_not_found());
        assert!(repo.set_content("nobody", "x").await.unwrap_err().is_not_found());
    }
}
