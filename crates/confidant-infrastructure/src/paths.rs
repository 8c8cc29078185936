//! Path management for the Confidant data directory.

use confidant_core::{ConfidantError, Result};
use std::path::{Path, PathBuf};

/// Resolves every file the server persists.
///
/// # Directory Structure
///
/// ```text
/// <data dir>/                  # e.g. ~/.local/share/confidant
/// ├── config.toml              # Chat configuration
/// ├── prompts/
/// │   └── prompt.md            # Global pre-prompt
/// └── personas/
///     ├── order.json           # Display order
///     └── <persona id>/
///         ├── persona.md       # Persona text
///         └── memory.json      # Conversation log
/// ```
#[derive(Debug, Clone)]
pub struct ConfidantPaths {
    root: PathBuf,
}

impl ConfidantPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform data directory, e.g. `~/.local/share/confidant` on Linux.
    pub fn default_root() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("confidant"))
            .ok_or_else(|| ConfidantError::config("Cannot determine the data directory"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn prompt_file(&self) -> PathBuf {
        self.root.join("prompts").join("prompt.md")
    }

    pub fn personas_dir(&self) -> PathBuf {
        self.root.join("personas")
    }

    pub fn order_file(&self) -> PathBuf {
        self.personas_dir().join("order.json")
    }

    /// Callers must validate `id` first; it is joined as a path segment.
    pub fn persona_dir(&self, id: &str) -> PathBuf {
        self.personas_dir().join(id)
    }

    pub fn persona_file(&self, id: &str) -> PathBuf {
        self.persona_dir(id).join("persona.md")
    }

    pub fn memory_file(&self, id: &str) -> PathBuf {
        self.persona_dir(id).join("memory.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = ConfidantPaths::new("/data");
        assert_eq!(paths.config_file(), PathBuf::from("/data/config.toml"));
        assert_eq!(paths.prompt_file(), PathBuf::from("/data/prompts/prompt.md"));
        assert_eq!(paths.order_file(), PathBuf::from("/data/personas/order.json"));
        assert_eq!(
            paths.memory_file("alice"),
            PathBuf::from("/data/personas/alice/memory.json")
        );
    }
}
