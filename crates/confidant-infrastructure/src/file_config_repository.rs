//! TOML-backed chat configuration.

use crate::paths::ConfidantPaths;
use crate::storage::{AtomicFile, run_blocking};
use async_trait::async_trait;
use confidant_core::Result;
use confidant_core::config::{ChatConfig, ChatConfigPatch, ConfigRepository};

/// Stores [`ChatConfig`] as `config.toml`.
///
/// Reading is self-healing: unparseable or out-of-range content is replaced
/// by the normalized value, which is written back.
#[derive(Clone)]
pub struct FileConfigRepository {
    file: AtomicFile<ChatConfig>,
}

impl FileConfigRepository {
    pub fn new(paths: &ConfidantPaths) -> Self {
        Self {
            file: AtomicFile::toml(paths.config_file()),
        }
    }
}

/// Loads the normalized config; the flag reports whether the file must be rewritten.
fn load_normalized(file: &AtomicFile<ChatConfig>) -> Result<(ChatConfig, bool)> {
    let Some(raw) = file.load_raw()? else {
        return Ok((ChatConfig::default(), true));
    };

    let parsed = match toml::from_str::<ChatConfig>(&raw) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "config.toml is malformed, using defaults");
            ChatConfig::default()
        }
    };
    let config = parsed.normalized();
    let needs_repair = file.encode(&config)? != raw;
    Ok((config, needs_repair))
}

#[async_trait]
impl ConfigRepository for FileConfigRepository {
    async fn get(&self) -> Result<ChatConfig> {
        let file = self.file.clone();
        run_blocking(move || {
            let _lock = file.lock()?;
            let (config, needs_repair) = load_normalized(&file)?;
            if needs_repair {
                file.save(&config)?;
            }
            Ok(config)
        })
        .await
    }

    async fn update(&self, patch: ChatConfigPatch) -> Result<ChatConfig> {
        let file = self.file.clone();
        run_blocking(move || {
            let _lock = file.lock()?;
            let (current, _) = load_normalized(&file)?;
            let next = current.merged(patch);
            file.save(&next)?;
            tracing::info!(memory_turns = next.memory_turns, "chat config updated");
            Ok(next)
        })
        .await
    }
}
