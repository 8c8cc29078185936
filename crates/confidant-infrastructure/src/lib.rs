//! File-backed storage for Confidant: atomic files, paths and repositories.

pub mod file_config_repository;
pub mod file_persona_repository;
pub mod file_prompt_repository;
pub mod file_turn_log;
pub mod paths;
pub mod storage;

pub use crate::file_config_repository::FileConfigRepository;
pub use crate::file_persona_repository::FilePersonaRepository;
pub use crate::file_prompt_repository::FilePromptRepository;
pub use crate::file_turn_log::FileTurnLog;
pub use crate::paths::ConfidantPaths;
