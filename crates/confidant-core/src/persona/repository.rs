//! Persona and pre-prompt repository traits.

use super::model::PersonaSummary;
use crate::error::Result;

/// An abstract repository for managing personas.
///
/// A persona doubles as a conversation: implementations own the storage
/// unit (directory, row, ...) that the turn log of the same id lives in.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Reject ids that fail [`super::is_valid_persona_id`] with `Validation`
/// - Report unknown ids with `NotFound`
#[async_trait::async_trait]
pub trait PersonaRepository: Send + Sync {
    /// Lists personas in display order.
    async fn list(&self) -> Result<Vec<PersonaSummary>>;

    /// Creates a persona with a templated text and an empty log.
    async fn create(&self, id: &str, display_name: &str) -> Result<PersonaSummary>;

    /// Deletes a persona and its log.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Returns whether a persona with this id exists. Invalid ids never exist.
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Returns the persona text.
    async fn get_content(&self, id: &str) -> Result<String>;

    /// Replaces the persona text.
    async fn set_content(&self, id: &str, content: &str) -> Result<()>;

    /// Persists a display order. Returns the sanitized order actually stored.
    async fn set_order(&self, order: &[String]) -> Result<Vec<String>>;

    /// Creates the default persona if it is missing.
    async fn ensure_default(&self) -> Result<()>;
}

/// Storage of the global pre-prompt shown before every persona.
#[async_trait::async_trait]
pub trait PromptRepository: Send + Sync {
    /// Returns the pre-prompt, creating the default one on first access.
    async fn get(&self) -> Result<String>;

    /// Replaces the pre-prompt.
    async fn set(&self, content: &str) -> Result<()>;
}
