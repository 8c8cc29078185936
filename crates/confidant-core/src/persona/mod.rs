//! Persona domain.

pub mod model;
pub mod repository;

pub use model::{
    DEFAULT_PERSONA_ID, DEFAULT_PERSONA_NAME, DEFAULT_PERSONA_TEXT, PersonaSummary,
    ensure_name_heading, extract_persona_name, is_valid_persona_id, persona_template,
};
pub use repository::{PersonaRepository, PromptRepository};
