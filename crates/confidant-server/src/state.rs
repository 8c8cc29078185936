use confidant_application::{CancelHandler, ChatOrchestrator, ConversationService};
use confidant_core::Result;
use confidant_core::completion::CompletionService;
use confidant_core::config::ConfigRepository;
use confidant_core::conversation::TurnLog;
use confidant_core::persona::{PersonaRepository, PromptRepository};
use confidant_infrastructure::{
    ConfidantPaths, FileConfigRepository, FilePersonaRepository, FilePromptRepository, FileTurnLog,
};
use std::sync::Arc;

/// Shared handler state. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub cancel_handler: Arc<CancelHandler>,
    pub conversations: Arc<ConversationService>,
    pub personas: Arc<dyn PersonaRepository>,
    pub prompts: Arc<dyn PromptRepository>,
}

impl AppState {
    /// Wires the file-backed stores under `paths` to `completion`.
    pub fn new(paths: ConfidantPaths, completion: Arc<dyn CompletionService>) -> Self {
        let turn_log: Arc<dyn TurnLog> = Arc::new(FileTurnLog::new(paths.clone()));
        let personas: Arc<dyn PersonaRepository> = Arc::new(FilePersonaRepository::new(paths.clone()));
        let prompts: Arc<dyn PromptRepository> = Arc::new(FilePromptRepository::new(&paths));
        let config: Arc<dyn ConfigRepository> = Arc::new(FileConfigRepository::new(&paths));

        Self {
            orchestrator: Arc::new(ChatOrchestrator::new(
                turn_log.clone(),
                personas.clone(),
                prompts.clone(),
                config.clone(),
                completion,
            )),
            cancel_handler: Arc::new(CancelHandler::new(
                turn_log.clone(),
                personas.clone(),
                config.clone(),
            )),
            conversations: Arc::new(ConversationService::new(turn_log, personas.clone(), config)),
            personas,
            prompts,
        }
    }

    /// Creates the config file, the pre-prompt and the default persona if missing.
    pub async fn bootstrap(&self) -> Result<()> {
        self.conversations.config().await?;
        self.prompts.get().await?;
        self.personas.ensure_default().await?;
        tracing::info!("data directory ready");
        Ok(())
    }
}
