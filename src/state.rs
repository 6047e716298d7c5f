use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::analysis::prompts::PromptSet;
use crate::config::AnalysisConfig;
use crate::llm::LlmClient;

pub struct AppState {
    pub llm: Arc<LlmClient>,
    pub prompts: Arc<PromptSet>,
    /// Admins can modify this at runtime; every run takes a snapshot.
    pub analysis_config: Arc<RwLock<AnalysisConfig>>,
    pub export_dir: PathBuf,
    pub admin_ids: HashSet<u64>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
