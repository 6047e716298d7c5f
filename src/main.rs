mod analysis;
mod commands;
mod config;
mod error;
mod export;
mod llm;
mod sequencing;
mod state;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, Level};

use analysis::prompts::PromptSet;
use config::AnalysisConfig;
use llm::LlmClient;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();

    let level = dotenv::var("LOG_LEVEL")
        .ok()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::DEBUG);
    tracing_subscriber::fmt().with_max_level(level).init();

    let token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init LLM client
    let llm_client = Arc::new(LlmClient::from_env()?);
    info!("LLM client initialized");

    let analysis_config = AnalysisConfig::from_env()?;
    info!(
        model = %analysis_config.model,
        effort = %analysis_config.reasoning_effort,
        "Analysis config loaded"
    );

    let prompts = match dotenv::var("PROMPTS_DIR") {
        Ok(dir) => PromptSet::load(&PathBuf::from(dir))?,
        Err(_) => PromptSet::default(),
    };

    let export_dir = PathBuf::from(
        dotenv::var("EXPORT_DIR").unwrap_or_else(|_| "./data/analyses".to_string()),
    );
    std::fs::create_dir_all(&export_dir)
        .with_context(|| format!("Failed to create {}", export_dir.display()))?;
    info!("Exports go to {:?}", export_dir);

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let app_state = AppState {
        llm: llm_client,
        prompts: Arc::new(prompts),
        analysis_config: Arc::new(RwLock::new(analysis_config)),
        export_dir,
        admin_ids,
    };

    let intents =
        serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::sequenz()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting sequence analysis bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
