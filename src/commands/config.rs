use crate::config::CONFIG_KEYS;
use crate::state::Context;

/// Show or change the analysis configuration (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "model | reasoning_effort | temperature | max_output_tokens | ..."]
    key: Option<String>,
    #[description = "New value (empty clears optional keys)"] value: Option<String>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (key.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = ctx.data().analysis_config.read().await;
            ctx.say(format!("**Analysis Configuration:**\n{}", *config))
                .await?;
        }
        // Set a key
        (Some(key), Some(value)) => {
            let mut config = ctx.data().analysis_config.write().await;
            match config.set(key, &value) {
                Ok(()) => {
                    tracing::info!(
                        user = %ctx.author().name,
                        key,
                        value = %value,
                        "Config changed"
                    );
                    ctx.say(format!("`{}` set to `{}`", key, value)).await?;
                }
                Err(e) => {
                    ctx.say(format!("Could not set `{}`: {}", key, e)).await?;
                }
            }
        }
        (Some(_), None) => {
            ctx.say(format!(
                "Provide both `key` and `value`. Keys: {}",
                CONFIG_KEYS.join(", ")
            ))
            .await?;
        }
    }

    Ok(())
}
