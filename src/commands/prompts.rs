use crate::analysis::prompts::PromptSet;
use crate::state::Context;

/// List instruction texts and whether they are overridden (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn prompts(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    if !ctx.data().is_admin(ctx.author().id.get()) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    let overridden = &ctx.data().prompts.overridden;
    let mut output = String::from("**Prompt Texts**\n");
    for key in PromptSet::keys() {
        let source = if overridden.contains(&key) {
            "override"
        } else {
            "built-in"
        };
        output.push_str(&format!("  - `{}` ({})\n", key, source));
    }

    ctx.say(output).await?;
    Ok(())
}
