use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use tracing::{error, info};

use super::{send_chunked, summarize};
use crate::analysis;
use crate::export::{self, ExportOptions};
use crate::sequencing::{split_sequences, DEFAULT_SEPARATOR};
use crate::state::Context;

/// Run a sequence analysis on a protocol
#[poise::command(slash_command, guild_only)]
pub async fn analyse(
    ctx: Context<'_>,
    #[description = "Outer context of the protocol"] outer_context: String,
    #[description = "Protocol text, sequences split by the separator"] sequences: Option<String>,
    #[description = "Protocol as a .txt attachment"] file: Option<serenity::Attachment>,
    #[description = "Separator between sequences (default [SEP])"] separator: Option<String>,
    #[description = "Keep provider metadata in the export (admin only)"] keep_meta: Option<bool>,
) -> Result<(), anyhow::Error> {
    let separator = separator.unwrap_or_else(|| DEFAULT_SEPARATOR.to_string());

    let text = match (sequences, file) {
        (_, Some(file)) => {
            let bytes = file
                .download()
                .await
                .context("Failed to download attachment")?;
            String::from_utf8(bytes).context("Attachment is not UTF-8 text")?
        }
        (Some(text), None) => text,
        (None, None) => {
            ctx.say("Provide `sequences` or attach a protocol file.")
                .await?;
            return Ok(());
        }
    };

    let sequences = split_sequences(&text, &separator);
    if sequences.is_empty() {
        ctx.say(format!(
            "No sequences found. Separate them with `{}`.",
            separator
        ))
        .await?;
        return Ok(());
    }

    // Acknowledge immediately; every round takes three model calls
    let user_mention = format!("<@{}>", ctx.author().id);
    ctx.say(format!(
        "Got it — analysing **{}** sequence(s). I'll ping you when the analysis is ready, {}",
        sequences.len(),
        user_mention
    ))
    .await?;

    let is_admin = ctx.data().is_admin(ctx.author().id.get());
    let keep_meta = keep_meta.unwrap_or(false) && is_admin;
    let config = ctx.data().analysis_config.read().await.clone();

    info!(
        user = %ctx.author().name,
        rounds = sequences.len(),
        model = %config.model,
        "Analysis requested"
    );

    let result = analysis::analyse(
        ctx.data().llm.clone(),
        ctx.data().prompts.clone(),
        &sequences,
        &outer_context,
        config,
    )
    .await;

    let record = match result {
        Ok(record) => record,
        Err(e) => {
            error!(round = e.round(), error = %e, "Analysis aborted");
            ctx.say(format!(
                "{} the analysis stopped in round {}: {}",
                user_mention,
                e.round(),
                e
            ))
            .await?;
            return Ok(());
        }
    };

    let opts = ExportOptions {
        strip_metadata: !keep_meta,
        ..ExportOptions::default()
    };
    let path = export::save_json(&record, &ctx.data().export_dir, &opts)?;

    let full = format!(
        "{} here is the analysis:\n\n{}",
        user_mention,
        summarize(&record)
    );
    send_chunked(&ctx, &full).await?;

    let attachment = serenity::CreateAttachment::path(&path)
        .await
        .context("Failed to attach export")?;
    ctx.send(
        poise::CreateReply::default()
            .content(format!("Full record: `{}`", attachment.filename))
            .attachment(attachment),
    )
    .await?;

    Ok(())
}
