use std::time::SystemTime;

use super::{send_chunked, summarize};
use crate::export;
use crate::state::Context;

/// List exported analyses, newest first
#[poise::command(slash_command, guild_only)]
pub async fn exports(
    ctx: Context<'_>,
    #[description = "Max files to show"] limit: Option<u32>,
) -> Result<(), anyhow::Error> {
    let limit = limit.unwrap_or(20) as usize;
    let dir = &ctx.data().export_dir;

    let mut files: Vec<(SystemTime, String, u64)> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                let modified = meta.modified().ok()?;
                Some((modified, e.file_name().to_string_lossy().to_string(), meta.len()))
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    if files.is_empty() {
        ctx.say("No analyses exported yet. Use `/sequenz analyse` to run one.")
            .await?;
        return Ok(());
    }

    files.sort_by(|a, b| b.0.cmp(&a.0));

    let mut output = String::from("**Exported Analyses**\n\n");
    for (_, name, size) in files.iter().take(limit) {
        output.push_str(&format!("  - `{}` ({} KB)\n", name, size / 1024));
    }
    if files.len() > limit {
        output.push_str(&format!("\n… and {} more", files.len() - limit));
    }

    send_chunked(&ctx, &output).await
}

/// Show the per-round hypotheses of an exported analysis
#[poise::command(slash_command, guild_only)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "File name as listed by /sequenz exports"] file: String,
) -> Result<(), anyhow::Error> {
    if file.contains('/') || file.contains('\\') || file.contains("..") {
        ctx.say("Give a plain file name from `/sequenz exports`.")
            .await?;
        return Ok(());
    }

    let path = ctx.data().export_dir.join(&file);
    let record = match export::load_json(&path) {
        Ok(record) => record,
        Err(e) => {
            ctx.say(format!("Could not load `{}`: {:#}", file, e)).await?;
            return Ok(());
        }
    };

    send_chunked(&ctx, &summarize(&record)).await
}
