mod analyse;
mod config;
mod exports;
mod prompts;

use crate::analysis::record::AnalysisRecord;
use crate::state::Context;

/// Sequenzanalyse - multi-round sequence analysis of text protocols
#[poise::command(
    slash_command,
    subcommands(
        "analyse::analyse",
        "exports::exports",
        "exports::show",
        "config::config",
        "prompts::prompts"
    )
)]
pub async fn sequenz(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Send a message in Discord-safe chunks (max 1990 chars).
/// Uses ctx.say() for all chunks so follow-ups go through the interaction webhook.
async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    let mut remaining = text;
    while !remaining.is_empty() {
        let mut chunk_len = remaining.len().min(1990);
        while !remaining.is_char_boundary(chunk_len) {
            chunk_len -= 1;
        }
        let split_at = if chunk_len < remaining.len() {
            remaining[..chunk_len]
                .rfind('\n')
                .or_else(|| remaining[..chunk_len].rfind(' '))
                .map(|i| i + 1)
                .unwrap_or(chunk_len)
        } else {
            chunk_len
        };
        let chunk = &remaining[..split_at];
        remaining = &remaining[split_at..];

        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Per-round digest of a record: sequence plus that round's hypothesis.
fn summarize(record: &AnalysisRecord) -> String {
    let total = record.sequences.len();
    let mut out = format!(
        "**Äußerer Kontext:** {}\n**Runden:** {}\n",
        record.outer_context,
        record.rounds.len()
    );

    for round in &record.rounds {
        out.push_str(&format!("\n**Runde {}** — _{}_\n", round.round, round.sequence));
        match round.hypothesis(total) {
            Some(h) => out.push_str(&format!("> {}\n", h.replace('\n', "\n> "))),
            None => out.push_str("> (keine Fallstrukturhypothese)\n"),
        }
    }
    out
}
