use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Reasoning effort accepted by the Responses API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::Xhigh => "xhigh",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "minimal" => Ok(ReasoningEffort::Minimal),
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            "xhigh" => Ok(ReasoningEffort::Xhigh),
            other => Err(anyhow!(
                "unknown reasoning effort `{}` (minimal | low | medium | high | xhigh)",
                other
            )),
        }
    }
}

/// Model parameters and run options for one analysis.
///
/// A snapshot of this struct is stored in every exported record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub model: String,
    pub max_output_tokens: Option<u32>,
    pub reasoning_effort: ReasoningEffort,
    pub reasoning_summary: Option<String>,
    pub temperature: f64,
    pub tool_choice: String,
    pub store: bool,
    /// Log every step result at debug level.
    #[serde(default)]
    pub verbose_outputs: bool,
    /// Run step 1 of the next round alongside step 3 of the current one.
    #[serde(default)]
    pub prefetch_step1: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-nano".to_string(),
            max_output_tokens: None,
            reasoning_effort: ReasoningEffort::Medium,
            reasoning_summary: None,
            temperature: 1.0,
            tool_choice: "none".to_string(),
            store: false,
            verbose_outputs: false,
            prefetch_step1: false,
        }
    }
}

/// Keys accepted by [`AnalysisConfig::set`].
pub const CONFIG_KEYS: &[&str] = &[
    "model",
    "max_output_tokens",
    "reasoning_effort",
    "reasoning_summary",
    "temperature",
    "tool_choice",
    "store",
    "verbose_outputs",
    "prefetch_step1",
];

impl AnalysisConfig {
    /// Defaults overlaid with `ANALYSIS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        for key in CONFIG_KEYS {
            let var = format!("ANALYSIS_{}", key.to_uppercase());
            if let Ok(value) = dotenv::var(&var) {
                config
                    .set(key, &value)
                    .with_context(|| format!("Invalid value in {}", var))?;
            }
        }
        Ok(config)
    }

    /// Set a single key from its textual form. Empty values clear optional keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "model" => {
                if value.is_empty() {
                    bail!("model must not be empty");
                }
                self.model = value.to_string();
            }
            "max_output_tokens" => {
                self.max_output_tokens = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().context("expected a positive integer")?)
                };
            }
            "reasoning_effort" => self.reasoning_effort = value.parse()?,
            "reasoning_summary" => {
                self.reasoning_summary = (!value.is_empty()).then(|| value.to_string());
            }
            "temperature" => {
                self.temperature = value.parse().context("expected a number")?;
            }
            "tool_choice" => self.tool_choice = value.to_string(),
            "store" => self.store = parse_bool(value)?,
            "verbose_outputs" => self.verbose_outputs = parse_bool(value)?,
            "prefetch_step1" => self.prefetch_step1 = parse_bool(value)?,
            other => bail!("unknown key `{}`. Valid: {}", other, CONFIG_KEYS.join(", ")),
        }
        Ok(())
    }
}

impl fmt::Display for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "`model`: {}", self.model)?;
        match self.max_output_tokens {
            Some(n) => writeln!(f, "`max_output_tokens`: {}", n)?,
            None => writeln!(f, "`max_output_tokens`: (provider default)")?,
        }
        writeln!(f, "`reasoning_effort`: {}", self.reasoning_effort)?;
        writeln!(
            f,
            "`reasoning_summary`: {}",
            self.reasoning_summary.as_deref().unwrap_or("(none)")
        )?;
        writeln!(f, "`temperature`: {}", self.temperature)?;
        writeln!(f, "`tool_choice`: {}", self.tool_choice)?;
        writeln!(f, "`store`: {}", self.store)?;
        writeln!(f, "`verbose_outputs`: {}", self.verbose_outputs)?;
        write!(f, "`prefetch_step1`: {}", self.prefetch_step1)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got `{}`", other),
    }
}
