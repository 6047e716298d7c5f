use std::fmt;

use super::models::{
    FirstRoundConfrontation, LastRoundConfrontation, MiddleRoundConfrontation,
    FINAL_HYPOTHESIS_FIELD, FIRST_HYPOTHESIS_FIELD, UPDATED_HYPOTHESIS_FIELD,
};
use crate::llm::OutputSchema;

/// Where a round sits in the run. Drives step-3 schema and fragment selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPosition {
    First,
    Middle,
    Last,
}

impl RoundPosition {
    /// Classify a 1-based round. Round 1 is always `First`, even when it is also
    /// the last round of a single-sequence run.
    pub fn of(round: usize, total: usize) -> Self {
        if round == 1 {
            RoundPosition::First
        } else if round < total {
            RoundPosition::Middle
        } else {
            RoundPosition::Last
        }
    }

    /// Field of the step-3 result that holds this position's hypothesis.
    pub fn hypothesis_field(&self) -> &'static str {
        match self {
            RoundPosition::First => FIRST_HYPOTHESIS_FIELD,
            RoundPosition::Middle => UPDATED_HYPOTHESIS_FIELD,
            RoundPosition::Last => FINAL_HYPOTHESIS_FIELD,
        }
    }

    pub fn confrontation_schema(&self) -> OutputSchema {
        match self {
            RoundPosition::First => {
                OutputSchema::of::<FirstRoundConfrontation>("konfrontation_erste_runde")
            }
            RoundPosition::Middle => {
                OutputSchema::of::<MiddleRoundConfrontation>("konfrontation_mittlere_runde")
            }
            RoundPosition::Last => {
                OutputSchema::of::<LastRoundConfrontation>("konfrontation_letzte_runde")
            }
        }
    }
}

impl fmt::Display for RoundPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundPosition::First => "first",
            RoundPosition::Middle => "middle",
            RoundPosition::Last => "last",
        };
        f.write_str(label)
    }
}
