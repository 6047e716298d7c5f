use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{
    CarriedState, Prediction, EXPECTED_CONTINUATIONS_FIELD, FIRST_HYPOTHESIS_FIELD,
    UPDATED_HYPOTHESIS_FIELD,
};
use super::position::RoundPosition;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::llm::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub config: AnalysisConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Everything one run produced. Only the orchestrator appends to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub meta: RunMeta,
    pub sequences: Vec<String>,
    pub outer_context: String,
    pub rounds: Vec<RoundRecord>,
}

/// One round: results of steps 1, 2 and 3 in order, plus their provider metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: usize,
    pub protocol_so_far: String,
    pub sequence: String,
    pub results: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses_meta: Vec<Metadata>,
}

impl AnalysisRecord {
    pub fn new(config: AnalysisConfig, sequences: Vec<String>, outer_context: String) -> Self {
        Self {
            meta: RunMeta {
                config,
                started_at: Utc::now(),
                finished_at: None,
            },
            sequences,
            outer_context,
            rounds: Vec::new(),
        }
    }

    /// Copy of the record with every round's provider metadata removed.
    pub fn without_metadata(&self) -> Self {
        let mut stripped = self.clone();
        for round in &mut stripped.rounds {
            round.responses_meta.clear();
        }
        stripped
    }

    /// Hypothesis of the last completed round, whichever variant it is.
    pub fn final_hypothesis(&self) -> Option<&str> {
        let last = self.rounds.last()?;
        last.hypothesis(self.sequences.len())
    }
}

impl RoundRecord {
    pub fn confrontation(&self) -> Option<&Value> {
        self.results.get(2)
    }

    /// Case-structure hypothesis of this round's step-3 result.
    pub fn hypothesis(&self, total_rounds: usize) -> Option<&str> {
        let field = RoundPosition::of(self.round, total_rounds).hypothesis_field();
        self.confrontation()?.get(field)?.as_str()
    }

    /// State that round `self.round + 1` continues from.
    ///
    /// The hypothesis comes from `erste_fallstrukturhypothese` after round 1 and
    /// from `neue_fallstrukturhypothese` after any later round. Expected
    /// continuations are taken from `neue_fortführungen` when the result has them.
    pub fn carried_state(&self) -> Result<CarriedState, AnalysisError> {
        let next_round = self.round + 1;
        let field = if self.round == 1 {
            FIRST_HYPOTHESIS_FIELD
        } else {
            UPDATED_HYPOTHESIS_FIELD
        };

        let confrontation = self
            .confrontation()
            .ok_or(AnalysisError::MalformedCarriedState {
                round: next_round,
                field,
            })?;

        let case_hypothesis = confrontation
            .get(field)
            .and_then(Value::as_str)
            .ok_or(AnalysisError::MalformedCarriedState {
                round: next_round,
                field,
            })?
            .to_string();

        let expected_continuations = match confrontation.get(EXPECTED_CONTINUATIONS_FIELD) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<Prediction>>(value.clone()).map_err(
                |_| AnalysisError::MalformedCarriedState {
                    round: next_round,
                    field: EXPECTED_CONTINUATIONS_FIELD,
                },
            )?,
        };

        Ok(CarriedState {
            case_hypothesis,
            expected_continuations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round(index: usize, confrontation: Value) -> RoundRecord {
        RoundRecord {
            round: index,
            protocol_so_far: String::new(),
            sequence: format!("s{}", index),
            results: vec![json!({}), json!({}), confrontation],
            responses_meta: vec![Metadata::new(), Metadata::new(), Metadata::new()],
        }
    }

    #[test]
    fn test_carried_from_first_round() {
        let prior = round(
            1,
            json!({"erste_fallstrukturhypothese": "H1", "neue_fallstrukturhypothese": "nope"}),
        );
        let carried = prior.carried_state().unwrap();
        assert_eq!(carried.case_hypothesis, "H1");
        assert!(carried.expected_continuations.is_empty());
    }

    #[test]
    fn test_carried_from_middle_round() {
        let prior = round(
            2,
            json!({
                "erste_fallstrukturhypothese": "nope",
                "neue_fallstrukturhypothese": "H2",
                "neue_fortführungen": [
                    {"lesart_titel": "L", "nächste_sequenz": "n", "begründung": "b"}
                ]
            }),
        );
        let carried = prior.carried_state().unwrap();
        assert_eq!(carried.case_hypothesis, "H2");
        assert_eq!(carried.expected_continuations.len(), 1);
        assert_eq!(carried.expected_continuations[0].reading_title, "L");
    }

    #[test]
    fn test_missing_hypothesis_is_malformed() {
        let prior = round(2, json!({"erste_fallstrukturhypothese": "H1"}));
        let err = prior.carried_state().unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MalformedCarriedState {
                round: 3,
                field: UPDATED_HYPOTHESIS_FIELD
            }
        ));
    }

    #[test]
    fn test_malformed_continuations() {
        let prior = round(
            1,
            json!({"erste_fallstrukturhypothese": "H1", "neue_fortführungen": "soon"}),
        );
        assert!(matches!(
            prior.carried_state(),
            Err(AnalysisError::MalformedCarriedState {
                field: EXPECTED_CONTINUATIONS_FIELD,
                ..
            })
        ));
    }

    #[test]
    fn test_without_metadata_and_final_hypothesis() {
        let mut record = AnalysisRecord::new(
            AnalysisConfig::default(),
            vec!["A".to_string(), "B".to_string()],
            "X".to_string(),
        );
        record
            .rounds
            .push(round(1, json!({"erste_fallstrukturhypothese": "H1"})));
        record
            .rounds
            .push(round(2, json!({"finale_fallstrukturhypothese": "Hf"})));

        assert_eq!(record.final_hypothesis(), Some("Hf"));

        let stripped = record.without_metadata();
        assert!(stripped.rounds.iter().all(|r| r.responses_meta.is_empty()));
        assert_eq!(record.rounds[0].responses_meta.len(), 3);

        let json = serde_json::to_value(&stripped).unwrap();
        assert!(json["rounds"][0].get("responses_meta").is_none());
    }
}
