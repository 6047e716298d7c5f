//! Output shapes the provider answers in, plus the step-3 input payload.
//!
//! Field names on the wire are German because the instructions are German;
//! the model sees them verbatim in the generated JSON Schema.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const FIRST_HYPOTHESIS_FIELD: &str = "erste_fallstrukturhypothese";
pub const UPDATED_HYPOTHESIS_FIELD: &str = "neue_fallstrukturhypothese";
pub const FINAL_HYPOTHESIS_FIELD: &str = "finale_fallstrukturhypothese";
pub const EXPECTED_CONTINUATIONS_FIELD: &str = "neue_fortführungen";

// Step 1

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExampleSituation {
    #[serde(rename = "titel")]
    pub title: String,
    #[serde(rename = "szene")]
    pub scene: String,
}

/// Context-free example situations in which the sequence could be uttered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExampleSituations {
    #[serde(rename = "beispielsituationen")]
    pub situations: Vec<ExampleSituation>,
}

// Step 2

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextFreeReading {
    #[serde(rename = "titel")]
    pub title: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    #[serde(rename = "titel_der_zur_lesart_passenden_beispielsituationen")]
    pub matching_situation_titles: Vec<String>,
    #[serde(rename = "beste_zur_lesart_passende_beispielsituation")]
    pub best_matching_situation: ExampleSituation,
    #[serde(rename = "gemeinsamekeiten_der_zur_lesart_passenden_beispielsituationen")]
    pub commonalities: String,
    #[serde(rename = "unterschiede_der_zur_lesart_passenden_beispielsituationen")]
    pub differences: String,
}

/// Readings abstracted from the example situations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextFreeReadings {
    #[serde(rename = "lesarten")]
    pub readings: Vec<ContextFreeReading>,
}

// Step 3 building blocks

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SequenceFit {
    #[serde(rename = "erwartbar")]
    Expected,
    #[serde(rename = "überraschend")]
    Surprising,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Correspondence {
    #[serde(rename = "gut")]
    Good,
    #[serde(rename = "teilweise")]
    Partial,
    #[serde(rename = "schlecht/gar nicht")]
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceVsContext {
    #[serde(rename = "sequenz")]
    pub sequence: String,
    #[serde(rename = "passung")]
    pub fit: SequenceFit,
    #[serde(rename = "begründung")]
    pub justification: String,
    #[serde(rename = "erkenntnisgewinn")]
    pub insight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceVsExpectedContinuation {
    #[serde(rename = "erwartete_sequenz")]
    pub expected_sequence: String,
    #[serde(rename = "tatsächliche_sequenz")]
    pub actual_sequence: String,
    #[serde(rename = "entsprechung")]
    pub correspondence: Correspondence,
    #[serde(rename = "erkenntnisgewinn")]
    pub insight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceVsPriorHypothesis {
    #[serde(rename = "bestätigung")]
    pub confirmation: String,
    #[serde(rename = "infragestellung")]
    pub challenge: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReadingVsContext {
    #[serde(rename = "titel")]
    pub title: String,
    #[serde(rename = "passung")]
    pub fit: Correspondence,
    #[serde(rename = "begründung")]
    pub justification: String,
    #[serde(rename = "erkenntnisgewinn")]
    pub insight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InducedReading {
    #[serde(rename = "titel")]
    pub title: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InducedReadings {
    #[serde(rename = "lesarten")]
    pub readings: Vec<InducedReading>,
}

/// A predicted next sequence. Also the element type of carried expected continuations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Prediction {
    #[serde(rename = "lesart_titel")]
    pub reading_title: String,
    #[serde(rename = "nächste_sequenz")]
    pub next_sequence: String,
    #[serde(rename = "begründung")]
    pub justification: String,
}

// Step 3 variants

/// Confrontation with context in the first round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FirstRoundConfrontation {
    #[serde(rename = "sequenz_vs_kontext")]
    pub sequence_vs_context: SequenceVsContext,
    #[serde(rename = "kontextfreie_lesarten_vs_kontext")]
    pub readings_vs_context: Vec<ReadingVsContext>,
    #[serde(rename = "zwischenfazit")]
    pub interim_conclusion: String,
    #[serde(rename = "kontextinduzierte_lesarten")]
    pub induced_readings: InducedReadings,
    #[serde(rename = "prognose_der_nächsten_sequenzeinheit")]
    pub prediction: Prediction,
    #[serde(rename = "erste_fallstrukturhypothese")]
    pub first_hypothesis: String,
}

/// Confrontation with context in every round between the first and the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MiddleRoundConfrontation {
    #[serde(rename = "sequenz_vs_kontext")]
    pub sequence_vs_context: SequenceVsContext,
    #[serde(rename = "sequenz_vs_erwartete_fortführung")]
    pub sequence_vs_expected: Vec<SequenceVsExpectedContinuation>,
    #[serde(rename = "sequenz_vs_alte_fallstrukturhypothese")]
    pub sequence_vs_prior_hypothesis: SequenceVsPriorHypothesis,
    #[serde(rename = "kontextfreie_lesarten_vs_kontext")]
    pub readings_vs_context: Vec<ReadingVsContext>,
    #[serde(rename = "zwischenfazit")]
    pub interim_conclusion: String,
    #[serde(rename = "kontextinduzierte_lesarten")]
    pub induced_readings: InducedReadings,
    #[serde(rename = "prognose_der_nächsten_sequenzeinheit")]
    pub prediction: Prediction,
    #[serde(rename = "neue_fallstrukturhypothese")]
    pub updated_hypothesis: String,
}

/// Confrontation with context in the last round: no prediction, final hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LastRoundConfrontation {
    #[serde(rename = "sequenz_vs_kontext")]
    pub sequence_vs_context: SequenceVsContext,
    #[serde(rename = "sequenz_vs_erwartete_fortführung")]
    pub sequence_vs_expected: Vec<SequenceVsExpectedContinuation>,
    #[serde(rename = "sequenz_vs_alte_fallstrukturhypothese")]
    pub sequence_vs_prior_hypothesis: SequenceVsPriorHypothesis,
    #[serde(rename = "kontextfreie_lesarten_vs_kontext")]
    pub readings_vs_context: Vec<ReadingVsContext>,
    #[serde(rename = "zwischenfazit")]
    pub interim_conclusion: String,
    #[serde(rename = "kontextinduzierte_lesarten")]
    pub induced_readings: InducedReadings,
    #[serde(rename = "finale_fallstrukturhypothese")]
    pub final_hypothesis: String,
}

// Step 3 input

#[derive(Debug, Serialize)]
pub struct ActualContext<'a> {
    pub outer_context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_context: Option<&'a str>,
}

/// What the model sees in step 3. In round 1 the inner context, the expected
/// continuations and the prior hypothesis are absent, not empty.
#[derive(Debug, Serialize)]
pub struct ConfrontationPayload<'a> {
    pub sequence: &'a str,
    pub actual_context: ActualContext<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_continuations: Option<&'a [Prediction]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_case_hypothesis: Option<&'a str>,
    pub context_free_readings: &'a ContextFreeReadings,
}

impl<'a> ConfrontationPayload<'a> {
    pub fn new(
        sequence: &'a str,
        outer_context: &'a str,
        protocol_so_far: &'a str,
        carried: Option<&'a CarriedState>,
        readings: &'a ContextFreeReadings,
    ) -> Self {
        Self {
            sequence,
            actual_context: ActualContext {
                outer_context,
                inner_context: carried.map(|_| protocol_so_far),
            },
            expected_continuations: carried.map(|c| c.expected_continuations.as_slice()),
            prior_case_hypothesis: carried.map(|c| c.case_hypothesis.as_str()),
            context_free_readings: readings,
        }
    }
}

/// State handed from round N-1 to round N.
#[derive(Debug, Clone, PartialEq)]
pub struct CarriedState {
    pub case_hypothesis: String,
    pub expected_continuations: Vec<Prediction>,
}
