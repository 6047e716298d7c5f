pub mod models;
pub mod position;
pub mod prompts;
pub mod record;

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, LlmError};
use crate::llm::{Metadata, OutputSchema, StructuredOutput};

use models::{
    CarriedState, ConfrontationPayload, ContextFreeReadings, ExampleSituations,
    FirstRoundConfrontation, LastRoundConfrontation, MiddleRoundConfrontation,
};
use position::RoundPosition;
use prompts::PromptSet;
use record::{AnalysisRecord, RoundRecord};

/// Drives the three-step rounds over a protocol, one sequence per round.
pub struct SequenceAnalysis<C> {
    client: Arc<C>,
    config: AnalysisConfig,
    prompts: Arc<PromptSet>,
}

impl<C: StructuredOutput> SequenceAnalysis<C> {
    pub fn new(client: Arc<C>, config: AnalysisConfig, prompts: Arc<PromptSet>) -> Self {
        Self {
            client,
            config,
            prompts,
        }
    }

    /// Analyse `sequences` against `outer_context`.
    ///
    /// Rounds run strictly in order: round N's step 3 reads its carried state
    /// from round N-1's stored record. Any failure aborts the run; a round is
    /// appended only after all three steps succeeded.
    pub async fn analyse(
        &self,
        sequences: &[String],
        outer_context: &str,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let total = sequences.len();
        let mut record = AnalysisRecord::new(
            self.config.clone(),
            sequences.to_vec(),
            outer_context.to_string(),
        );

        info!(
            rounds = total,
            model = %self.config.model,
            prefetch = self.config.prefetch_step1,
            "Starting sequence analysis"
        );

        let mut prefetched: Option<(ExampleSituations, Metadata)> = None;

        for (idx, sequence) in sequences.iter().enumerate() {
            let round = idx + 1;
            let position = RoundPosition::of(round, total);
            let protocol_so_far = sequences[..idx].join(" ");

            info!(round, %position, sequence_len = sequence.len(), "─── Round ───");

            let (situations, meta1) = match prefetched.take() {
                Some(done) => done,
                None => self.situations(round, sequence).await?,
            };
            let (readings, meta2) = self.readings(round, &situations).await?;

            let carried = record
                .rounds
                .last()
                .map(RoundRecord::carried_state)
                .transpose()?;

            let step3 = self.confrontation(
                round,
                position,
                sequence,
                outer_context,
                &protocol_so_far,
                carried.as_ref(),
                &readings,
            );

            // Step 1 needs no carried state, so the next round's can overlap this step 3.
            let (confrontation, meta3) = match sequences.get(round) {
                Some(next) if self.config.prefetch_step1 => {
                    let (done, next_step1) =
                        futures::future::try_join(step3, self.situations(round + 1, next))
                            .await?;
                    prefetched = Some(next_step1);
                    done
                }
                _ => step3.await?,
            };

            record.rounds.push(RoundRecord {
                round,
                protocol_so_far,
                sequence: sequence.clone(),
                results: vec![
                    to_stored(round, 1, &situations)?,
                    to_stored(round, 2, &readings)?,
                    confrontation,
                ],
                responses_meta: vec![meta1, meta2, meta3],
            });
        }

        record.meta.finished_at = Some(Utc::now());
        info!(
            rounds = record.rounds.len(),
            has_hypothesis = record.final_hypothesis().is_some(),
            "Sequence analysis complete"
        );
        Ok(record)
    }

    /// Step 1: context-free example situations for one sequence.
    async fn situations(
        &self,
        round: usize,
        sequence: &str,
    ) -> Result<(ExampleSituations, Metadata), AnalysisError> {
        let schema = OutputSchema::of::<ExampleSituations>("beispielsituationen");
        self.call(round, 1, &self.prompts.step1_situations, sequence, &schema)
            .await
    }

    /// Step 2: readings derived from the step-1 result, sent as pretty JSON.
    async fn readings(
        &self,
        round: usize,
        situations: &ExampleSituations,
    ) -> Result<(ContextFreeReadings, Metadata), AnalysisError> {
        let payload = serde_json::to_string_pretty(situations)
            .map_err(|source| AnalysisError::Serialize {
                round,
                step: 2,
                source,
            })?;
        let schema = OutputSchema::of::<ContextFreeReadings>("kontextfreie_lesarten");
        self.call(round, 2, &self.prompts.step2_readings, &payload, &schema)
            .await
    }

    /// Step 3: confront the readings with the actual context. Schema and
    /// instruction fragments follow the round position.
    #[allow(clippy::too_many_arguments)]
    async fn confrontation(
        &self,
        round: usize,
        position: RoundPosition,
        sequence: &str,
        outer_context: &str,
        protocol_so_far: &str,
        carried: Option<&CarriedState>,
        readings: &ContextFreeReadings,
    ) -> Result<(Value, Metadata), AnalysisError> {
        let instruction = self
            .prompts
            .confrontation_instruction(round, position)
            .map_err(|source| {
                error!(round, %source, "Step-3 template defect");
                AnalysisError::TemplateSubstitution { round, source }
            })?;

        let payload =
            ConfrontationPayload::new(sequence, outer_context, protocol_so_far, carried, readings);
        let payload = serde_json::to_string_pretty(&payload).map_err(|source| {
            AnalysisError::Serialize {
                round,
                step: 3,
                source,
            }
        })?;

        let schema = position.confrontation_schema();
        match position {
            RoundPosition::First => {
                self.call_stored::<FirstRoundConfrontation>(round, &instruction, &payload, &schema)
                    .await
            }
            RoundPosition::Middle => {
                self.call_stored::<MiddleRoundConfrontation>(round, &instruction, &payload, &schema)
                    .await
            }
            RoundPosition::Last => {
                self.call_stored::<LastRoundConfrontation>(round, &instruction, &payload, &schema)
                    .await
            }
        }
    }

    async fn call_stored<T>(
        &self,
        round: usize,
        instruction: &str,
        payload: &str,
        schema: &OutputSchema,
    ) -> Result<(Value, Metadata), AnalysisError>
    where
        T: DeserializeOwned + Serialize + Send,
    {
        let (result, meta) = self
            .call::<T>(round, 3, instruction, payload, schema)
            .await?;
        Ok((to_stored(round, 3, &result)?, meta))
    }

    /// One structured-output call, validated against `T`.
    async fn call<T>(
        &self,
        round: usize,
        step: u8,
        instruction: &str,
        payload: &str,
        schema: &OutputSchema,
    ) -> Result<(T, Metadata), AnalysisError>
    where
        T: DeserializeOwned + Serialize + Send,
    {
        debug!(
            round,
            step,
            schema = schema.name,
            payload_len = payload.len(),
            "Calling provider"
        );

        let (raw, meta) = self
            .client
            .parse(instruction, payload, schema, &self.config)
            .await
            .map_err(|source| {
                error!(round, step, %source, "Provider call failed");
                AnalysisError::Step {
                    round,
                    step,
                    source,
                }
            })?;

        let result: T = serde_json::from_value(raw).map_err(|source| AnalysisError::Step {
            round,
            step,
            source: LlmError::SchemaMismatch {
                schema: schema.name,
                source,
            },
        })?;

        if self.config.verbose_outputs {
            if let Ok(pretty) = serde_json::to_string_pretty(&result) {
                debug!(round, step, "─── Step Result ───");
                for line in pretty.lines() {
                    debug!("  │ {}", line);
                }
            }
        }

        Ok((result, meta))
    }
}

fn to_stored<T: Serialize>(round: usize, step: u8, result: &T) -> Result<Value, AnalysisError> {
    serde_json::to_value(result).map_err(|source| AnalysisError::Serialize {
        round,
        step,
        source,
    })
}

/// One-shot analysis entry point.
pub async fn analyse<C: StructuredOutput>(
    client: Arc<C>,
    prompts: Arc<PromptSet>,
    sequences: &[String],
    outer_context: &str,
    config: AnalysisConfig,
) -> Result<AnalysisRecord, AnalysisError> {
    SequenceAnalysis::new(client, config, prompts)
        .analyse(sequences, outer_context)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Call {
        instruction: String,
        payload: String,
        schema: &'static str,
    }

    impl Call {
        fn payload_json(&self) -> Value {
            serde_json::from_str(&self.payload).unwrap()
        }
    }

    /// Answers every schema with a fixed, valid result and records the calls.
    #[derive(Default)]
    struct ScriptedClient {
        calls: Mutex<Vec<Call>>,
        fail_at_call: Option<usize>,
        malformed_schema: Option<&'static str>,
    }

    impl ScriptedClient {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn step3_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| c.schema.starts_with("konfrontation"))
                .collect()
        }
    }

    impl StructuredOutput for ScriptedClient {
        async fn parse(
            &self,
            instruction: &str,
            payload: &str,
            schema: &OutputSchema,
            _config: &AnalysisConfig,
        ) -> Result<(Value, Metadata), LlmError> {
            let (index, step3_count) = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Call {
                    instruction: instruction.to_string(),
                    payload: payload.to_string(),
                    schema: schema.name,
                });
                let step3 = calls
                    .iter()
                    .filter(|c| c.schema.starts_with("konfrontation"))
                    .count();
                (calls.len(), step3)
            };

            if self.fail_at_call == Some(index) {
                return Err(LlmError::NoStructuredResult);
            }
            if self.malformed_schema == Some(schema.name) {
                return Ok((json!({}), Metadata::new()));
            }

            let mut meta = Metadata::new();
            meta.insert("id".to_string(), json!(format!("resp_{}", index)));
            Ok((canned(schema.name, step3_count), meta))
        }
    }

    fn canned(schema: &str, step3_count: usize) -> Value {
        let situation = json!({"titel": "Am Bahnsteig", "szene": "Jemand wartet."});
        let sequence_vs_context = json!({
            "sequenz": "s",
            "passung": "erwartbar",
            "begründung": "b",
            "erkenntnisgewinn": "e",
        });
        let readings_vs_context = json!([{
            "titel": "Warten",
            "passung": "teilweise",
            "begründung": "b",
            "erkenntnisgewinn": "e",
        }]);
        let induced = json!({"lesarten": [{"titel": "Ungeduld", "beschreibung": "d"}]});
        let prediction = json!({
            "lesart_titel": "Ungeduld",
            "nächste_sequenz": "Wann kommt er?",
            "begründung": "b",
        });
        let vs_expected = json!([{
            "erwartete_sequenz": "Wann kommt er?",
            "tatsächliche_sequenz": "s",
            "entsprechung": "schlecht/gar nicht",
            "erkenntnisgewinn": "e",
        }]);
        let vs_prior = json!({"bestätigung": "ja", "infragestellung": "nein"});
        let hypothesis = format!("H{}", step3_count);

        match schema {
            "beispielsituationen" => json!({"beispielsituationen": [situation]}),
            "kontextfreie_lesarten" => json!({"lesarten": [{
                "titel": "Warten",
                "beschreibung": "d",
                "titel_der_zur_lesart_passenden_beispielsituationen": ["Am Bahnsteig"],
                "beste_zur_lesart_passende_beispielsituation": situation,
                "gemeinsamekeiten_der_zur_lesart_passenden_beispielsituationen": "g",
                "unterschiede_der_zur_lesart_passenden_beispielsituationen": "u",
            }]}),
            "konfrontation_erste_runde" => json!({
                "sequenz_vs_kontext": sequence_vs_context,
                "kontextfreie_lesarten_vs_kontext": readings_vs_context,
                "zwischenfazit": "z",
                "kontextinduzierte_lesarten": induced,
                "prognose_der_nächsten_sequenzeinheit": prediction,
                "erste_fallstrukturhypothese": hypothesis,
            }),
            "konfrontation_mittlere_runde" => json!({
                "sequenz_vs_kontext": sequence_vs_context,
                "sequenz_vs_erwartete_fortführung": vs_expected,
                "sequenz_vs_alte_fallstrukturhypothese": vs_prior,
                "kontextfreie_lesarten_vs_kontext": readings_vs_context,
                "zwischenfazit": "z",
                "kontextinduzierte_lesarten": induced,
                "prognose_der_nächsten_sequenzeinheit": prediction,
                "neue_fallstrukturhypothese": hypothesis,
            }),
            "konfrontation_letzte_runde" => json!({
                "sequenz_vs_kontext": sequence_vs_context,
                "sequenz_vs_erwartete_fortführung": vs_expected,
                "sequenz_vs_alte_fallstrukturhypothese": vs_prior,
                "kontextfreie_lesarten_vs_kontext": readings_vs_context,
                "zwischenfazit": "z",
                "kontextinduzierte_lesarten": induced,
                "finale_fallstrukturhypothese": hypothesis,
            }),
            other => panic!("unexpected schema {}", other),
        }
    }

    fn seqs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn engine(
        client: Arc<ScriptedClient>,
        config: AnalysisConfig,
    ) -> SequenceAnalysis<ScriptedClient> {
        SequenceAnalysis::new(client, config, Arc::new(PromptSet::default()))
    }

    #[tokio::test]
    async fn test_three_sequences() {
        let client = Arc::new(ScriptedClient::default());
        let record = engine(client.clone(), AnalysisConfig::default())
            .analyse(&seqs(&["A", "B", "C"]), "X")
            .await
            .unwrap();

        assert_eq!(record.rounds.len(), 3);
        let indices: Vec<usize> = record.rounds.iter().map(|r| r.round).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let protocols: Vec<&str> = record
            .rounds
            .iter()
            .map(|r| r.protocol_so_far.as_str())
            .collect();
        assert_eq!(protocols, vec!["", "A", "A B"]);
        assert!(record.rounds.iter().all(|r| r.results.len() == 3));
        assert!(record.rounds.iter().all(|r| r.responses_meta.len() == 3));

        let schemas: Vec<&str> = client.step3_calls().iter().map(|c| c.schema).collect();
        assert_eq!(
            schemas,
            vec![
                "konfrontation_erste_runde",
                "konfrontation_mittlere_runde",
                "konfrontation_letzte_runde"
            ]
        );

        let last = record.rounds[2].confrontation().unwrap();
        assert!(last.get("prognose_der_nächsten_sequenzeinheit").is_none());
        assert_eq!(last["finale_fallstrukturhypothese"], "H3");
        assert_eq!(record.final_hypothesis(), Some("H3"));
        assert_eq!(record.outer_context, "X");
        assert!(record.meta.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let client = Arc::new(ScriptedClient::default());
        engine(client.clone(), AnalysisConfig::default())
            .analyse(&seqs(&["A", "B"]), "X")
            .await
            .unwrap();

        let schemas: Vec<&str> = client.calls().iter().map(|c| c.schema).collect();
        assert_eq!(
            schemas,
            vec![
                "beispielsituationen",
                "kontextfreie_lesarten",
                "konfrontation_erste_runde",
                "beispielsituationen",
                "kontextfreie_lesarten",
                "konfrontation_letzte_runde",
            ]
        );
    }

    #[tokio::test]
    async fn test_single_sequence_uses_first_round_shape() {
        let client = Arc::new(ScriptedClient::default());
        let record = engine(client.clone(), AnalysisConfig::default())
            .analyse(&seqs(&["only"]), "X")
            .await
            .unwrap();

        assert_eq!(record.rounds.len(), 1);
        assert_eq!(client.step3_calls()[0].schema, "konfrontation_erste_runde");
        let result = record.rounds[0].confrontation().unwrap();
        assert_eq!(result["erste_fallstrukturhypothese"], "H1");
        assert!(result.get("prognose_der_nächsten_sequenzeinheit").is_some());
        assert_eq!(record.final_hypothesis(), Some("H1"));
    }

    #[tokio::test]
    async fn test_step3_payload_shape_by_round() {
        let client = Arc::new(ScriptedClient::default());
        engine(client.clone(), AnalysisConfig::default())
            .analyse(&seqs(&["A", "B", "C"]), "X")
            .await
            .unwrap();

        let payloads: Vec<Value> = client
            .step3_calls()
            .iter()
            .map(Call::payload_json)
            .collect();

        let first = &payloads[0];
        assert_eq!(first["sequence"], "A");
        assert_eq!(first["actual_context"], json!({"outer_context": "X"}));
        assert!(first.get("expected_continuations").is_none());
        assert!(first.get("prior_case_hypothesis").is_none());

        assert_eq!(payloads[1]["actual_context"]["inner_context"], "A");
        assert_eq!(payloads[1]["prior_case_hypothesis"], "H1");
        assert_eq!(payloads[1]["expected_continuations"], json!([]));

        assert_eq!(payloads[2]["actual_context"]["inner_context"], "A B");
        assert_eq!(payloads[2]["prior_case_hypothesis"], "H2");
        assert_eq!(payloads[2]["context_free_readings"]["lesarten"][0]["titel"], "Warten");
    }

    #[tokio::test]
    async fn test_step2_receives_step1_result() {
        let client = Arc::new(ScriptedClient::default());
        let record = engine(client.clone(), AnalysisConfig::default())
            .analyse(&seqs(&["A"]), "X")
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls[0].payload, "A");
        assert_eq!(calls[1].payload_json(), record.rounds[0].results[0]);
        assert_eq!(
            calls[1].payload,
            serde_json::to_string_pretty(&record.rounds[0].results[0]).unwrap()
        );

        let titel = calls[1].payload.find("\"titel\"").unwrap();
        let szene = calls[1].payload.find("\"szene\"").unwrap();
        assert!(titel < szene);
    }

    #[tokio::test]
    async fn test_step3_instruction_follows_position() {
        let client = Arc::new(ScriptedClient::default());
        engine(client.clone(), AnalysisConfig::default())
            .analyse(&seqs(&["A", "B", "C"]), "X")
            .await
            .unwrap();

        let step3 = client.step3_calls();
        assert!(step3[0].instruction.contains("Runde 1"));
        assert!(step3[0].instruction.contains(prompts::STEP3_TASK_START));
        assert!(step3[1].instruction.contains("Runde 2"));
        assert!(step3[1].instruction.contains(prompts::STEP3_INPUT_MIDDLE_END));
        assert!(step3[1].instruction.contains(prompts::STEP3_TASK_MIDDLE));
        assert!(step3[2].instruction.contains(prompts::STEP3_OUTPUT_END));
    }

    #[tokio::test]
    async fn test_provider_failure_carries_round_and_step() {
        let client = Arc::new(ScriptedClient {
            fail_at_call: Some(5),
            ..Default::default()
        });
        let err = engine(client.clone(), AnalysisConfig::default())
            .analyse(&seqs(&["A", "B", "C"]), "X")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Step {
                round: 2,
                step: 2,
                source: LlmError::NoStructuredResult
            }
        ));
        assert_eq!(client.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_fatal() {
        let client = Arc::new(ScriptedClient {
            malformed_schema: Some("konfrontation_erste_runde"),
            ..Default::default()
        });
        let err = engine(client, AnalysisConfig::default())
            .analyse(&seqs(&["A", "B"]), "X")
            .await
            .unwrap_err();

        assert_eq!(err.round(), 1);
        assert!(matches!(
            err,
            AnalysisError::Step {
                step: 3,
                source: LlmError::SchemaMismatch { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_template_defect_stops_before_step3_call() {
        let client = Arc::new(ScriptedClient::default());
        let mut prompts = PromptSet::default();
        prompts.step3_template = "Runde [RUNDE] [RUNDEUNDZIEL] [EINGABE] [AUFGABE]".to_string();
        let engine =
            SequenceAnalysis::new(client.clone(), AnalysisConfig::default(), Arc::new(prompts));
        let err = engine
            .analyse(&seqs(&["A"]), "X")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::TemplateSubstitution { round: 1, .. }
        ));
        assert!(client.step3_calls().is_empty());
    }

    #[tokio::test]
    async fn test_prefetch_produces_same_rounds() {
        let sequential = Arc::new(ScriptedClient::default());
        let expected = engine(sequential, AnalysisConfig::default())
            .analyse(&seqs(&["A", "B", "C"]), "X")
            .await
            .unwrap();

        let config = AnalysisConfig {
            prefetch_step1: true,
            ..AnalysisConfig::default()
        };
        let prefetching = Arc::new(ScriptedClient::default());
        let actual = engine(prefetching.clone(), config)
            .analyse(&seqs(&["A", "B", "C"]), "X")
            .await
            .unwrap();

        assert_eq!(
            actual.without_metadata().rounds,
            expected.without_metadata().rounds
        );
        assert_eq!(prefetching.calls().len(), 9);
        assert!(actual.meta.config.prefetch_step1);
    }

    #[tokio::test]
    async fn test_no_sequences_no_rounds() {
        let client = Arc::new(ScriptedClient::default());
        let record = analyse(
            client.clone(),
            Arc::new(PromptSet::default()),
            &[],
            "X",
            AnalysisConfig::default(),
        )
        .await
        .unwrap();
        assert!(record.rounds.is_empty());
        assert!(client.calls().is_empty());
        assert_eq!(record.final_hypothesis(), None);
    }
}
