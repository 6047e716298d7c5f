use std::future::Future;

use anyhow::{Context, Result};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::LlmError;

/// Provider metadata kept next to each structured result.
pub type Metadata = Map<String, Value>;

/// Response keys that duplicate the parsed result and never go into [`Metadata`].
pub const STRIPPED_META_KEYS: &[&str] = &["output", "text", "output_text", "output_parsed"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// A named JSON Schema the provider must answer in.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

impl OutputSchema {
    /// Generate a strict-mode schema for `T`: sub-schemas inlined, every object
    /// closed and every property required.
    pub fn of<T: JsonSchema>(name: &'static str) -> Self {
        let settings = SchemaSettings::draft07().with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        });
        let root = settings.into_generator().into_root_schema_for::<T>();
        let mut schema = json!(root);
        close_objects(&mut schema);
        Self { name, schema }
    }
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let required: Option<Vec<Value>> = match map.get("properties") {
                Some(Value::Object(props)) => {
                    Some(props.keys().map(|k| Value::String(k.clone())).collect())
                }
                _ => None,
            };
            if let Some(required) = required {
                map.insert("required".to_string(), Value::Array(required));
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            if matches!(map.get("title"), Some(Value::String(_))) {
                map.remove("title");
            }
            for child in map.values_mut() {
                close_objects(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

/// One structured-output call: instruction + payload + schema in, typed JSON out.
pub trait StructuredOutput: Send + Sync {
    fn parse(
        &self,
        instruction: &str,
        payload: &str,
        schema: &OutputSchema,
        config: &AnalysisConfig,
    ) -> impl Future<Output = Result<(Value, Metadata), LlmError>> + Send;
}

/// Client for the OpenAI Responses API (or any server speaking it).
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = dotenv::var("LLM_API_KEY")
            .or_else(|_| dotenv::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());
        let timeout_secs = match dotenv::var("LLM_TIMEOUT_SECS") {
            Ok(v) => v.parse::<u64>().context("LLM_TIMEOUT_SECS must be an integer")?,
            Err(_) => 300,
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Resolve the responses endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/responses") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/responses", base)
        } else {
            format!("{}/v1/responses", base)
        }
    }
}

/// Request body for a structured-output call.
pub fn request_body(
    instruction: &str,
    payload: &str,
    schema: &OutputSchema,
    config: &AnalysisConfig,
) -> Value {
    let input = vec![
        Message {
            role: "developer".to_string(),
            content: instruction.to_string(),
        },
        Message {
            role: "user".to_string(),
            content: payload.to_string(),
        },
    ];

    let mut body = json!({
        "model": config.model,
        "input": input,
        "text": {
            "format": {
                "type": "json_schema",
                "name": schema.name,
                "schema": schema.schema,
                "strict": true,
            }
        },
        "reasoning": {
            "effort": config.reasoning_effort,
            "summary": config.reasoning_summary,
        },
        "temperature": config.temperature,
        "tool_choice": config.tool_choice,
        "store": config.store,
    });
    if let Some(max) = config.max_output_tokens {
        body["max_output_tokens"] = json!(max);
    }
    body
}

impl StructuredOutput for LlmClient {
    async fn parse(
        &self,
        instruction: &str,
        payload: &str,
        schema: &OutputSchema,
        config: &AnalysisConfig,
    ) -> Result<(Value, Metadata), LlmError> {
        let body = request_body(instruction, payload, schema, config);
        debug!(
            schema = schema.name,
            model = %config.model,
            payload_len = payload.len(),
            "Structured-output request"
        );

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), schema = schema.name, "Provider error");
            return Err(LlmError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(response)) => extract_result_and_meta(response),
            _ => Err(LlmError::NoStructuredResult),
        }
    }
}

/// Split a provider response into the structured result and its metadata.
///
/// A pre-parsed `output_parsed` object wins; otherwise the output text is
/// parsed as JSON. Nothing else is tried.
pub fn extract_result_and_meta(mut response: Metadata) -> Result<(Value, Metadata), LlmError> {
    let output_text = match response.get("output_text").and_then(Value::as_str) {
        Some(text) => Some(text.to_string()),
        None => collect_output_text(response.get("output")),
    };
    let parsed = response.remove("output_parsed").filter(|v| !v.is_null());

    for key in STRIPPED_META_KEYS {
        response.remove(*key);
    }

    if let Some(parsed) = parsed {
        return Ok((parsed, response));
    }

    match output_text {
        Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)
            .map(|result| (result, response))
            .map_err(|_| LlmError::NoStructuredResult),
        _ => Err(LlmError::NoStructuredResult),
    }
}

/// Concatenate the `output_text` parts of all message items.
fn collect_output_text(output: Option<&Value>) -> Option<String> {
    let items = output?.as_array()?;
    let text: String = items
        .iter()
        .filter(|item| item["type"] == "message")
        .filter_map(|item| item["content"].as_array())
        .flatten()
        .filter(|part| part["type"] == "output_text")
        .filter_map(|part| part["text"].as_str())
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_map(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Outer {
        name: String,
        inner: Inner,
        items: Vec<Inner>,
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Inner {
        value: String,
    }

    #[test]
    fn test_parsed_object_preferred() {
        let response = as_map(json!({
            "id": "resp_1",
            "output_parsed": {"a": 1},
            "output_text": "{\"a\": 2}",
            "usage": {"total_tokens": 10},
        }));
        let (result, meta) = extract_result_and_meta(response).unwrap();
        assert_eq!(result, json!({"a": 1}));
        assert_eq!(meta["id"], "resp_1");
        assert!(meta.contains_key("usage"));
    }

    #[test]
    fn test_output_text_fallback() {
        let response = as_map(json!({"id": "resp_2", "output_text": "{\"a\": 2}"}));
        let (result, _) = extract_result_and_meta(response).unwrap();
        assert_eq!(result, json!({"a": 2}));
    }

    #[test]
    fn test_text_collected_from_output_items() {
        let response = as_map(json!({
            "id": "resp_3",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"lesarten\": "},
                    {"type": "output_text", "text": "[]}"}
                ]}
            ],
            "text": {"format": {"type": "json_schema"}},
        }));
        let (result, meta) = extract_result_and_meta(response).unwrap();
        assert_eq!(result, json!({"lesarten": []}));
        for key in ["output", "text", "output_text"] {
            assert!(!meta.contains_key(key), "{} leaked into metadata", key);
        }
    }

    #[test]
    fn test_no_structured_result() {
        let missing = as_map(json!({"id": "resp_4", "output_parsed": null}));
        assert!(matches!(
            extract_result_and_meta(missing),
            Err(LlmError::NoStructuredResult)
        ));

        let garbage = as_map(json!({"id": "resp_5", "output_text": "not json"}));
        assert!(matches!(
            extract_result_and_meta(garbage),
            Err(LlmError::NoStructuredResult)
        ));
    }

    #[test]
    fn test_endpoint_resolution() {
        let mut client = LlmClient {
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1/".to_string(),
            api_key: None,
        };
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/responses");

        client.base_url = "http://localhost:8080".to_string();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/responses");

        client.base_url = "http://proxy/custom/responses".to_string();
        assert_eq!(client.endpoint(), "http://proxy/custom/responses");
    }

    #[test]
    fn test_request_body_shape() {
        let schema = OutputSchema::of::<Inner>("inner");
        let mut config = AnalysisConfig::default();

        let body = request_body("anweisung", "nutzlast", &schema, &config);
        assert_eq!(body["input"][0]["role"], "developer");
        assert_eq!(body["input"][0]["content"], "anweisung");
        assert_eq!(body["input"][1]["role"], "user");
        assert_eq!(body["input"][1]["content"], "nutzlast");
        assert_eq!(body["text"]["format"]["name"], "inner");
        assert_eq!(body["text"]["format"]["strict"], true);
        assert_eq!(body["reasoning"]["effort"], "medium");
        assert_eq!(body["tool_choice"], "none");
        assert!(body.get("max_output_tokens").is_none());

        config.max_output_tokens = Some(2048);
        let body = request_body("anweisung", "nutzlast", &schema, &config);
        assert_eq!(body["max_output_tokens"], 2048);
    }

    #[test]
    fn test_temperature_sent_unwidened() {
        let schema = OutputSchema::of::<Inner>("inner");
        let mut config = AnalysisConfig::default();
        config.set("temperature", "0.7").unwrap();

        let body = request_body("anweisung", "nutzlast", &schema, &config);
        assert_eq!(body["temperature"], json!(0.7));
        assert!(serde_json::to_string(&body).unwrap().contains("\"temperature\":0.7"));
    }

    #[test]
    fn test_schema_is_strict() {
        let schema = OutputSchema::of::<Outer>("outer").schema;
        assert_eq!(schema["additionalProperties"], false);
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["name", "inner", "items"]);
        assert_eq!(schema["properties"]["inner"]["additionalProperties"], false);
        assert_eq!(
            schema["properties"]["items"]["items"]["required"],
            json!(["value"])
        );
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("definitions").is_none());
    }
}
