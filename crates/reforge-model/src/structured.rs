use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::{with_retry, LanguageModel, ModelConfig, ModelError, RetryPolicy};

/// Sends prompts to a model and decodes the reply into typed structs.
///
/// A reply is expected to carry one JSON object, preferably wrapped as
/// ```text
/// <response>
/// {"status": "ok", ...fields...}
/// </response>
/// ```
/// A fenced ```json block or a bare object are accepted as fallbacks. The
/// `status` tag is optional; `{"status": "error", "message": "..."}` is the
/// model's way of declining the task.
#[derive(Clone)]
pub struct StructuredClient {
    model: Arc<dyn LanguageModel>,
    config: ModelConfig,
    retry: RetryPolicy,
}

impl StructuredClient {
    pub fn new(model: Arc<dyn LanguageModel>, config: ModelConfig) -> Self {
        Self {
            model,
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// One structured request: model call plus boundary decode, retried as a unit
    pub async fn request<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, ModelError> {
        with_retry(self.retry, || async {
            let output = self.model.complete(prompt, &self.config).await?;
            debug!(
                model = self.model.name(),
                text_len = output.text.len(),
                duration_secs = output.duration.as_secs_f64(),
                "Model responded"
            );
            decode_response(&output.text)
        })
        .await
    }
}

/// Decode a typed payload out of raw model text
pub fn decode_response<T: DeserializeOwned>(text: &str) -> Result<T, ModelError> {
    let json = extract_json(text)
        .ok_or_else(|| ModelError::MalformedResponse("no JSON object in response".into()))?;

    let mut value: Value = serde_json::from_str(json)
        .map_err(|e| ModelError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let status = value.as_object_mut().and_then(|obj| obj.remove("status"));

    match status {
        None => decode_payload(value),
        Some(Value::String(s)) => match s.to_lowercase().as_str() {
            "ok" | "success" => decode_payload(value),
            "error" => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("no reason given")
                    .to_string();
                Err(ModelError::Refused(message))
            }
            other => Err(ModelError::MalformedResponse(format!(
                "unknown response status: {}",
                other
            ))),
        },
        Some(other) => Err(ModelError::MalformedResponse(format!(
            "non-string response status: {}",
            other
        ))),
    }
}

fn decode_payload<T: DeserializeOwned>(value: Value) -> Result<T, ModelError> {
    serde_json::from_value(value)
        .map_err(|e| ModelError::MalformedResponse(format!("schema mismatch: {}", e)))
}

/// Locate the JSON payload inside free-form model output
fn extract_json(text: &str) -> Option<&str> {
    if let (Some(start), Some(end)) = (text.find("<response>"), text.rfind("</response>")) {
        if start < end {
            return Some(text[start + "<response>".len()..end].trim());
        }
    }

    // The closing fence is not searched for: code inside the payload may
    // contain fences of its own.
    if let Some(start) = text.find("```json") {
        if let Some(object) = leading_object(&text[start + "```json".len()..]) {
            return Some(object);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// The first complete JSON object in `text`, as far as the parser reads it
fn leading_object(text: &str) -> Option<&str> {
    let rest = &text[text.find('{')?..];
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(_))) => Some(&rest[..stream.byte_offset()]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        score: f64,
        #[serde(default)]
        issues: Vec<String>,
    }

    #[test]
    fn test_decode_response_block() {
        let text = r#"
Reviewing the change now.

<response>
{"status": "ok", "score": 0.9, "issues": ["minor naming"]}
</response>
"#;
        let decoded: Score = decode_response(text).unwrap();
        assert_eq!(
            decoded,
            Score {
                score: 0.9,
                issues: vec!["minor naming".into()]
            }
        );
    }

    #[test]
    fn test_decode_fenced_json_without_status() {
        let text = "Here you go:\n```json\n{\"score\": 0.4}\n```\nDone.";
        let decoded: Score = decode_response(text).unwrap();
        assert_eq!(decoded.score, 0.4);
        assert!(decoded.issues.is_empty());
    }

    #[test]
    fn test_fenced_json_may_contain_fences() {
        #[derive(Debug, Deserialize)]
        struct Candidate {
            modified_code: String,
        }

        let text = "```json\n{\"modified_code\": \"/// ```\\n/// assert!(true);\\n/// ```\\nfn a() {}\"}\n```";
        let decoded: Candidate = decode_response(text).unwrap();
        assert_eq!(
            decoded.modified_code,
            "/// ```\n/// assert!(true);\n/// ```\nfn a() {}"
        );
    }

    #[test]
    fn test_decode_bare_object() {
        let decoded: Score = decode_response("result: {\"score\": 1.0} end").unwrap();
        assert_eq!(decoded.score, 1.0);
    }

    #[test]
    fn test_error_envelope_is_refusal() {
        let text = r#"<response>{"status": "error", "message": "cannot evaluate"}</response>"#;
        let result: Result<Score, _> = decode_response(text);
        match result {
            Err(ModelError::Refused(message)) => assert_eq!(message, "cannot evaluate"),
            other => panic!("expected refusal, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_mismatch_is_malformed() {
        let result: Result<Score, _> = decode_response(r#"{"status": "ok", "score": "high"}"#);
        assert!(matches!(result, Err(ModelError::MalformedResponse(_))));
    }

    #[test]
    fn test_no_json_is_malformed() {
        let result: Result<Score, _> = decode_response("I could not do that.");
        assert!(matches!(result, Err(ModelError::MalformedResponse(_))));
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        let result: Result<Score, _> = decode_response(r#"{"status": "maybe", "score": 0.5}"#);
        assert!(matches!(result, Err(ModelError::MalformedResponse(_))));
    }
}
