use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw completion returned by a model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Completion text
    pub text: String,
    /// Diagnostic output (stderr for process backends)
    pub diagnostics: String,
    /// Exit code for process backends, 0 for HTTP backends
    pub exit_code: i32,
    /// Wall-clock duration of the call
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl ModelOutput {
    pub fn new(text: String, diagnostics: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            text,
            diagnostics,
            exit_code,
            duration,
        }
    }

    /// Check if the backend reported success
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Count lines in the completion
    pub fn text_lines(&self) -> usize {
        self.text.lines().count()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(duration: &str) -> Result<ModelOutput, serde_json::Error> {
        serde_json::from_str(&format!(
            r#"{{"text": "ok", "diagnostics": "", "exit_code": 0, "duration": {}}}"#,
            duration
        ))
    }

    #[test]
    fn test_duration_deserializes_from_seconds() {
        let output = parse("1.5").unwrap();
        assert_eq!(output.duration, Duration::from_millis(1500));
        assert_eq!(output.text_lines(), 1);
    }

    #[test]
    fn test_unrepresentable_duration_is_an_error() {
        assert!(parse("-1.0").is_err());
        assert!(parse("1e300").is_err());
    }
}
