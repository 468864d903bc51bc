//! External call execution.
//!
//! A [`CommandRunner`] performs exactly one call (process or HTTP) under an
//! activation and returns parsed JSON or a typed failure. Nonzero exits and
//! non-2xx statuses are always errors; the orchestrator decides what to do
//! with them.
use crate::environment::ScopedActivation;
use crate::error::EvidenceError;
use crate::job::CommandSpec;
use serde_json::Value;
use std::time::Duration;

mod exec;
mod http;

/// Default bound on a single external call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Bytes of stderr/body kept in error messages.
const MAX_ERROR_DETAIL_BYTES: usize = 2048;

/// Parsed result of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub body: Value,
    /// `rel="next"` target from an HTTP `Link` header.
    pub next_link: Option<String>,
}

impl CommandOutput {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            next_link: None,
        }
    }
}

pub trait CommandRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        activation: &ScopedActivation,
    ) -> Result<CommandOutput, EvidenceError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(
        &self,
        spec: &CommandSpec,
        activation: &ScopedActivation,
    ) -> Result<CommandOutput, EvidenceError> {
        (**self).run(spec, activation)
    }
}

/// Runs real processes and HTTP requests, each bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        activation: &ScopedActivation,
    ) -> Result<CommandOutput, EvidenceError> {
        match spec {
            CommandSpec::Exec(argv) => {
                let args = argv.to_argv().map_err(|err| EvidenceError::Execution {
                    program: "<exec>".to_string(),
                    detail: format!("{err:#}"),
                })?;
                exec::run_process(&args, activation, self.timeout)
            }
            CommandSpec::Http(request) => http::send(request, activation, self.timeout),
        }
    }
}

/// Parse command output as JSON.
///
/// A single document is preferred; output where every non-blank line is its
/// own JSON value is returned as an array of those values. Empty output is
/// an error, since an empty file would read as "no findings".
pub fn parse_json_output(source_label: &str, text: &str) -> Result<Value, EvidenceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EvidenceError::parse(source_label, "empty output"));
    }
    let whole_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let lines: Vec<&str> = trimmed.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.len() > 1 {
        let parsed: Result<Vec<Value>, _> = lines
            .iter()
            .map(|line| serde_json::from_str::<Value>(line))
            .collect();
        if let Ok(values) = parsed {
            return Ok(Value::Array(values));
        }
    }

    Err(EvidenceError::parse(
        source_label,
        format!(
            "{whole_err} (first bytes: {:?})",
            crate::util::truncate_string(trimmed, 200)
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_single_document() {
        let value = parse_json_output("aws", "{\"Users\": []}\n").unwrap();
        assert_eq!(value, json!({"Users": []}));
    }

    #[test]
    fn parses_line_delimited_documents() {
        let value = parse_json_output("aws", "{\"a\":1}\n\n{\"b\":2}\n").unwrap();
        assert_eq!(value, json!([{"a": 1}, {"b": 2}]));
    }

    #[test]
    fn empty_output_is_a_parse_error() {
        let err = parse_json_output("aws", "  \n").unwrap_err();
        assert_eq!(err.category(), "parse");
    }

    #[test]
    fn text_output_is_a_parse_error() {
        let err = parse_json_output("aws", "Unknown output type: text\nsecond line").unwrap_err();
        assert_eq!(err.category(), "parse");
        assert!(err.to_string().contains("Unknown output type"));
    }
}
