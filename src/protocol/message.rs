use serde::{Deserialize, Serialize};

use crate::protocol::request::ExecutionRequest;

/// Caller → runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Load the runtime. Answered by exactly one `ready` or `error`.
    Init,
    /// Run a test suite. Answered by exactly one `results` or `error`.
    Run(ExecutionRequest),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Init => "init",
            Command::Run(_) => "run",
        }
    }
}

/// Raw payload of a `results` event, before outcome parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResults {
    pub raw_output: String,
    pub exit_code: i32,
}

/// Runtime → caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Ready,
    Results(RawResults),
    Error { message: String },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Ready => "ready",
            Event::Results(_) => "results",
            Event::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            source_code: "def add(a, b):\n    return a + b\n".to_string(),
            test_spec: "from calc import add\n".to_string(),
            module_name: "calc".to_string(),
            test_file_name: "test_calc.py".to_string(),
            level_filter: Some(2),
        }
    }

    #[test]
    fn init_wire_shape() {
        assert_eq!(
            serde_json::to_value(Command::Init).unwrap(),
            json!({"type": "init"})
        );
    }

    #[test]
    fn run_wire_shape_flattens_request() {
        assert_eq!(
            serde_json::to_value(Command::Run(request())).unwrap(),
            json!({
                "type": "run",
                "sourceCode": "def add(a, b):\n    return a + b\n",
                "testSpec": "from calc import add\n",
                "moduleName": "calc",
                "testFileName": "test_calc.py",
                "levelFilter": 2
            })
        );
    }

    #[test]
    fn run_without_level_filter_sends_null() {
        let mut req = request();
        req.level_filter = None;
        let value = serde_json::to_value(Command::Run(req)).unwrap();
        assert_eq!(value["levelFilter"], serde_json::Value::Null);
    }

    #[test]
    fn decodes_runtime_events() {
        let ready: Event = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, Event::Ready);

        let results: Event =
            serde_json::from_str(r#"{"type":"results","rawOutput":"[]","exitCode":5}"#).unwrap();
        assert_eq!(
            results,
            Event::Results(RawResults {
                raw_output: "[]".to_string(),
                exit_code: 5,
            })
        );

        let error: Event =
            serde_json::from_str(r#"{"type":"error","message":"SyntaxError: bad"}"#).unwrap();
        assert_eq!(
            error,
            Event::Error {
                message: "SyntaxError: bad".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_event_type() {
        assert!(serde_json::from_str::<Event>(r#"{"type":"progress"}"#).is_err());
    }

    #[test]
    fn kinds() {
        assert_eq!(Command::Init.kind(), "init");
        assert_eq!(Command::Run(request()).kind(), "run");
        assert_eq!(Event::Ready.kind(), "ready");
        assert_eq!(
            Event::Error {
                message: String::new()
            }
            .kind(),
            "error"
        );
    }
}
