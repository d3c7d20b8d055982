//! Raw runtime output → [`TestOutcome`] list.
//!
//! The harness normally reports a JSON array of
//! `{name, passed, duration?, error?}` records. When the output isn't JSON
//! at all (an older harness, or plain `pytest -v` text) the lines are
//! scanned for `path::...::name PASSED|FAILED` instead. Parsing never
//! fails; unrecognised output yields no outcomes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::protocol::TestOutcome;

static VERBOSE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\S+::(\S+)\s+(PASSED|FAILED)").expect("verbose line pattern is valid")
});

pub fn parse_outcomes(raw_output: &str) -> Vec<TestOutcome> {
    match serde_json::from_str::<Value>(raw_output) {
        Ok(value @ Value::Array(_)) => match serde_json::from_value(value) {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::warn!(error = %e, "Structured results had unexpected records");
                Vec::new()
            }
        },
        Ok(_) => Vec::new(),
        Err(_) => parse_verbose_output(raw_output),
    }
}

fn parse_verbose_output(output: &str) -> Vec<TestOutcome> {
    output
        .lines()
        .filter_map(|line| {
            let caps = VERBOSE_LINE.captures(line)?;
            let name = &caps[1];
            Some(match &caps[2] {
                "PASSED" => TestOutcome::passed(name),
                _ => TestOutcome::failed(name),
            })
        })
        .collect()
}
