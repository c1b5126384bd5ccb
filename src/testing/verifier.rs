//! Outcome verifier
//!
//! Evaluates captured responses against a scenario's predicates. Every
//! predicate is evaluated; every failure is recorded.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::common::{Error, Result};

use super::config::ExpectedOutcome;
use super::executor::ExecutionResult;

/// Longest body excerpt quoted in a diagnostic
const SNIPPET_CHARS: usize = 200;

/// One failed predicate and why
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredicateFailure {
    pub predicate: String,
    pub explanation: String,
}

/// Verdict for one scenario run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerificationOutcome {
    pub scenario: String,
    pub passed: bool,
    pub cancelled: bool,
    pub failures: Vec<PredicateFailure>,
    pub duration_ms: u64,
}

impl VerificationOutcome {
    /// A passing outcome with nothing recorded yet
    pub fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: true,
            cancelled: false,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Record a failure; the outcome no longer passes
    pub fn fail(&mut self, predicate: impl Into<String>, explanation: impl Into<String>) {
        self.passed = false;
        self.failures.push(PredicateFailure {
            predicate: predicate.into(),
            explanation: explanation.into(),
        });
    }

    /// Record a runtime error raised while executing `stage`
    pub fn fail_with(&mut self, stage: &str, err: &Error) {
        if matches!(err, Error::Cancelled) {
            self.cancelled = true;
        }
        self.fail(stage, explain(err));
    }

    /// An outcome for a scenario that never got past `stage`
    pub fn from_error(scenario: &str, stage: &str, err: &Error) -> Self {
        let mut outcome = Self::new(scenario);
        outcome.fail_with(stage, err);
        outcome
    }
}

/// Diagnostic text for an error, without repeating the predicate
fn explain(err: &Error) -> String {
    match err {
        Error::AssertionFailure {
            expected, actual, ..
        } => format!("expected {}, got {}", expected, actual),
        other => other.to_string(),
    }
}

/// Evaluate `outcomes` against `result`
pub fn verify(
    scenario: &str,
    result: &ExecutionResult,
    outcomes: &[ExpectedOutcome],
) -> VerificationOutcome {
    let mut outcome = VerificationOutcome::new(scenario);
    verify_into(&mut outcome, None, result, outcomes);
    outcome
}

/// Evaluate `outcomes` and fold failures into an existing outcome,
/// prefixing predicate names with `label` (used for follow-up probes).
pub fn verify_into(
    outcome: &mut VerificationOutcome,
    label: Option<&str>,
    result: &ExecutionResult,
    outcomes: &[ExpectedOutcome],
) {
    for predicate in outcomes {
        if let Err(err) = check(result, predicate) {
            let name = match label {
                Some(label) => format!("{}: {}", label, predicate),
                None => predicate.to_string(),
            };
            outcome.fail(name, explain(&err));
        }
    }
}

/// Evaluate one predicate
pub fn check(result: &ExecutionResult, predicate: &ExpectedOutcome) -> Result<()> {
    match predicate {
        ExpectedOutcome::StatusCode(code) => {
            if result.status == *code {
                Ok(())
            } else {
                Err(failure(
                    predicate,
                    code.to_string(),
                    format!("{} (body: {})", result.status, snippet(&result.raw_body)),
                ))
            }
        }
        ExpectedOutcome::JsonFieldAbsent(path) => {
            let json = require_json(result, predicate)?;
            match records(json) {
                Records::Each(items) => {
                    let offending: Vec<usize> = items
                        .iter()
                        .enumerate()
                        .filter(|(_, item)| lookup(item, path).is_some())
                        .map(|(i, _)| i)
                        .collect();
                    if offending.is_empty() {
                        Ok(())
                    } else {
                        Err(failure(
                            predicate,
                            format!("no element of data to contain '{}'", path),
                            format!("present in elements {:?} of {}", offending, items.len()),
                        ))
                    }
                }
                Records::Root(value) => match lookup(value, path) {
                    None => Ok(()),
                    Some(found) => Err(failure(
                        predicate,
                        format!("'{}' to be absent", path),
                        format!("'{}' = {}", path, found),
                    )),
                },
            }
        }
        ExpectedOutcome::JsonFieldPresent(path) => {
            let json = require_json(result, predicate)?;
            match records(json) {
                Records::Each(items) => {
                    if items.is_empty() {
                        return Err(failure(
                            predicate,
                            format!("every element of data to contain '{}'", path),
                            "an empty data array",
                        ));
                    }
                    let missing: Vec<usize> = items
                        .iter()
                        .enumerate()
                        .filter(|(_, item)| lookup(item, path).is_none())
                        .map(|(i, _)| i)
                        .collect();
                    if missing.is_empty() {
                        Ok(())
                    } else {
                        Err(failure(
                            predicate,
                            format!("every element of data to contain '{}'", path),
                            format!("missing in elements {:?} of {}", missing, items.len()),
                        ))
                    }
                }
                Records::Root(value) => match lookup(value, path) {
                    Some(_) => Ok(()),
                    None => Err(failure(
                        predicate,
                        format!("'{}' to be present", path),
                        format!("no such field in {}", snippet(&result.raw_body)),
                    )),
                },
            }
        }
        ExpectedOutcome::JsonFragmentContains(fragment) => {
            let json = require_json(result, predicate)?;
            let missing: Vec<String> = fragment_parts(fragment)
                .into_iter()
                .filter(|part| !part.found_in(json))
                .map(|part| part.to_string())
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(failure(
                    predicate,
                    format!("body to contain {}", missing.join(", ")),
                    snippet(&result.raw_body),
                ))
            }
        }
        ExpectedOutcome::JsonFragmentMissing(fragment) => {
            // A body that is not JSON cannot contain the fragment.
            let Some(json) = &result.json else {
                return Ok(());
            };
            let present: Vec<String> = fragment_parts(fragment)
                .into_iter()
                .filter(|part| part.found_in(json))
                .map(|part| part.to_string())
                .collect();
            if present.is_empty() {
                Ok(())
            } else {
                Err(failure(
                    predicate,
                    format!("body not to contain {}", present.join(", ")),
                    snippet(&result.raw_body),
                ))
            }
        }
        ExpectedOutcome::ValidationErrorOn(field) => {
            let json = require_json(result, predicate)?;
            let errors = match json.get("errors") {
                Some(Value::Object(errors)) => Some(errors),
                _ => None,
            };
            match errors {
                Some(errors) if errors.contains_key(field) => Ok(()),
                Some(errors) => Err(failure(
                    predicate,
                    format!("a validation error keyed by '{}'", field),
                    format!(
                        "errors for {:?}",
                        errors.keys().map(String::as_str).collect::<Vec<_>>()
                    ),
                )),
                None => Err(failure(
                    predicate,
                    format!("a validation error keyed by '{}'", field),
                    format!("no errors object in {}", snippet(&result.raw_body)),
                )),
            }
        }
        ExpectedOutcome::BodyContains(text) => {
            if result.raw_body.contains(text.as_str()) {
                Ok(())
            } else {
                Err(failure(
                    predicate,
                    format!("body containing {:?}", text),
                    snippet(&result.raw_body),
                ))
            }
        }
    }
}

fn failure(
    predicate: &ExpectedOutcome,
    expected: impl Into<String>,
    actual: impl Into<String>,
) -> Error {
    Error::AssertionFailure {
        predicate: predicate.to_string(),
        expected: expected.into(),
        actual: actual.into(),
    }
}

fn require_json<'a>(result: &'a ExecutionResult, predicate: &ExpectedOutcome) -> Result<&'a Value> {
    result.json.as_ref().ok_or_else(|| {
        failure(
            predicate,
            "a JSON body",
            format!("non-JSON body {}", snippet(&result.raw_body)),
        )
    })
}

fn snippet(body: &str) -> String {
    if body.is_empty() {
        return "<empty>".to_string();
    }
    if body.chars().count() > SNIPPET_CHARS {
        format!("{}...", body.chars().take(SNIPPET_CHARS).collect::<String>())
    } else {
        body.to_string()
    }
}

/// What field predicates quantify over
enum Records<'a> {
    /// Every element of a top-level `data` array
    Each(&'a [Value]),
    Root(&'a Value),
}

fn records(json: &Value) -> Records<'_> {
    match json.get("data") {
        Some(Value::Array(items)) => Records::Each(items),
        _ => Records::Root(json),
    }
}

/// Resolve a dot path; numeric segments index arrays
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// One unit of a fragment: a key/value pair, or a bare value
enum FragmentPart<'a> {
    Pair(&'a str, &'a Value),
    Value(&'a Value),
}

impl FragmentPart<'_> {
    fn found_in(&self, json: &Value) -> bool {
        match self {
            FragmentPart::Pair(key, expected) => contains_pair(json, key, expected),
            FragmentPart::Value(expected) => contains_value(json, expected),
        }
    }
}

impl std::fmt::Display for FragmentPart<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FragmentPart::Pair(key, value) => write!(f, "\"{}\": {}", key, value),
            FragmentPart::Value(value) => write!(f, "{}", value),
        }
    }
}

fn fragment_parts(fragment: &Value) -> Vec<FragmentPart<'_>> {
    match fragment {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| FragmentPart::Pair(k.as_str(), v))
            .collect(),
        Value::Array(items) => items.iter().map(FragmentPart::Value).collect(),
        other => vec![FragmentPart::Value(other)],
    }
}

/// Does any object at any depth map `key` to a value matching `expected`?
fn contains_pair(json: &Value, key: &str, expected: &Value) -> bool {
    match json {
        Value::Object(map) => {
            map.get(key).is_some_and(|v| matches_value(v, expected))
                || map.values().any(|v| contains_pair(v, key, expected))
        }
        Value::Array(items) => items.iter().any(|v| contains_pair(v, key, expected)),
        _ => false,
    }
}

/// Does a value matching `expected` occur at any depth?
fn contains_value(json: &Value, expected: &Value) -> bool {
    if matches_value(json, expected) {
        return true;
    }
    match json {
        Value::Object(map) => map.values().any(|v| contains_value(v, expected)),
        Value::Array(items) => items.iter().any(|v| contains_value(v, expected)),
        _ => false,
    }
}

/// Objects match when `actual` has every expected pair; everything else
/// must be equal.
fn matches_value(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => is_subset(actual, expected),
        _ => actual == expected,
    }
}

fn is_subset(actual: &Map<String, Value>, expected: &Map<String, Value>) -> bool {
    expected
        .iter()
        .all(|(k, v)| actual.get(k).is_some_and(|a| matches_value(a, v)))
}
