//! Scenario definition types
//!
//! YAML scenario files deserialize into the raw `*Spec` types, which are
//! then validated and frozen into [`Scenario`]. A malformed scenario is
//! rejected here, before any request leaves the process.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::common::config::UploadPolicy;
use crate::common::{Error, Result};

/// Default multipart field name for attachments
const DEFAULT_ATTACHMENT_FIELD: &str = "attachment";

/// Synthetic payloads are produced in chunks of this many bytes
const PAYLOAD_CHUNK: u64 = 64 * 1024;

/// Filler byte for synthetic payloads
const PAYLOAD_FILL: u8 = b'a';

// ============================================================================
// Raw YAML types
// ============================================================================

/// A scenario as written in a YAML document
#[derive(Deserialize, Debug)]
pub struct ScenarioSpec {
    /// Name of the scenario, unique within a run
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,
    /// Values for `{var}` placeholders
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    /// The HTTP request under test
    pub request: Option<RequestDescriptor>,
    /// Expectations on the response to `request`
    pub expect: Option<Expectation>,
    /// Follow-up probes issued after `request`
    #[serde(default)]
    pub then: Vec<FollowUpSpec>,
    /// Browser steps, for UI scenarios
    pub ui: Option<UiSpec>,
}

/// Expectations as written in YAML: every key is optional and each set
/// key contributes one or more predicates.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct Expectation {
    /// Exact status code
    pub status: Option<u16>,
    /// Dot paths that must exist (in every `data` element when present)
    #[serde(default, deserialize_with = "one_or_many")]
    pub json_field_present: Vec<String>,
    /// Dot paths that must not exist (in any `data` element when present)
    #[serde(default, deserialize_with = "one_or_many")]
    pub json_field_absent: Vec<String>,
    /// Mapping (or scalar) that must occur somewhere in the body
    pub json_fragment: Option<Value>,
    /// Mapping (or scalar) that must not occur anywhere in the body
    pub json_fragment_missing: Option<Value>,
    /// Fields that must carry a validation error
    #[serde(default, deserialize_with = "one_or_many")]
    pub validation_errors: Vec<String>,
    /// Substrings of the raw body
    #[serde(default, deserialize_with = "one_or_many")]
    pub body_contains: Vec<String>,
}

/// A follow-up probe as written in YAML
#[derive(Deserialize, Debug)]
pub struct FollowUpSpec {
    pub request: RequestDescriptor,
    pub expect: Expectation,
}

/// Browser steps as written in YAML
#[derive(Deserialize, Debug)]
pub struct UiSpec {
    pub steps: Vec<UiStepSpec>,
}

/// A single browser step
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UiStepSpec {
    /// Navigate to a URL (relative to the UI base URL, or absolute)
    Navigate { url: String },
    /// Fill an input
    Fill { selector: String, value: String },
    /// Press a key on an element
    Press { selector: String, key: String },
    /// Poll until any of the conditions holds
    WaitFor {
        any_of: Vec<UiConditionSpec>,
        timeout_ms: Option<u64>,
    },
    /// Run nested steps only when the selector is visible
    IfVisible {
        selector: String,
        steps: Vec<UiStepSpec>,
    },
}

/// A UI condition as written in YAML; exactly one key must be set
#[derive(Deserialize, Debug, Default)]
pub struct UiConditionSpec {
    /// Regex the page title must match
    pub title_matches: Option<String>,
    /// Selector that must be visible
    pub visible: Option<String>,
    /// Selector with a minimum match count
    pub count_at_least: Option<CountSpec>,
}

#[derive(Deserialize, Debug)]
pub struct CountSpec {
    pub selector: String,
    #[serde(default = "default_min_count")]
    pub min: usize,
}

fn default_min_count() -> usize {
    1
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

// ============================================================================
// Request model
// ============================================================================

/// HTTP methods a scenario may use
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One HTTP request
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the base URL, may contain `{var}` placeholders
    pub path: String,
    /// Role to act as; unauthenticated when absent
    #[serde(default, rename = "as", alias = "acting_as")]
    pub acting_as: Option<String>,
    /// JSON payload (text parts when attachments are present)
    #[serde(default, rename = "json")]
    pub json_body: Option<serde_json::Map<String, Value>>,
    /// Multipart file parts, in order
    #[serde(default)]
    pub attachments: Vec<FileDescriptor>,
}

/// One multipart file part
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FileDescriptor {
    /// Form field name
    #[serde(default = "default_attachment_field")]
    pub field: String,
    pub filename: String,
    /// Declared MIME type; guessed from the extension when absent
    pub content_type: Option<String>,
    /// Payload size in bytes
    pub size_bytes: Option<u64>,
    /// Payload size in KB (1 KB = 1024 bytes)
    pub size_kb: Option<u64>,
    /// Literal payload
    pub content: Option<String>,
}

fn default_attachment_field() -> String {
    DEFAULT_ATTACHMENT_FIELD.to_string()
}

impl FileDescriptor {
    fn validate(&self, scenario: &str) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::invalid_scenario(scenario, "attachment filename is empty"));
        }
        if self.field.trim().is_empty() {
            return Err(Error::invalid_scenario(
                scenario,
                format!("attachment '{}' has an empty field name", self.filename),
            ));
        }
        let sources = [
            self.size_bytes.is_some(),
            self.size_kb.is_some(),
            self.content.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if sources != 1 {
            return Err(Error::invalid_scenario(
                scenario,
                format!(
                    "attachment '{}' needs exactly one of size_bytes, size_kb, content",
                    self.filename
                ),
            ));
        }
        let len = match self.size_kb {
            Some(kb) => kb.checked_mul(1024),
            None => Some(self.len()),
        };
        if len.and_then(|len| usize::try_from(len).ok()).is_none() {
            return Err(Error::invalid_scenario(
                scenario,
                format!("attachment '{}' size overflows", self.filename),
            ));
        }
        if let Some(ct) = &self.content_type {
            if reqwest::multipart::Part::text("").mime_str(ct).is_err() {
                return Err(Error::invalid_scenario(
                    scenario,
                    format!(
                        "attachment '{}' has an invalid content type '{}'",
                        self.filename, ct
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Exact payload length in bytes
    pub fn len(&self) -> u64 {
        if let Some(content) = &self.content {
            content.len() as u64
        } else if let Some(kb) = self.size_kb {
            kb.saturating_mul(1024)
        } else {
            self.size_bytes.unwrap_or(0)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes to upload, in bounded chunks.
    ///
    /// Synthetic payloads are generated lazily, so memory use does not grow
    /// with the configured size.
    pub fn chunks(&self) -> Box<dyn Iterator<Item = Vec<u8>> + Send + Sync> {
        if let Some(content) = &self.content {
            return Box::new(std::iter::once(content.as_bytes().to_vec()));
        }
        let len = self.len();
        Box::new(
            (0..len.div_ceil(PAYLOAD_CHUNK)).map(move |i| {
                let n = PAYLOAD_CHUNK.min(len - i * PAYLOAD_CHUNK) as usize;
                vec![PAYLOAD_FILL; n]
            }),
        )
    }

    /// Declared MIME type, falling back to one derived from the extension
    pub fn mime(&self) -> String {
        if let Some(ct) = &self.content_type {
            return ct.clone();
        }
        let ext = Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => "application/pdf",
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "txt" => "text/plain",
            "json" => "application/json",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// A single checkable expectation about an execution result
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "arg", rename_all = "snake_case")]
pub enum ExpectedOutcome {
    StatusCode(u16),
    JsonFieldAbsent(String),
    JsonFieldPresent(String),
    JsonFragmentContains(Value),
    JsonFragmentMissing(Value),
    ValidationErrorOn(String),
    BodyContains(String),
}

impl fmt::Display for ExpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedOutcome::StatusCode(code) => write!(f, "status == {}", code),
            ExpectedOutcome::JsonFieldAbsent(path) => write!(f, "field '{}' absent", path),
            ExpectedOutcome::JsonFieldPresent(path) => write!(f, "field '{}' present", path),
            ExpectedOutcome::JsonFragmentContains(v) => write!(f, "json contains {}", v),
            ExpectedOutcome::JsonFragmentMissing(v) => write!(f, "json lacks {}", v),
            ExpectedOutcome::ValidationErrorOn(field) => {
                write!(f, "validation error on '{}'", field)
            }
            ExpectedOutcome::BodyContains(text) => write!(f, "body contains {:?}", text),
        }
    }
}

impl Expectation {
    /// Expand into the ordered predicate list
    pub fn into_outcomes(self) -> Vec<ExpectedOutcome> {
        let mut outcomes = Vec::new();
        if let Some(code) = self.status {
            outcomes.push(ExpectedOutcome::StatusCode(code));
        }
        outcomes.extend(
            self.json_field_present
                .into_iter()
                .map(ExpectedOutcome::JsonFieldPresent),
        );
        outcomes.extend(
            self.json_field_absent
                .into_iter()
                .map(ExpectedOutcome::JsonFieldAbsent),
        );
        if let Some(fragment) = self.json_fragment {
            outcomes.push(ExpectedOutcome::JsonFragmentContains(fragment));
        }
        if let Some(fragment) = self.json_fragment_missing {
            outcomes.push(ExpectedOutcome::JsonFragmentMissing(fragment));
        }
        outcomes.extend(
            self.validation_errors
                .into_iter()
                .map(ExpectedOutcome::ValidationErrorOn),
        );
        outcomes.extend(self.body_contains.into_iter().map(ExpectedOutcome::BodyContains));
        outcomes
    }
}

// ============================================================================
// Validated scenario
// ============================================================================

/// A follow-up probe: its predicates count toward the owning scenario
#[derive(Debug, Clone)]
pub struct FollowUp {
    pub request: RequestDescriptor,
    pub expect: Vec<ExpectedOutcome>,
}

/// An HTTP scenario: one request, its predicates, and follow-up probes
#[derive(Debug, Clone)]
pub struct HttpScenario {
    pub request: RequestDescriptor,
    pub expect: Vec<ExpectedOutcome>,
    pub then: Vec<FollowUp>,
}

/// A browser scenario
#[derive(Debug, Clone)]
pub struct UiScenario {
    pub steps: Vec<UiStep>,
}

/// A validated browser step
#[derive(Debug, Clone)]
pub enum UiStep {
    Navigate { url: String },
    Fill { selector: String, value: String },
    Press { selector: String, key: String },
    WaitFor {
        any_of: Vec<UiCondition>,
        timeout_ms: Option<u64>,
    },
    IfVisible { selector: String, steps: Vec<UiStep> },
}

/// A validated page condition
#[derive(Debug, Clone)]
pub enum UiCondition {
    TitleMatches(Regex),
    Visible(String),
    CountAtLeast { selector: String, min: usize },
}

impl fmt::Display for UiCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiCondition::TitleMatches(re) => write!(f, "title matches /{}/", re.as_str()),
            UiCondition::Visible(sel) => write!(f, "'{}' visible", sel),
            UiCondition::CountAtLeast { selector, min } => {
                write!(f, "count('{}') >= {}", selector, min)
            }
        }
    }
}

/// What a scenario does
#[derive(Debug, Clone)]
pub enum ScenarioBody {
    Http(HttpScenario),
    Ui(UiScenario),
}

/// One declarative test case; immutable once constructed
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    source: Option<PathBuf>,
    body: ScenarioBody,
}

impl Scenario {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// File the scenario was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn body(&self) -> &ScenarioBody {
        &self.body
    }

    /// Every role the scenario acts as, including follow-ups
    pub fn roles(&self) -> BTreeSet<&str> {
        match &self.body {
            ScenarioBody::Http(http) => std::iter::once(&http.request)
                .chain(http.then.iter().map(|f| &f.request))
                .filter_map(|r| r.acting_as.as_deref())
                .collect(),
            ScenarioBody::Ui(_) => BTreeSet::new(),
        }
    }

    /// Validate a raw spec and freeze it, filling `{var}` placeholders
    /// from the spec's own vars and then `overrides`.
    pub fn from_spec(spec: ScenarioSpec, overrides: &BTreeMap<String, String>) -> Result<Self> {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::invalid_scenario("<unnamed>", "name is empty"));
        }

        let mut vars: BTreeMap<String, String> = spec
            .vars
            .into_iter()
            .map(|(k, v)| (k, value_to_text(&v)))
            .collect();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let body = match (spec.request, spec.ui) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_scenario(
                    &name,
                    "has both 'request' and 'ui'; split it into two scenarios",
                ))
            }
            (None, None) => {
                return Err(Error::invalid_scenario(&name, "needs either 'request' or 'ui'"))
            }
            (Some(request), None) => {
                let request = build_request(&name, request, &vars)?;
                let expect = spec.expect.unwrap_or_default().into_outcomes();
                if expect.is_empty() {
                    return Err(Error::invalid_scenario(
                        &name,
                        "has no expectations; add at least one key under 'expect'",
                    ));
                }
                let then = spec
                    .then
                    .into_iter()
                    .enumerate()
                    .map(|(i, follow)| {
                        let request = build_request(&name, follow.request, &vars)?;
                        let expect = follow.expect.into_outcomes();
                        if expect.is_empty() {
                            return Err(Error::invalid_scenario(
                                &name,
                                format!("follow-up {} has no expectations", i + 1),
                            ));
                        }
                        Ok(FollowUp { request, expect })
                    })
                    .collect::<Result<Vec<_>>>()?;
                ScenarioBody::Http(HttpScenario {
                    request,
                    expect,
                    then,
                })
            }
            (None, Some(ui)) => {
                if spec.expect.is_some() || !spec.then.is_empty() {
                    return Err(Error::invalid_scenario(
                        &name,
                        "'expect' and 'then' apply to HTTP scenarios only; use wait_for steps",
                    ));
                }
                if ui.steps.is_empty() {
                    return Err(Error::invalid_scenario(&name, "ui scenario has no steps"));
                }
                let steps = build_steps(&name, ui.steps, &vars)?;
                ScenarioBody::Ui(UiScenario { steps })
            }
        };

        Ok(Self {
            name,
            description: spec.description,
            tags: spec.tags,
            source: None,
            body,
        })
    }

    /// Parse every YAML document in `yaml` into a scenario
    pub fn from_yaml(yaml: &str, overrides: &BTreeMap<String, String>) -> Result<Vec<Self>> {
        let mut scenarios = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml) {
            let spec = ScenarioSpec::deserialize(document)?;
            scenarios.push(Self::from_spec(spec, overrides)?);
        }
        Ok(scenarios)
    }

    /// Attachments whose extension the upload policy does not list
    pub fn policy_warnings(&self, policy: &UploadPolicy) -> Vec<String> {
        let ScenarioBody::Http(http) = &self.body else {
            return Vec::new();
        };
        std::iter::once(&http.request)
            .chain(http.then.iter().map(|f| &f.request))
            .flat_map(|r| r.attachments.iter())
            .filter(|file| policy.allows_filename(&file.filename) == Some(false))
            .map(|file| {
                format!(
                    "attachment '{}' has an extension outside upload.allowed_extensions",
                    file.filename
                )
            })
            .collect()
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// Render a YAML/JSON scalar the way it should appear inside a path
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `{var}` placeholders, failing on any that are not defined
fn substitute(scenario: &str, text: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let re = placeholder_re();
    if let Some(missing) = re
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .find(|name| !vars.contains_key(name))
    {
        return Err(Error::invalid_scenario(
            scenario,
            format!(
                "placeholder '{{{}}}' in '{}' has no value; define it under 'vars' or pass --var {}=...",
                missing, text, missing
            ),
        ));
    }
    Ok(re
        .replace_all(text, |c: &regex::Captures<'_>| vars[&c[1]].clone())
        .into_owned())
}

fn substitute_value(scenario: &str, value: Value, vars: &BTreeMap<String, String>) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(substitute(scenario, &s, vars)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute_value(scenario, v, vars))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, substitute_value(scenario, v, vars)?)))
                .collect::<Result<_>>()?,
        ),
        other => other,
    })
}

fn build_request(
    scenario: &str,
    mut request: RequestDescriptor,
    vars: &BTreeMap<String, String>,
) -> Result<RequestDescriptor> {
    request.path = substitute(scenario, &request.path, vars)?;
    if !request.path.starts_with('/') {
        return Err(Error::invalid_scenario(
            scenario,
            format!("path '{}' must start with '/'", request.path),
        ));
    }
    if let Some(role) = &request.acting_as {
        if role.trim().is_empty() {
            return Err(Error::invalid_scenario(scenario, "'as' is empty"));
        }
    }
    if let Some(body) = request.json_body.take() {
        let body = body
            .into_iter()
            .map(|(k, v)| Ok((k, substitute_value(scenario, v, vars)?)))
            .collect::<Result<serde_json::Map<String, Value>>>()?;
        request.json_body = Some(body);
    }
    if !request.attachments.is_empty() && request.method == Method::Get {
        return Err(Error::invalid_scenario(
            scenario,
            "GET requests cannot carry attachments",
        ));
    }
    for file in &request.attachments {
        file.validate(scenario)?;
    }
    Ok(request)
}

fn build_steps(
    scenario: &str,
    steps: Vec<UiStepSpec>,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<UiStep>> {
    steps
        .into_iter()
        .map(|step| {
            Ok(match step {
                UiStepSpec::Navigate { url } => UiStep::Navigate {
                    url: substitute(scenario, &url, vars)?,
                },
                UiStepSpec::Fill { selector, value } => UiStep::Fill {
                    selector,
                    value: substitute(scenario, &value, vars)?,
                },
                UiStepSpec::Press { selector, key } => UiStep::Press { selector, key },
                UiStepSpec::WaitFor { any_of, timeout_ms } => {
                    if any_of.is_empty() {
                        return Err(Error::invalid_scenario(
                            scenario,
                            "wait_for needs at least one condition in 'any_of'",
                        ));
                    }
                    UiStep::WaitFor {
                        any_of: any_of
                            .into_iter()
                            .map(|c| build_condition(scenario, c))
                            .collect::<Result<_>>()?,
                        timeout_ms,
                    }
                }
                UiStepSpec::IfVisible { selector, steps } => UiStep::IfVisible {
                    selector,
                    steps: build_steps(scenario, steps, vars)?,
                },
            })
        })
        .collect()
}

fn build_condition(scenario: &str, spec: UiConditionSpec) -> Result<UiCondition> {
    match (spec.title_matches, spec.visible, spec.count_at_least) {
        (Some(pattern), None, None) => Regex::new(&pattern)
            .map(UiCondition::TitleMatches)
            .map_err(|e| {
                Error::invalid_scenario(scenario, format!("bad title regex '{}': {}", pattern, e))
            }),
        (None, Some(selector), None) => Ok(UiCondition::Visible(selector)),
        (None, None, Some(count)) => Ok(UiCondition::CountAtLeast {
            selector: count.selector,
            min: count.min,
        }),
        _ => Err(Error::invalid_scenario(
            scenario,
            "each condition needs exactly one of title_matches, visible, count_at_least",
        )),
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Loads scenarios from files and directories
#[derive(Debug, Default)]
pub struct ScenarioLoader {
    overrides: BTreeMap<String, String>,
}

impl ScenarioLoader {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }

    /// Load a YAML file (possibly multi-document) or every `.yaml`/`.yml`
    /// file under a directory, in path order.
    pub fn load_path(&self, path: &Path) -> Result<Vec<Scenario>> {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| {
                    p.extension()
                        .map(|ext| ext == "yaml" || ext == "yml")
                        .unwrap_or(false)
                })
                .collect();
            files.sort();

            let mut scenarios = Vec::new();
            for file in files {
                scenarios.extend(self.load_file(&file)?);
            }
            Ok(scenarios)
        } else {
            self.load_file(path)
        }
    }

    /// Load several paths, rejecting duplicate scenario names
    pub fn load_all(&self, paths: &[PathBuf]) -> Result<Vec<Scenario>> {
        let mut scenarios = Vec::new();
        let mut seen = BTreeSet::new();
        for path in paths {
            for scenario in self.load_path(path)? {
                if !seen.insert(scenario.name.clone()) {
                    return Err(Error::invalid_scenario(
                        &scenario.name,
                        "name is used by more than one scenario",
                    ));
                }
                scenarios.push(scenario);
            }
        }
        Ok(scenarios)
    }

    fn load_file(&self, path: &Path) -> Result<Vec<Scenario>> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let scenarios = Scenario::from_yaml(&content, &self.overrides).map_err(|e| match e {
            Error::Yaml(err) => Error::Config(format!(
                "Failed to parse scenario file '{}': {}",
                path.display(),
                err
            )),
            other => other,
        })?;
        Ok(scenarios
            .into_iter()
            .map(|mut s| {
                s.source = Some(path.to_path_buf());
                s
            })
            .collect())
    }
}
