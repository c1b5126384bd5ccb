//! Request executor
//!
//! Issues exactly one HTTP exchange per call. There is no retry loop here
//! and the client is built without any retry middleware: a transport
//! failure is returned to the caller as-is.

use std::time::{Duration, Instant};

use reqwest::header::ACCEPT;
use futures_util::stream;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::common::{Error, Result};

use super::config::{Method, RequestDescriptor};
use super::identity::Credentials;

/// Raw response captured from one exchange
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: u16,
    pub raw_body: String,
    /// Parsed body, when it is JSON
    pub json: Option<Value>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn new(status: u16, raw_body: impl Into<String>) -> Self {
        let raw_body = raw_body.into();
        let json = serde_json::from_str(&raw_body).ok();
        Self {
            status,
            raw_body,
            json,
            elapsed: Duration::ZERO,
        }
    }
}

/// HTTP client bound to the system under test
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl RequestExecutor {
    /// Create an executor for `base_url` with a whole-exchange timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scenario-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for a scenario path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue the request described by `descriptor`
    ///
    /// Credentials are attached when given; otherwise the request goes out
    /// unauthenticated. Cancelling `cancel` aborts the in-flight exchange.
    pub async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let url = self.url_for(&descriptor.path);
        let method = descriptor.method.as_str();

        let mut builder = self
            .client
            .request(to_reqwest_method(descriptor.method), &url)
            .header(ACCEPT, "application/json");

        if let Some(credentials) = credentials {
            builder = credentials.apply(builder);
        }

        if !descriptor.attachments.is_empty() {
            builder = builder.multipart(build_form(descriptor)?);
        } else if let Some(body) = &descriptor.json_body {
            builder = builder.json(body);
        }

        debug!(
            method,
            url = %url,
            role = credentials.map(|c| c.role.as_str()).unwrap_or("anonymous"),
            "sending request"
        );

        let start = Instant::now();
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, raw_body) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(method, url = %url, "request cancelled");
                return Err(Error::Cancelled);
            }
            outcome = exchange => outcome.map_err(|e| Error::transport(method, &url, &e))?,
        };

        let mut result = ExecutionResult::new(status, raw_body);
        result.elapsed = start.elapsed();

        debug!(
            method,
            url = %url,
            status,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "response received"
        );

        Ok(result)
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Render a JSON value as a multipart text field
fn form_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

/// Build the multipart body: JSON fields as text parts, then each
/// attachment with its exact configured byte count.
fn build_form(descriptor: &RequestDescriptor) -> Result<Form> {
    let mut form = Form::new();

    if let Some(body) = &descriptor.json_body {
        for (key, value) in body {
            form = form.text(key.clone(), form_text(value));
        }
    }

    for file in &descriptor.attachments {
        let mime = file.mime();
        let chunks = stream::iter(file.chunks().map(Ok::<_, std::io::Error>));
        let part = Part::stream_with_length(Body::wrap_stream(chunks), file.len())
            .file_name(file.filename.clone())
            .mime_str(&mime)
            .map_err(|e| {
                Error::Config(format!(
                    "attachment '{}' has an invalid content type '{}': {}",
                    file.filename, mime, e
                ))
            })?;
        form = form.part(file.field.clone(), part);
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let exec = RequestExecutor::new("http://localhost:8091/", Duration::from_secs(1)).unwrap();
        assert_eq!(exec.url_for("/brands/1"), "http://localhost:8091/brands/1");
    }

    #[test]
    fn test_form_text_rendering() {
        assert_eq!(form_text(&json!("John")), "John");
        assert_eq!(form_text(&json!(42)), "42");
        assert_eq!(form_text(&json!(true)), "1");
        assert_eq!(form_text(&json!(null)), "");
        assert_eq!(form_text(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_execution_result_parses_json() {
        let result = ExecutionResult::new(200, r#"{"data": []}"#);
        assert_eq!(result.json, Some(json!({"data": []})));

        let result = ExecutionResult::new(500, "<html>oops</html>");
        assert!(result.json.is_none());
        assert_eq!(result.raw_body, "<html>oops</html>");
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let exec = RequestExecutor::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let descriptor: RequestDescriptor =
            serde_json::from_value(json!({"method": "GET", "path": "/status"})).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exec.execute(&descriptor, None, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
