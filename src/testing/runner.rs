//! Scenario runner
//!
//! Drives every scenario through `Defined -> Executing -> Executed ->
//! Verified -> Recorded` (or `Cancelled`). Scenarios run as tasks bounded by
//! a semaphore; the report aggregator is the only state they share.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::config::Config;
use crate::common::{Error, Result};

use super::config::{HttpScenario, RequestDescriptor, Scenario, ScenarioBody, UiScenario};
use super::executor::{ExecutionResult, RequestExecutor};
use super::identity::IdentityProvider;
use super::report::{ReportAggregator, RunSummary};
use super::ui::{run_steps, BrowserLauncher, PlaywrightLauncher, UiRunContext};
use super::verifier::{verify_into, VerificationOutcome};

/// Runs scenarios against one target
#[derive(Clone)]
pub struct Runner {
    executor: RequestExecutor,
    identities: Arc<IdentityProvider>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    report: ReportAggregator,
    cancel: CancellationToken,
    concurrency: usize,
    ui_base_url: String,
    ui_wait: Duration,
    poll_interval: Duration,
}

impl Runner {
    pub fn new(executor: RequestExecutor, identities: IdentityProvider) -> Self {
        Self {
            executor,
            identities: Arc::new(identities),
            launcher: None,
            report: ReportAggregator::new(),
            cancel: CancellationToken::new(),
            concurrency: 4,
            ui_base_url: "http://localhost:4200".to_string(),
            ui_wait: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Build a runner from configuration, with a Playwright launcher for
    /// UI scenarios
    pub fn from_config(config: &Config) -> Result<Self> {
        let executor = RequestExecutor::new(
            &config.target.base_url,
            Duration::from_secs(config.timeouts.request_secs),
        )?;
        let identities = IdentityProvider::from_config(&config.roles)?;

        Ok(Self::new(executor, identities)
            .with_concurrency(config.run.concurrency)
            .with_launcher(Arc::new(PlaywrightLauncher::new(config.browser.clone())))
            .with_ui(
                &config.target.ui_base_url,
                Duration::from_millis(config.timeouts.ui_wait_ms),
                Duration::from_millis(config.timeouts.poll_interval_ms),
            ))
    }

    /// Maximum number of scenarios in flight (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// UI base URL, default wait budget and poll interval
    pub fn with_ui(mut self, base_url: &str, wait: Duration, poll_interval: Duration) -> Self {
        self.ui_base_url = base_url.to_string();
        self.ui_wait = wait;
        self.poll_interval = poll_interval;
        self
    }

    /// Token that cancels the whole run when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Roles referenced by `scenario` that are not registered
    fn missing_roles(&self, scenario: &Scenario) -> Vec<String> {
        scenario
            .roles()
            .into_iter()
            .filter(|role| !self.identities.contains(role))
            .map(String::from)
            .collect()
    }

    /// Run every scenario and return the summary.
    ///
    /// Scenarios acting as unknown roles are recorded as failed before any
    /// request is sent. The run always completes, even when cancelled.
    pub async fn run_all(&self, scenarios: Vec<Scenario>) -> RunSummary {
        let mut runnable = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let missing = self.missing_roles(&scenario);
            if missing.is_empty() {
                runnable.push(scenario);
                continue;
            }
            let mut outcome = VerificationOutcome::new(scenario.name());
            for role in &missing {
                let err = Error::unknown_role(role, &self.identities.role_names());
                outcome.fail_with("pre-flight", &err);
            }
            self.report.record(outcome);
        }

        info!(
            scenarios = runnable.len(),
            concurrency = self.concurrency,
            "starting run"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for scenario in runnable {
            let runner = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let outcome = AssertUnwindSafe(runner.run_one(&scenario))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        let mut outcome = VerificationOutcome::new(scenario.name());
                        outcome.fail("runner", "scenario task panicked");
                        outcome
                    });
                runner.report.record(outcome);
                debug!(scenario = scenario.name(), state = "recorded");
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scenario task did not finish");
            }
        }

        self.report.summary()
    }

    /// Run one scenario to a verification outcome
    pub async fn run_one(&self, scenario: &Scenario) -> VerificationOutcome {
        let name = scenario.name();
        let start = Instant::now();
        debug!(scenario = name, state = "defined");

        let mut outcome = if self.cancel.is_cancelled() {
            VerificationOutcome::from_error(name, "start", &Error::Cancelled)
        } else {
            match scenario.body() {
                ScenarioBody::Http(http) => self.run_http(name, http).await,
                ScenarioBody::Ui(ui) => self.run_ui(name, ui).await,
            }
        };

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        if outcome.cancelled {
            debug!(scenario = name, state = "cancelled");
        } else {
            debug!(scenario = name, state = "verified", passed = outcome.passed);
        }
        outcome
    }

    async fn send(&self, request: &RequestDescriptor) -> Result<ExecutionResult> {
        let credentials = request
            .acting_as
            .as_deref()
            .map(|role| self.identities.resolve(role))
            .transpose()?;
        self.executor
            .execute(request, credentials.as_ref(), &self.cancel)
            .await
    }

    async fn run_http(&self, name: &str, http: &HttpScenario) -> VerificationOutcome {
        let mut outcome = VerificationOutcome::new(name);

        debug!(scenario = name, state = "executing");
        let result = match self.send(&http.request).await {
            Ok(result) => result,
            Err(e) => {
                debug!(scenario = name, kind = e.kind(), error = %e, "request failed");
                outcome.fail_with("request", &e);
                return outcome;
            }
        };
        debug!(scenario = name, state = "executed", status = result.status);

        verify_into(&mut outcome, None, &result, &http.expect);

        for (i, follow_up) in http.then.iter().enumerate() {
            let label = format!(
                "then[{}] {} {}",
                i + 1,
                follow_up.request.method,
                follow_up.request.path
            );
            match self.send(&follow_up.request).await {
                Ok(result) => {
                    verify_into(&mut outcome, Some(label.as_str()), &result, &follow_up.expect)
                }
                Err(e) => {
                    outcome.fail_with(&label, &e);
                    if outcome.cancelled {
                        break;
                    }
                }
            }
        }

        outcome
    }

    async fn run_ui(&self, name: &str, ui: &UiScenario) -> VerificationOutcome {
        let mut outcome = VerificationOutcome::new(name);

        let Some(launcher) = &self.launcher else {
            outcome.fail_with(
                "browser",
                &Error::Driver("no browser launcher configured for UI scenarios".to_string()),
            );
            return outcome;
        };

        debug!(scenario = name, state = "executing");
        let launched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            driver = launcher.launch() => driver,
        };
        let driver = match launched {
            Ok(driver) => driver,
            Err(e) => {
                outcome.fail_with("browser", &e);
                return outcome;
            }
        };

        let ctx = UiRunContext {
            base_url: self.ui_base_url.clone(),
            default_timeout: self.ui_wait,
            poll_interval: self.poll_interval,
            cancel: self.cancel.clone(),
        };
        let steps = run_steps(driver.as_ref(), &ui.steps, &ctx).await;
        debug!(scenario = name, state = "executed");

        match tokio::time::timeout(self.ui_wait, driver.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(scenario = name, error = %e, "closing page failed"),
            Err(_) => debug!(scenario = name, "closing page timed out, dropping it"),
        }

        if let Err(failure) = steps {
            debug!(
                scenario = name,
                step = %failure.step,
                kind = failure.error.kind(),
                "ui step failed"
            );
            outcome.fail_with(&failure.step, &failure.error);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::testing::ui::PageDriver;

    fn scenarios(yaml: &str) -> Vec<Scenario> {
        Scenario::from_yaml(yaml, &BTreeMap::new()).unwrap()
    }

    /// Executor pointing at a port nothing listens on
    fn offline_runner() -> Runner {
        let executor =
            RequestExecutor::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let identities = IdentityProvider::default().with_bearer("customer", "c-token", ["browse"]);
        Runner::new(executor, identities)
    }

    struct StaticPage;

    #[async_trait]
    impl PageDriver for StaticPage {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn title(&self) -> Result<String> {
            Ok("Toolshop".to_string())
        }
        async fn is_visible(&self, _selector: &str) -> Result<bool> {
            Ok(true)
        }
        async fn count(&self, _selector: &str) -> Result<usize> {
            Ok(0)
        }
        async fn fill(&self, _selector: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn press(&self, _selector: &str, _key: &str) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingLauncher {
        launches: AtomicUsize,
    }

    #[async_trait]
    impl BrowserLauncher for CountingLauncher {
        async fn launch(&self) -> Result<Box<dyn PageDriver>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StaticPage))
        }
    }

    #[tokio::test]
    async fn test_unknown_role_rejected_in_preflight() {
        let runner = offline_runner();
        let summary = runner
            .run_all(scenarios(
                r#"
name: ghost-deletes-brand
request:
  method: DELETE
  path: /brands/1
  as: ghost
expect:
  status: 403
"#,
            ))
            .await;

        assert_eq!(summary.total, 1);
        assert_eq!(summary.failed, 1);
        let failure = &summary.failures[0].failures[0];
        assert_eq!(failure.predicate, "pre-flight");
        assert!(failure.explanation.contains("Unknown role 'ghost'"));
        assert!(failure.explanation.contains("customer"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_recorded() {
        let runner = offline_runner();
        let summary = runner
            .run_all(scenarios(
                r#"
name: status-offline
request:
  method: GET
  path: /status
expect:
  status: 200
"#,
            ))
            .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].failures[0].predicate, "request");
        assert!(summary.failures[0].failures[0]
            .explanation
            .contains("Transport error"));
    }

    #[tokio::test]
    async fn test_cancelled_run_still_completes() {
        let runner = offline_runner();
        runner.cancel_token().cancel();
        let summary = runner
            .run_all(scenarios(
                r#"
name: one
request: { method: GET, path: /status }
expect: { status: 200 }
---
name: two
request: { method: GET, path: /brands }
expect: { status: 200 }
"#,
            ))
            .await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.cancelled, 2);
        assert!(!summary.success());
    }

    #[tokio::test]
    async fn test_ui_scenario_without_launcher_fails() {
        let runner = offline_runner();
        let summary = runner
            .run_all(scenarios(
                r#"
name: homepage-title
ui:
  steps:
    - action: navigate
      url: /
"#,
            ))
            .await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].failures[0].predicate, "browser");
    }

    #[tokio::test]
    async fn test_ui_scenario_with_fake_launcher() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = offline_runner()
            .with_launcher(launcher.clone())
            .with_ui("http://shop.test", Duration::from_millis(50), Duration::from_millis(5));

        let summary = runner
            .run_all(scenarios(
                r#"
name: homepage-title
ui:
  steps:
    - action: navigate
      url: /
    - action: wait_for
      any_of:
        - title_matches: "Toolshop"
---
name: products-load
ui:
  steps:
    - action: navigate
      url: /
    - action: wait_for
      timeout_ms: 20
      any_of:
        - count_at_least: { selector: ".card" }
"#,
            ))
            .await;

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].scenario, "products-load");
        assert!(summary.failures[0].failures[0]
            .explanation
            .contains("Timed out after 20 ms"));
    }
}
