//! UI boundary
//!
//! Browser automation is an external capability: scenarios talk to a
//! [`PageDriver`], and the only concrete driver here forwards each call to
//! a Playwright process over line-delimited JSON. Waits poll a condition
//! until it holds or the budget runs out; there is no fixed-sleep step.

use std::future::Future;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::common::config::BrowserConfig;
use crate::common::{Error, Result};

use super::config::{UiCondition, UiStep};

/// One browser page
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn title(&self) -> Result<String>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    async fn count(&self, selector: &str) -> Result<usize>;
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    async fn press(&self, selector: &str, key: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Opens a fresh page for each UI scenario
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>>;
}

// ============================================================================
// Polling
// ============================================================================

/// Poll `probe` every `interval` until it returns true or `timeout` elapses.
///
/// The probe always runs at least once, and each probe only gets whatever
/// is left of the budget: a probe still pending at the deadline counts as
/// not met. Returns `Ok(false)` when the budget is spent, `Err(Cancelled)`
/// when `cancel` fires, and any probe error as-is.
pub async fn poll_until<F, Fut>(
    mut probe: F,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        let probed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            probed = tokio::time::timeout(remaining, probe()) => probed,
        };
        match probed {
            Ok(Ok(true)) => return Ok(true),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "probe still pending at deadline");
                return Ok(false);
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        let pause = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

async fn condition_holds(driver: &dyn PageDriver, condition: &UiCondition) -> Result<bool> {
    match condition {
        UiCondition::TitleMatches(re) => Ok(re.is_match(&driver.title().await?)),
        UiCondition::Visible(selector) => driver.is_visible(selector).await,
        UiCondition::CountAtLeast { selector, min } => Ok(driver.count(selector).await? >= *min),
    }
}

// ============================================================================
// Step execution
// ============================================================================

/// Settings for running UI steps
#[derive(Debug, Clone)]
pub struct UiRunContext {
    pub base_url: String,
    pub default_timeout: Duration,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

impl UiRunContext {
    /// Absolute URL for a navigation target
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), url)
        }
    }
}

/// Run a driver call, giving up as soon as `cancel` fires
async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = call => result,
    }
}

/// A step that did not complete
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: Error,
}

fn step_label(index: usize, step: &UiStep) -> String {
    let what = match step {
        UiStep::Navigate { url } => format!("navigate {}", url),
        UiStep::Fill { selector, .. } => format!("fill {}", selector),
        UiStep::Press { selector, key } => format!("press {} on {}", key, selector),
        UiStep::WaitFor { any_of, .. } => format!(
            "wait for {}",
            any_of
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" or ")
        ),
        UiStep::IfVisible { selector, .. } => format!("if visible {}", selector),
    };
    format!("step {}: {}", index + 1, what)
}

/// Run `steps` in order, stopping at the first failure
pub fn run_steps<'a>(
    driver: &'a dyn PageDriver,
    steps: &'a [UiStep],
    ctx: &'a UiRunContext,
) -> BoxFuture<'a, std::result::Result<(), StepFailure>> {
    async move {
        for (i, step) in steps.iter().enumerate() {
            let label = step_label(i, step);
            debug!(step = %label, "ui step");
            let fail = |error: Error| StepFailure {
                step: label.clone(),
                error,
            };

            match step {
                UiStep::Navigate { url } => {
                    let url = ctx.resolve_url(url);
                    cancellable(&ctx.cancel, driver.goto(&url))
                        .await
                        .map_err(fail)?;
                }
                UiStep::Fill { selector, value } => {
                    cancellable(&ctx.cancel, driver.fill(selector, value))
                        .await
                        .map_err(fail)?;
                }
                UiStep::Press { selector, key } => {
                    cancellable(&ctx.cancel, driver.press(selector, key))
                        .await
                        .map_err(fail)?;
                }
                UiStep::WaitFor { any_of, timeout_ms } => {
                    let timeout = timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(ctx.default_timeout);
                    let conditions: &[UiCondition] = any_of;
                    let met = poll_until(
                        move || async move {
                            for condition in conditions {
                                if condition_holds(driver, condition).await? {
                                    return Ok(true);
                                }
                            }
                            Ok::<_, Error>(false)
                        },
                        timeout,
                        ctx.poll_interval,
                        &ctx.cancel,
                    )
                    .await
                    .map_err(fail)?;

                    if !met {
                        return Err(fail(Error::Timeout {
                            condition: conditions
                                .iter()
                                .map(|c| c.to_string())
                                .collect::<Vec<_>>()
                                .join(" or "),
                            timeout_ms: timeout.as_millis() as u64,
                        }));
                    }
                }
                UiStep::IfVisible { selector, steps } => {
                    // A look still pending after the default wait counts as hidden.
                    let look = cancellable(&ctx.cancel, driver.is_visible(selector));
                    let visible = match tokio::time::timeout(ctx.default_timeout, look).await {
                        Ok(visible) => visible.map_err(fail)?,
                        Err(_) => false,
                    };
                    if visible {
                        run_steps(driver, steps, ctx).await?;
                    } else {
                        debug!(selector = %selector, "not visible, skipping nested steps");
                    }
                }
            }
        }
        Ok(())
    }
    .boxed()
}

// ============================================================================
// Playwright bridge
// ============================================================================

/// Node program that owns the browser and answers one JSON request per line
const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const engines = require('playwright');

(async () => {
  const engine = engines[process.env.SCENARIO_BROWSER || 'chromium'];
  const browser = await engine.launch({ headless: process.env.SCENARIO_HEADLESS !== '0' });
  const page = await browser.newPage();
  const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
  reply({ id: 0, ok: true, value: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    let req;
    try { req = JSON.parse(line); } catch (e) { continue; }
    try {
      let value = null;
      switch (req.op) {
        case 'goto': await page.goto(req.url); break;
        case 'title': value = await page.title(); break;
        case 'visible': value = await page.locator(req.selector).first().isVisible(); break;
        case 'count': value = await page.locator(req.selector).count(); break;
        case 'fill': await page.locator(req.selector).first().fill(req.value); break;
        case 'press': await page.locator(req.selector).first().press(req.key); break;
        case 'close':
          await browser.close();
          reply({ id: req.id, ok: true, value: null });
          process.exit(0);
        default: throw new Error('unknown op ' + req.op);
      }
      reply({ id: req.id, ok: true, value });
    } catch (e) {
      reply({ id: req.id, ok: false, error: e.message });
    }
  }
  await browser.close();
})().catch((e) => {
  process.stderr.write(String((e && e.stack) || e) + '\n');
  process.exit(1);
});
"#;

/// Launches Playwright pages through a node bridge process
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    config: BrowserConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        let driver = PlaywrightDriver::spawn(&self.config).await?;
        Ok(Box::new(driver))
    }
}

struct BridgeIo {
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

/// A page living in a Playwright bridge process
pub struct PlaywrightDriver {
    io: Mutex<BridgeIo>,
    seq: AtomicU64,
}

impl PlaywrightDriver {
    /// Start the bridge and wait for its ready line
    pub async fn spawn(config: &BrowserConfig) -> Result<Self> {
        let mut child = Command::new(&config.node)
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .env("SCENARIO_BROWSER", config.engine.as_str())
            .env("SCENARIO_HEADLESS", if config.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Driver(format!(
                    "Failed to start {}: {}. Install Node.js and run 'npm install playwright'",
                    config.node.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Driver("Failed to get bridge stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Driver("Failed to get bridge stdout".to_string()))?;

        let driver = Self {
            io: Mutex::new(BridgeIo {
                _child: child,
                stdin,
                lines: BufReader::new(stdout).lines(),
            }),
            seq: AtomicU64::new(1),
        };

        let launch_timeout = Duration::from_secs(config.launch_secs);
        tokio::time::timeout(launch_timeout, driver.read_reply(0))
            .await
            .map_err(|_| Error::Timeout {
                condition: format!("{} to launch", config.engine.as_str()),
                timeout_ms: launch_timeout.as_millis() as u64,
            })??;

        info!(browser = config.engine.as_str(), "browser ready");
        Ok(driver)
    }

    async fn read_reply(&self, id: u64) -> Result<Value> {
        let mut io = self.io.lock().await;
        Self::read_reply_locked(&mut io, id).await
    }

    async fn read_reply_locked(io: &mut BridgeIo, id: u64) -> Result<Value> {
        loop {
            let line = io
                .lines
                .next_line()
                .await?
                .ok_or_else(|| Error::Driver("browser bridge exited".to_string()))?;
            let reply: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_) => {
                    debug!(line = %line, "ignoring non-JSON bridge output");
                    continue;
                }
            };
            if reply["id"].as_u64() != Some(id) {
                continue;
            }
            if reply["ok"].as_bool() == Some(true) {
                return Ok(reply["value"].clone());
            }
            return Err(Error::Driver(
                reply["error"]
                    .as_str()
                    .unwrap_or("unknown bridge error")
                    .to_string(),
            ));
        }
    }

    async fn request(&self, mut message: Value) -> Result<Value> {
        let id = self.seq.fetch_add(1, Ordering::SeqCst);
        message["id"] = json!(id);
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;
        Self::read_reply_locked(&mut io, id).await
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.request(json!({"op": "goto", "url": url})).await.map(|_| ())
    }

    async fn title(&self) -> Result<String> {
        let value = self.request(json!({"op": "title"})).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let value = self
            .request(json!({"op": "visible", "selector": selector}))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let value = self
            .request(json!({"op": "count", "selector": selector}))
            .await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.request(json!({"op": "fill", "selector": selector, "value": value}))
            .await
            .map(|_| ())
    }

    async fn press(&self, selector: &str, key: &str) -> Result<()> {
        self.request(json!({"op": "press", "selector": selector, "key": key}))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        self.request(json!({"op": "close"})).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use regex::Regex;

    /// Page whose product count grows by one on every poll
    #[derive(Default)]
    struct SlowPage {
        polls: AtomicUsize,
        log: std::sync::Mutex<Vec<String>>,
        search_visible: bool,
    }

    #[async_trait]
    impl PageDriver for SlowPage {
        async fn goto(&self, url: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("goto {}", url));
            Ok(())
        }
        async fn title(&self) -> Result<String> {
            Ok("Practice Software Testing - Toolshop".to_string())
        }
        async fn is_visible(&self, selector: &str) -> Result<bool> {
            Ok(selector == "input[type=search]" && self.search_visible)
        }
        async fn count(&self, _selector: &str) -> Result<usize> {
            Ok(self.polls.fetch_add(1, Ordering::SeqCst))
        }
        async fn fill(&self, selector: &str, value: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("fill {} {}", selector, value));
            Ok(())
        }
        async fn press(&self, _selector: &str, key: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("press {}", key));
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Page whose every call hangs
    struct HungPage;

    #[async_trait]
    impl PageDriver for HungPage {
        async fn goto(&self, _url: &str) -> Result<()> {
            std::future::pending().await
        }
        async fn title(&self) -> Result<String> {
            std::future::pending().await
        }
        async fn is_visible(&self, _selector: &str) -> Result<bool> {
            std::future::pending().await
        }
        async fn count(&self, _selector: &str) -> Result<usize> {
            std::future::pending().await
        }
        async fn fill(&self, _selector: &str, _value: &str) -> Result<()> {
            std::future::pending().await
        }
        async fn press(&self, _selector: &str, _key: &str) -> Result<()> {
            std::future::pending().await
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn ctx() -> UiRunContext {
        UiRunContext {
            base_url: "http://shop.test/".to_string(),
            default_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(5),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_poll_until_met() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let met = poll_until(
            move || {
                let counter = counter.clone();
                async move { Ok::<_, Error>(counter.fetch_add(1, Ordering::SeqCst) >= 3) }
            },
            Duration::from_secs(1),
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(met);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let start = Instant::now();
        let met = poll_until(
            || async { Ok::<_, Error>(false) },
            Duration::from_millis(30),
            Duration::from_millis(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!met);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_poll_until_zero_budget_probes_once() {
        let met = poll_until(
            || async { Ok::<_, Error>(true) },
            Duration::ZERO,
            Duration::from_millis(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(met);
    }

    #[tokio::test]
    async fn test_poll_until_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = poll_until(
            || async { Ok::<_, Error>(false) },
            Duration::from_secs(30),
            Duration::from_millis(5),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_wait_for_polls_until_count() {
        let page = SlowPage::default();
        let steps = vec![
            UiStep::Navigate {
                url: "/".to_string(),
            },
            UiStep::WaitFor {
                any_of: vec![UiCondition::CountAtLeast {
                    selector: ".product-card".to_string(),
                    min: 2,
                }],
                timeout_ms: None,
            },
        ];
        run_steps(&page, &steps, &ctx()).await.unwrap();
        assert!(page.polls.load(Ordering::SeqCst) >= 3);
        assert_eq!(page.log.lock().unwrap()[0], "goto http://shop.test/");
    }

    #[tokio::test]
    async fn test_wait_for_timeout_names_conditions() {
        let page = SlowPage::default();
        let steps = vec![UiStep::WaitFor {
            any_of: vec![
                UiCondition::Visible("text=/no.*found/i".to_string()),
                UiCondition::TitleMatches(Regex::new("(?i)checkout").unwrap()),
            ],
            timeout_ms: Some(20),
        }];
        let failure = run_steps(&page, &steps, &ctx()).await.unwrap_err();
        assert!(failure.step.starts_with("step 1: wait for"));
        match failure.error {
            Error::Timeout {
                condition,
                timeout_ms,
            } => {
                assert_eq!(timeout_ms, 20);
                assert!(condition.contains(" or "));
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_for_hung_driver_times_out() {
        let steps = vec![UiStep::WaitFor {
            any_of: vec![UiCondition::Visible("nav".to_string())],
            timeout_ms: Some(100),
        }];
        let start = Instant::now();
        let failure = tokio::time::timeout(
            Duration::from_secs(3),
            run_steps(&HungPage, &steps, &ctx()),
        )
        .await
        .expect("wait_for must end within its budget")
        .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(matches!(failure.error, Error::Timeout { timeout_ms: 100, .. }));
    }

    #[tokio::test]
    async fn test_hung_navigation_is_cancellable() {
        let ctx = ctx();
        let trigger = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let steps = vec![UiStep::Navigate {
            url: "/".to_string(),
        }];
        let failure = tokio::time::timeout(
            Duration::from_secs(3),
            run_steps(&HungPage, &steps, &ctx),
        )
        .await
        .expect("navigation must stop on cancel")
        .unwrap_err();
        assert_eq!(failure.step, "step 1: navigate /");
        assert!(matches!(failure.error, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_if_visible_hung_driver_skips_block() {
        let steps = vec![UiStep::IfVisible {
            selector: "input[type=search]".to_string(),
            steps: vec![UiStep::Navigate {
                url: "/never".to_string(),
            }],
        }];
        tokio::time::timeout(Duration::from_secs(3), run_steps(&HungPage, &steps, &ctx()))
            .await
            .expect("if_visible must end within the default wait")
            .unwrap();
    }

    #[tokio::test]
    async fn test_if_visible_skips_hidden_block() {
        let page = SlowPage::default();
        let steps = vec![UiStep::IfVisible {
            selector: "input[type=search]".to_string(),
            steps: vec![UiStep::Fill {
                selector: "input[type=search]".to_string(),
                value: "hammer".to_string(),
            }],
        }];
        run_steps(&page, &steps, &ctx()).await.unwrap();
        assert!(page.log.lock().unwrap().is_empty());

        let page = SlowPage {
            search_visible: true,
            ..Default::default()
        };
        run_steps(&page, &steps, &ctx()).await.unwrap();
        assert_eq!(page.log.lock().unwrap()[0], "fill input[type=search] hammer");
    }

    #[test]
    fn test_resolve_url() {
        let ctx = ctx();
        assert_eq!(ctx.resolve_url("/"), "http://shop.test/");
        assert_eq!(
            ctx.resolve_url("http://localhost:8091/status"),
            "http://localhost:8091/status"
        );
    }
}
