//! Report aggregation and rendering

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use crate::common::Result;

use super::verifier::{PredicateFailure, VerificationOutcome};

/// Failures of one scenario
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureDetail {
    pub scenario: String,
    pub cancelled: bool,
    pub failures: Vec<PredicateFailure>,
}

/// Snapshot of a run
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failures: Vec<FailureDetail>,
}

/// Collects verification outcomes for the duration of a run.
///
/// Cloning shares the underlying record list; each `record` call is
/// atomic with respect to the others.
#[derive(Debug, Clone, Default)]
pub struct ReportAggregator {
    records: Arc<Mutex<Vec<VerificationOutcome>>>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome
    pub fn record(&self, outcome: VerificationOutcome) {
        if outcome.cancelled {
            warn!(scenario = %outcome.scenario, "cancelled");
        } else if outcome.passed {
            info!(scenario = %outcome.scenario, duration_ms = outcome.duration_ms, "passed");
        } else {
            warn!(
                scenario = %outcome.scenario,
                failures = outcome.failures.len(),
                "failed"
            );
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }

    /// Consistent snapshot of everything recorded so far
    pub fn summary(&self) -> RunSummary {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut summary = RunSummary {
            total: records.len(),
            ..Default::default()
        };
        for outcome in records.iter() {
            if outcome.cancelled {
                summary.cancelled += 1;
            } else if outcome.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            if !outcome.passed {
                summary.failures.push(FailureDetail {
                    scenario: outcome.scenario.clone(),
                    cancelled: outcome.cancelled,
                    failures: outcome.failures.clone(),
                });
            }
        }
        summary
    }
}

impl RunSummary {
    /// True when nothing failed or was cancelled
    pub fn success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Human-readable report
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        for detail in &self.failures {
            let marker = if detail.cancelled {
                "⊘".yellow()
            } else {
                "✗".red()
            };
            out.push_str(&format!("{} {}\n", marker, detail.scenario.white().bold()));
            for failure in &detail.failures {
                out.push_str(&format!(
                    "    {} {}\n",
                    failure.predicate.cyan(),
                    failure.explanation.dimmed()
                ));
            }
        }

        let counts = format!(
            "{} total, {} passed, {} failed, {} cancelled",
            self.total, self.passed, self.failed, self.cancelled
        );
        let line = if self.success() {
            format!("{} {}", "✓".green().bold(), counts.green())
        } else {
            format!("{} {}", "✗".red().bold(), counts.red())
        };
        out.push_str(&line);
        out.push('\n');
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report, creating parent directories
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        info!("Report written to: {}", path.display());
        Ok(())
    }
}
