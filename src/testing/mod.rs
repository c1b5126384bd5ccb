//! Scenario engine
//!
//! YAML scenarios are loaded and validated by [`config`], executed by
//! [`runner`] through the [`executor`] (HTTP) or [`ui`] (browser) boundary,
//! checked by [`verifier`] and collected by [`report`].

pub mod config;
pub mod executor;
pub mod identity;
pub mod report;
pub mod runner;
pub mod ui;
pub mod verifier;

pub use config::{
    ExpectedOutcome, FileDescriptor, Method, RequestDescriptor, Scenario, ScenarioBody,
    ScenarioLoader,
};
pub use executor::{ExecutionResult, RequestExecutor};
pub use identity::{AuthScheme, Credentials, IdentityProvider};
pub use report::{ReportAggregator, RunSummary};
pub use runner::Runner;
pub use ui::{poll_until, BrowserLauncher, PageDriver};
pub use verifier::{verify, VerificationOutcome};
