//! CLI command handling
//!
//! Loads configuration and scenarios, runs them and prints the report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use colored::Colorize;
use tracing::{info, warn};

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::testing::{IdentityProvider, RunSummary, Runner, Scenario, ScenarioLoader};

/// How a command finished, mapped to the process exit code by `main`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Everything passed
    Success,
    /// At least one scenario failed or was cancelled
    Failures,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failures => 1,
        }
    }
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<Outcome> {
    match command {
        Commands::Run {
            paths,
            tag,
            name,
            vars,
            json,
            save,
            base_url,
            concurrency,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(base_url) = base_url {
                config.target.base_url = base_url;
            }
            if let Some(concurrency) = concurrency {
                config.run.concurrency = concurrency.max(1);
            }

            let scenarios = load_scenarios(&paths, vars, &config)?;
            let scenarios = select(scenarios, &tag, name.as_deref());
            if scenarios.is_empty() {
                println!("{}", "No scenarios matched".yellow());
                return Ok(Outcome::Success);
            }

            let runner = Runner::from_config(&config)?;
            let cancel = runner.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling in-flight scenarios");
                    cancel.cancel();
                }
            });

            println!(
                "{} {} scenario(s) against {}",
                "Running".blue().bold(),
                scenarios.len(),
                config.target.base_url.white().bold()
            );

            let summary = runner.run_all(scenarios).await;
            if save {
                save_report(&summary)?;
            }
            finish(&summary, json.as_deref())
        }

        Commands::Validate {
            paths,
            vars,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let scenarios = load_scenarios(&paths, vars, &config)?;
            let identities = IdentityProvider::from_config(&config.roles)?;

            let mut unknown = 0;
            for scenario in &scenarios {
                let missing: Vec<&str> = scenario
                    .roles()
                    .into_iter()
                    .filter(|role| !identities.contains(role))
                    .collect();
                let origin = scenario
                    .source()
                    .map(|p| format!(" ({})", p.display()))
                    .unwrap_or_default();
                let tags = if scenario.tags().is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", scenario.tags().join(", "))
                };
                if missing.is_empty() {
                    println!(
                        "  {} {}{}{}",
                        "✓".green(),
                        scenario.name(),
                        tags.cyan(),
                        origin.dimmed()
                    );
                    if let Some(description) = scenario.description() {
                        println!("      {}", description.dimmed());
                    }
                } else {
                    unknown += 1;
                    println!(
                        "  {} {} (unknown role: {})",
                        "✗".red(),
                        scenario.name(),
                        missing.join(", ")
                    );
                }
            }

            println!("{} scenario(s) loaded", scenarios.len());
            Ok(if unknown == 0 {
                Outcome::Success
            } else {
                Outcome::Failures
            })
        }

        Commands::Roles { capability, config } => {
            let config = load_config(config.as_deref())?;
            let identities = IdentityProvider::from_config(&config.roles)?;

            let roles = match &capability {
                Some(capability) => identities.roles_with(capability),
                None => identities.role_names(),
            };
            if roles.is_empty() {
                match capability {
                    Some(capability) => println!("No role grants '{}'", capability),
                    None => println!(
                        "No roles configured. Add [roles.<name>] sections to config.toml"
                    ),
                }
                return Ok(Outcome::Success);
            }
            for role in roles {
                let capabilities = identities.capabilities(role)?;
                let listed = if capabilities.is_empty() {
                    "-".dimmed().to_string()
                } else {
                    capabilities
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                println!("{:<16} {}", role.cyan(), listed);
            }
            Ok(Outcome::Success)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn load_scenarios(
    paths: &[PathBuf],
    vars: Vec<(String, String)>,
    config: &Config,
) -> Result<Vec<Scenario>> {
    let overrides: BTreeMap<String, String> = vars.into_iter().collect();
    let scenarios = ScenarioLoader::new(overrides).load_all(paths)?;
    for scenario in &scenarios {
        for warning in scenario.policy_warnings(&config.upload) {
            warn!(scenario = scenario.name(), "{}", warning);
        }
    }
    info!(count = scenarios.len(), "scenarios loaded");
    Ok(scenarios)
}

/// Keep scenarios carrying any of `tags` and whose name contains `name`
pub fn select(scenarios: Vec<Scenario>, tags: &[String], name: Option<&str>) -> Vec<Scenario> {
    scenarios
        .into_iter()
        .filter(|s| tags.is_empty() || tags.iter().any(|t| s.has_tag(t)))
        .filter(|s| name.map_or(true, |n| s.name().contains(n)))
        .collect()
}

/// Write the JSON report to `<data dir>/reports/run-<unix secs>.json`
fn save_report(summary: &RunSummary) -> Result<()> {
    let dir = paths::report_dir()
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    summary.write_json(&dir.join(format!("run-{}.json", stamp)))
}

fn finish(summary: &RunSummary, json: Option<&Path>) -> Result<Outcome> {
    print!("{}", summary.render_text());
    if let Some(path) = json {
        summary.write_json(path)?;
    }
    Ok(if summary.success() {
        Outcome::Success
    } else {
        Outcome::Failures
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIOS: &str = r#"
name: customer-cannot-delete-brand
tags: [auth]
request: { method: DELETE, path: /brands/1, as: customer }
expect: { status: 403 }
---
name: admin-deletes-brand
tags: [auth, destructive]
request: { method: DELETE, path: /brands/1, as: admin }
expect: { status: 204 }
---
name: status-reachable
request: { method: GET, path: /status }
expect: { status: 200 }
"#;

    fn all() -> Vec<Scenario> {
        Scenario::from_yaml(SCENARIOS, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_select_by_tag_and_name() {
        assert_eq!(select(all(), &[], None).len(), 3);
        assert_eq!(select(all(), &["auth".to_string()], None).len(), 2);
        assert_eq!(select(all(), &["destructive".to_string()], None).len(), 1);

        let picked = select(all(), &["auth".to_string()], Some("customer"));
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "customer-cannot-delete-brand");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::Failures.exit_code(), 1);
    }

    #[test]
    fn test_finish_writes_json() {
        colored::control::set_override(false);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let outcome = finish(&RunSummary::default(), Some(path.as_path())).unwrap();
        assert_eq!(outcome, Outcome::Success);
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"total\": 0"));
    }
}
