//! Run command handler

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use crate::RunArgs;
use tracing::{error, info};
use verifica::{
    launch_driver, BrowserConfig, EmitSummary, Orchestrator, PageDriver, ReportEmitter, RunConfig,
    RunContext, Scenario, Session, StepExecutor, WorkflowResult,
};

/// What a finished (or aborted) run left behind
#[derive(Debug)]
pub struct RunOutcome {
    /// Per-step results
    pub result: WorkflowResult,
    /// Report files written
    pub emitted: EmitSummary,
}

impl RunOutcome {
    /// Whether the process should exit successfully.
    ///
    /// An aborted run always fails; otherwise only `strict` turns a failed
    /// mandatory step into a failure.
    #[must_use]
    pub fn exit_ok(&self, strict: bool) -> bool {
        if self.result.aborted.is_some() {
            return false;
        }
        !strict || self.result.all_mandatory_passed()
    }
}

/// Build the run configuration: defaults, then the YAML file, then flags
pub fn resolve_run_config(args: &RunArgs) -> CliResult<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?,
        None => RunConfig::default(),
    };

    if let Some(ref base_url) = args.base_url {
        config.base_url.clone_from(base_url);
    }
    if let Some(headless) = args.headless {
        config.headless = headless;
    }
    if args.headed {
        config.headless = false;
    }
    if let Some(ref chromium) = args.chromium {
        config.chromium_path = Some(chromium.clone());
    }
    if args.no_sandbox {
        config.no_sandbox = true;
    }
    if let Some(ref dir) = args.screenshot_dir {
        config.screenshot_dir.clone_from(dir);
    }
    if let Some(ref report) = args.report {
        config.report_path.clone_from(report);
    }
    if let Some(ref summary) = args.summary {
        config.summary_path = Some(summary.clone());
    }

    config
        .validate()
        .map_err(|e| CliError::config(e.to_string()))?;
    Ok(config)
}

/// Execute the run command against a real browser
pub async fn execute_run(cli: &CliConfig, args: &RunArgs) -> CliResult<RunOutcome> {
    let run_config = resolve_run_config(args)?;
    let scenario = Scenario::from(args.scenario);
    info!(%scenario, base_url = %run_config.base_url, "launching browser");
    let driver = launch_driver(BrowserConfig::from(&run_config)).await?;
    run_with_driver(cli, &run_config, scenario, driver).await
}

/// Run `scenario` on `driver`, then emit the reports.
///
/// A fatal driver fault still produces reports; the outcome carries the
/// abort reason in `result.aborted`.
pub async fn run_with_driver(
    cli: &CliConfig,
    run_config: &RunConfig,
    scenario: Scenario,
    driver: Box<dyn PageDriver>,
) -> CliResult<RunOutcome> {
    let use_color = cli.color.should_color();
    let quiet = cli.verbosity.is_quiet();

    let workflow = scenario.workflow(run_config);
    let mut ctx = RunContext::from_config(run_config)?;
    let mut orchestrator = Orchestrator::new(StepExecutor::new(run_config.classifier()?))
        .with_observer(Box::new(ProgressReporter::new(use_color, quiet)));

    let reporter = ProgressReporter::new(use_color, quiet);
    let result = match orchestrator.run(&workflow, Session::new(driver), &mut ctx).await {
        Ok(result) => result,
        Err(aborted) => {
            error!(error = %aborted.error, "run aborted");
            reporter.failure(&format!("run aborted: {}", aborted.error));
            *aborted.result
        }
    };

    let emitted = ReportEmitter::for_run(run_config, scenario).emit(&result);
    for path in &emitted.written {
        reporter.info(&format!("wrote {}", path.display()));
    }
    for (path, reason) in &emitted.failed {
        reporter.warning(&format!("could not write {}: {reason}", path.display()));
    }
    reporter.summary(&result);

    Ok(RunOutcome { result, emitted })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ColorChoice, Verbosity};
    use std::path::Path;
    use verifica::{MockDriver, MockFault, MockPage};

    fn quiet_cli() -> CliConfig {
        CliConfig::new()
            .with_verbosity(Verbosity::Quiet)
            .with_color(ColorChoice::Never)
    }

    fn config_in(dir: &Path) -> RunConfig {
        RunConfig {
            base_url: "http://app.test".to_string(),
            screenshot_dir: dir.join("shots"),
            report_path: dir.join("docs/report.md"),
            accounts_path: dir.join("accounts.txt"),
            settle_delay_ms: 0,
            ..RunConfig::default()
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_defaults_without_file() {
            let config = resolve_run_config(&RunArgs::default()).unwrap();
            assert_eq!(config, RunConfig::default());
        }

        #[test]
        fn test_flags_override_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("verifica.yaml");
            std::fs::write(&path, "base_url: http://from-file:3002\nheadless: true\n").unwrap();

            let args = RunArgs {
                config: Some(path),
                base_url: Some("http://from-flag:4000".to_string()),
                headed: true,
                report: Some(dir.path().join("r.md")),
                ..RunArgs::default()
            };
            let config = resolve_run_config(&args).unwrap();
            assert_eq!(config.base_url, "http://from-flag:4000");
            assert!(!config.headless);
            assert_eq!(config.report_path, dir.path().join("r.md"));
        }

        #[test]
        fn test_invalid_base_url_rejected() {
            let args = RunArgs {
                base_url: Some("not a url".to_string()),
                ..RunArgs::default()
            };
            let err = resolve_run_config(&args).unwrap_err();
            assert!(matches!(err, CliError::Config { .. }));
        }

        #[test]
        fn test_missing_file_rejected() {
            let args = RunArgs {
                config: Some("/nonexistent/verifica.yaml".into()),
                ..RunArgs::default()
            };
            assert!(matches!(
                resolve_run_config(&args),
                Err(CliError::Config { .. })
            ));
        }
    }

    mod run_tests {
        use super::*;

        #[tokio::test]
        async fn test_unreachable_pages_still_produce_reports() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path());
            let outcome = run_with_driver(
                &quiet_cli(),
                &config,
                Scenario::Existing,
                Box::new(MockDriver::with_origin("http://app.test")),
            )
            .await
            .unwrap();

            assert!(outcome.emitted.is_complete());
            assert!(config.report_path.exists());
            assert!(config.summary_path().exists());
            assert!(!config.accounts_path.exists());
            assert!(!outcome.result.all_mandatory_passed());
            assert!(outcome.exit_ok(false));
            assert!(!outcome.exit_ok(true));
        }

        #[tokio::test]
        async fn test_fatal_fault_reports_abort() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path());
            let driver = MockDriver::new()
                .route("/login", MockPage::new("/login").with_element("#email"))
                .fail_on("navigate", MockFault::Fatal);
            let outcome =
                run_with_driver(&quiet_cli(), &config, Scenario::Existing, Box::new(driver))
                    .await
                    .unwrap();

            assert!(outcome.result.aborted.is_some());
            assert!(!outcome.exit_ok(false));
            let report = std::fs::read_to_string(&config.report_path).unwrap();
            assert!(report.contains("실행 중단"));
        }

        #[tokio::test]
        async fn test_provision_writes_accounts_sheet() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path());
            run_with_driver(
                &quiet_cli(),
                &config,
                Scenario::Provision,
                Box::new(MockDriver::new()),
            )
            .await
            .unwrap();
            let sheet = std::fs::read_to_string(&config.accounts_path).unwrap();
            assert!(sheet.starts_with("=== Test Accounts ==="));
        }
    }
}
