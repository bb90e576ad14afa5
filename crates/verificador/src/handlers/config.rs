//! Config and scenario listing handlers

use crate::error::{CliError, CliResult};
use crate::ConfigArgs;
use std::fmt::Write as _;
use verifica::{RunConfig, Scenario};

/// Load `args.config` (or the defaults) and validate it
pub fn load_config(args: &ConfigArgs) -> CliResult<RunConfig> {
    let config = match &args.config {
        Some(path) => RunConfig::load(path)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?,
        None => RunConfig::default(),
    };
    config
        .validate()
        .map_err(|e| CliError::config(e.to_string()))?;
    Ok(config)
}

/// Execute the config command, returning what to print
pub fn execute_config(args: &ConfigArgs) -> CliResult<String> {
    let config = load_config(args)?;
    if args.validate {
        return Ok(format!("configuration is valid (target {})", config.base_url));
    }
    Ok(config.to_yaml()?)
}

/// One line per scenario: name, step count and description
#[must_use]
pub fn list_scenarios() -> String {
    let defaults = RunConfig::default();
    let mut out = String::new();
    for scenario in Scenario::ALL {
        let steps = scenario.workflow(&defaults).steps.len();
        let _ = writeln!(
            out,
            "{:<12} {steps:>2} steps  {}",
            scenario.as_str(),
            scenario.description()
        );
    }
    out
}
