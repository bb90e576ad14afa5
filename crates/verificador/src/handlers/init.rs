//! Init command handler

use crate::error::{CliError, CliResult};
use crate::InitArgs;
use std::path::{Path, PathBuf};
use verifica::RunConfig;

/// Header written above the generated YAML
pub const CONFIG_HEADER: &str = "\
# Verifica run configuration.
# Flags and VERIFICA_* environment variables override these values.
";

/// Default configuration file content
pub fn generate_run_config() -> CliResult<String> {
    let yaml = RunConfig::default().to_yaml()?;
    Ok(format!("{CONFIG_HEADER}{yaml}"))
}

/// Whether `path` may be written without `--force`
#[must_use]
pub fn is_valid_init_path(path: &Path) -> bool {
    !path.exists()
}

/// Execute the init command
pub fn execute_init(args: &InitArgs) -> CliResult<PathBuf> {
    if !args.force && !is_valid_init_path(&args.path) {
        return Err(CliError::invalid_argument(format!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        )));
    }
    if let Some(parent) = args.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.path, generate_run_config()?)?;
    Ok(args.path.clone())
}
