//! CLI command definitions using clap

use crate::config::ColorChoice;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use verifica::Scenario;

/// Verificador: drive a ticketing web app through a browser and certify the
/// ticket auto-assignment workflow
#[derive(Parser, Debug)]
#[command(name = "verificador")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a verification scenario against the application
    Run(RunArgs),

    /// Write a default run configuration file
    Init(InitArgs),

    /// Show the effective run configuration
    Config(ConfigArgs),

    /// List the available scenarios
    Scenarios,
}

/// Arguments for the run command
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value = "assignment")]
    pub scenario: ScenarioArg,

    /// Run configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Application origin
    #[arg(long, env = "VERIFICA_BASE_URL")]
    pub base_url: Option<String>,

    /// Run the browser without a window
    #[arg(long, env = "VERIFICA_HEADLESS", conflicts_with = "headed")]
    pub headless: Option<bool>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Chromium binary to launch
    #[arg(long, env = "VERIFICA_CHROMIUM")]
    pub chromium: Option<String>,

    /// Disable the Chromium sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Directory for checkpoint screenshots
    #[arg(long)]
    pub screenshot_dir: Option<PathBuf>,

    /// Markdown report path
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// JSON summary path
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Exit non-zero unless every mandatory step succeeded
    #[arg(long)]
    pub strict: bool,
}

/// Scenario selection
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScenarioArg {
    /// Register, log in, create a ticket, check assignment, agent view
    #[default]
    Assignment,
    /// Same as assignment for accounts that already exist
    Existing,
    /// Try each configured credential
    Credentials,
    /// Create the customer and agent accounts through the UI
    Provision,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Assignment => Self::Assignment,
            ScenarioArg::Existing => Self::Existing,
            ScenarioArg::Credentials => Self::Credentials,
            ScenarioArg::Provision => Self::Provision,
        }
    }
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// File to write
    #[arg(default_value = "verifica.yaml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Run configuration file (YAML); defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only check that the configuration is valid
    #[arg(long)]
    pub validate: bool,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Detect terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_run_defaults() {
            let cli = Cli::parse_from(["verificador", "run"]);
            match cli.command {
                Commands::Run(args) => {
                    assert_eq!(args.scenario, ScenarioArg::Assignment);
                    assert!(!args.strict);
                    assert!(!args.headed);
                    assert!(args.config.is_none());
                }
                other => panic!("expected run, got {other:?}"),
            }
        }

        #[test]
        fn test_run_overrides() {
            let cli = Cli::parse_from([
                "verificador",
                "-vv",
                "run",
                "--scenario",
                "credentials",
                "--base-url",
                "http://staging:3002",
                "--headed",
                "--strict",
                "--report",
                "out/report.md",
            ]);
            assert_eq!(cli.verbose, 2);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.scenario, ScenarioArg::Credentials);
            assert_eq!(args.base_url.as_deref(), Some("http://staging:3002"));
            assert!(args.headed);
            assert!(args.strict);
            assert_eq!(args.report, Some(PathBuf::from("out/report.md")));
        }

        #[test]
        fn test_headless_conflicts_with_headed() {
            let parsed =
                Cli::try_parse_from(["verificador", "run", "--headless", "true", "--headed"]);
            assert!(parsed.is_err());
        }

        #[test]
        fn test_unknown_scenario_rejected() {
            assert!(Cli::try_parse_from(["verificador", "run", "-s", "nope"]).is_err());
        }

        #[test]
        fn test_init_default_path() {
            let cli = Cli::parse_from(["verificador", "init"]);
            let Commands::Init(args) = cli.command else {
                panic!("expected init");
            };
            assert_eq!(args.path, PathBuf::from("verifica.yaml"));
            assert!(!args.force);
        }
    }

    mod conversion_tests {
        use super::*;

        #[test]
        fn test_scenario_arg_maps_to_scenario() {
            assert_eq!(Scenario::from(ScenarioArg::Existing), Scenario::Existing);
            assert_eq!(Scenario::from(ScenarioArg::Provision), Scenario::Provision);
        }

        #[test]
        fn test_color_arg_maps_to_choice() {
            assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
            assert_eq!(ColorChoice::from(ColorArg::Always), ColorChoice::Always);
        }
    }
}
