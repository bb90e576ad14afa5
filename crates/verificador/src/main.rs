//! Verificador: certify the ticket auto-assignment workflow in a browser
//!
//! ## Usage
//!
//! ```bash
//! verificador run                           # assignment scenario, headless
//! verificador run -s existing --headed      # reuse accounts, show the browser
//! verificador run -s credentials --strict   # try logins, fail on any FAILURE
//! verificador init                          # write verifica.yaml
//! verificador config -c verifica.yaml       # show the effective configuration
//! ```

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use verificador::{
    handlers, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, ProgressReporter,
    Verbosity,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(&config);

    match run(&cli, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(ColorChoice::from(cli.color))
}

fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.color.should_color())
        .with_target(false)
        .init();
}

fn run(cli: &Cli, config: &CliConfig) -> CliResult<bool> {
    match &cli.command {
        Commands::Run(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let outcome = runtime.block_on(handlers::execute_run(config, args))?;
            if let Some(ref reason) = outcome.result.aborted {
                return Err(CliError::run(reason.clone()));
            }
            Ok(outcome.exit_ok(args.strict))
        }
        Commands::Init(args) => {
            let path = handlers::execute_init(args)?;
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
                .success(&format!("wrote {}", path.display()));
            Ok(true)
        }
        Commands::Config(args) => {
            print!("{}", ensure_newline(handlers::execute_config(args)?));
            Ok(true)
        }
        Commands::Scenarios => {
            print!("{}", handlers::list_scenarios());
            Ok(true)
        }
    }
}

fn ensure_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_verbose() {
        let cli = Cli::parse_from(["verificador", "-v", "scenarios"]);
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Verbose);
    }

    #[test]
    fn test_build_config_quiet() {
        let cli = Cli::parse_from(["verificador", "-q", "--color", "never", "scenarios"]);
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Quiet);
        assert_eq!(config.color, ColorChoice::Never);
    }

    #[test]
    fn test_ensure_newline() {
        assert_eq!(ensure_newline("a".into()), "a\n");
        assert_eq!(ensure_newline("a\n".into()), "a\n");
    }
}
