//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use verifica::reporter::{glyph, pass_rate_line};
use verifica::{
    Outcome, StepRecord, StepSpec, StepStatus, Workflow, WorkflowObserver, WorkflowResult,
};

/// Progress reporter for a verification run
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

/// One terminal line for a finished step
#[must_use]
pub fn format_step_line(record: &StepRecord, use_color: bool) -> String {
    let label = record.status.label();
    let label = if use_color {
        let styled = match record.status.outcome() {
            Some(Outcome::Success) => Style::new().green().bold(),
            Some(Outcome::Failure) => Style::new().red().bold(),
            Some(Outcome::Indeterminate) => Style::new().yellow().bold(),
            None => Style::new().dim(),
        };
        styled.apply_to(label).to_string()
    } else {
        label.to_string()
    };
    let detail = match &record.status {
        StepStatus::Executed(outcome) => format!(" [{}]", outcome.rule),
        StepStatus::Skipped(_) => String::new(),
    };
    format!(
        "{} {label}: {}{detail}",
        glyph(&record.status),
        record.description
    )
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` steps
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    fn line(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(text),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        self.line("");
        self.line(&styled);
    }

    /// Print the run summary
    pub fn summary(&self, result: &WorkflowResult) {
        let failed = result.count("FAILURE");
        if self.quiet && failed == 0 {
            return;
        }

        let verdict = if result.all_mandatory_passed() {
            "PASSED"
        } else {
            "FAILED"
        };
        let verdict = if self.use_color {
            let s = if result.all_mandatory_passed() {
                Style::new().green().bold()
            } else {
                Style::new().red().bold()
            };
            s.apply_to(verdict).to_string()
        } else {
            verdict.to_string()
        };

        let secs = result.duration().num_milliseconds() as f64 / 1000.0;
        self.line("");
        self.line(&format!(
            "{verdict} {} in {secs:.2}s ({} failed, {} indeterminate, {} skipped)",
            pass_rate_line(result),
            failed,
            result.count("INDETERMINATE"),
            result.count("SKIPPED"),
        ));
    }
}

impl WorkflowObserver for ProgressReporter {
    fn on_run_start(&mut self, workflow: &Workflow) {
        self.header(&format!("verifying {}", workflow.name));
        self.start_progress(workflow.steps.len() as u64, "starting");
    }

    fn on_step_start(&mut self, _index: usize, _total: usize, spec: &StepSpec) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(spec.name.to_string());
        }
    }

    fn on_step_finish(&mut self, record: &StepRecord) {
        let line = format_step_line(record, self.use_color);
        let failed = record.status.outcome() == Some(Outcome::Failure);
        if failed || !self.quiet {
            self.line(&line);
        }
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
    }

    fn on_run_finish(&mut self, _result: &WorkflowResult) {
        if let Some(pb) = self.progress_bar.take() {
            pb.finish_and_clear();
        }
    }
}
