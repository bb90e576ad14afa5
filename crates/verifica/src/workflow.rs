//! Workflow Orchestrator.
//!
//! Runs the steps of a [`Workflow`] strictly in order against one
//! exclusively owned [`Session`]. A step is eligible only if every step it
//! requires produced SUCCESS; otherwise it is recorded as SKIPPED and the
//! runner is never called for it.
//!
//! ```text
//! ┌─────────┐  eligible   ┌──────────┐  outcome  ┌──────────────┐
//! │ step[i] │────────────▶│  runner  │──────────▶│ StepRecord   │──▶ step[i+1]
//! └─────────┘             └──────────┘           └──────────────┘
//!      │ unmet prerequisite                             ▲
//!      └──────────────────── SKIPPED ───────────────────┘
//!
//!  fatal driver fault: step FAILURE, 99_error screenshot, rest SKIPPED,
//!  session closed, WorkflowAborted returned
//! ```

use crate::classifier::Outcome;
use crate::config::RunContext;
use crate::result::VerificaError;
use crate::session::Session;
use crate::step::{Evidence, StepName, StepOutcome, StepRunner, StepSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Screenshot name used when a run aborts
pub const ERROR_SCREENSHOT: &str = "99_error";

/// An ordered set of steps plus report extras
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workflow {
    /// Scenario name
    pub name: String,
    /// Steps in execution order
    pub steps: Vec<StepSpec>,
    /// Checklist items that need a human
    pub manual_checks: Vec<String>,
    /// SQL a human should run afterwards
    pub follow_up_sql: Option<String>,
}

impl Workflow {
    /// Create an empty workflow
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, spec: StepSpec) -> Self {
        self.steps.push(spec);
        self
    }

    /// Append a manual checklist item
    #[must_use]
    pub fn manual_check(mut self, item: impl Into<String>) -> Self {
        self.manual_checks.push(item.into());
        self
    }

    /// Set the follow-up SQL block
    #[must_use]
    pub fn follow_up_sql(mut self, sql: impl Into<String>) -> Self {
        self.follow_up_sql = Some(sql.into());
        self
    }

    /// Check names are unique and prerequisites point backwards.
    ///
    /// # Errors
    ///
    /// Returns [`VerificaError::InvalidWorkflow`] describing the first problem.
    pub fn validate(&self) -> Result<(), VerificaError> {
        if self.steps.is_empty() {
            return Err(VerificaError::InvalidWorkflow {
                message: format!("workflow {} has no steps", self.name),
            });
        }
        let mut seen: HashSet<&StepName> = HashSet::new();
        for spec in &self.steps {
            for required in &spec.requires {
                if !seen.contains(required) {
                    return Err(VerificaError::InvalidWorkflow {
                        message: format!(
                            "step {} requires {required}, which does not run before it",
                            spec.name
                        ),
                    });
                }
            }
            if !seen.insert(&spec.name) {
                return Err(VerificaError::InvalidWorkflow {
                    message: format!("duplicate step name {}", spec.name),
                });
            }
        }
        Ok(())
    }
}

/// Why a step did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Prerequisites that did not produce SUCCESS
    Unmet {
        /// The prerequisites
        steps: Vec<StepName>,
    },
    /// The run aborted before reaching the step
    Aborted,
}

/// Status of one step in a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran and was classified
    Executed(StepOutcome),
    /// The step never ran
    Skipped(SkipReason),
}

impl StepStatus {
    /// Outcome, if the step ran
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Executed(outcome) => Some(outcome.outcome),
            Self::Skipped(_) => None,
        }
    }

    /// Whether the step ran and succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome() == Some(Outcome::Success)
    }

    /// Upper-case label, SKIPPED for steps that never ran
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Executed(outcome) => outcome.outcome.label(),
            Self::Skipped(_) => "SKIPPED",
        }
    }
}

/// One line of a [`WorkflowResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name
    pub name: StepName,
    /// Report label
    pub description: String,
    /// Whether the overall status depends on this step
    pub mandatory: bool,
    /// What happened
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Ordered record of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Run id
    pub run_id: Uuid,
    /// Scenario name
    pub workflow: String,
    /// Target origin
    pub base_url: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: DateTime<Utc>,
    /// One record per step, in workflow order
    pub entries: Vec<StepRecord>,
    /// Checklist items that need a human
    pub manual_checks: Vec<String>,
    /// SQL a human should run afterwards
    pub follow_up_sql: Option<String>,
    /// Fatal error that stopped the run
    pub aborted: Option<String>,
}

impl WorkflowResult {
    fn start(workflow: &Workflow, base_url: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            workflow: workflow.name.clone(),
            base_url: base_url.to_string(),
            started_at: now,
            finished_at: now,
            entries: Vec::with_capacity(workflow.steps.len()),
            manual_checks: workflow.manual_checks.clone(),
            follow_up_sql: workflow.follow_up_sql.clone(),
            aborted: None,
        }
    }

    fn push(&mut self, spec: &StepSpec, status: StepStatus) -> &StepRecord {
        self.entries.push(StepRecord {
            name: spec.name.clone(),
            description: spec.description.clone(),
            mandatory: spec.mandatory,
            status,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Status of a step by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StepStatus> {
        self.entries
            .iter()
            .find(|e| e.name.as_str() == name)
            .map(|e| &e.status)
    }

    /// Number of steps
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Number of steps that produced SUCCESS
    #[must_use]
    pub fn passed(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_success()).count()
    }

    /// Number of steps with the given label
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status.label() == label)
            .count()
    }

    /// SUCCESS over all steps, in percent
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.passed() as f64 / self.total() as f64 * 100.0
    }

    /// Whether every mandatory step produced SUCCESS
    #[must_use]
    pub fn all_mandatory_passed(&self) -> bool {
        self.aborted.is_none()
            && self
                .entries
                .iter()
                .filter(|e| e.mandatory)
                .all(|e| e.status.is_success())
    }

    /// Run duration
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// A run stopped by a fatal driver fault
#[derive(Debug, Error)]
#[error("workflow {} aborted: {error}", .result.workflow)]
pub struct WorkflowAborted {
    /// Everything recorded up to the fault, remaining steps SKIPPED
    pub result: Box<WorkflowResult>,
    /// The fault
    #[source]
    pub error: VerificaError,
}

/// Hooks called around each step
pub trait WorkflowObserver: Send {
    /// A run is starting
    fn on_run_start(&mut self, _workflow: &Workflow) {}

    /// Step `index` (0-based) of `total` is about to be considered
    fn on_step_start(&mut self, _index: usize, _total: usize, _spec: &StepSpec) {}

    /// A step finished or was skipped
    fn on_step_finish(&mut self, _record: &StepRecord) {}

    /// The run is over
    fn on_run_finish(&mut self, _result: &WorkflowResult) {}
}

/// Drives a [`Workflow`] through a [`StepRunner`]
pub struct Orchestrator<R: StepRunner> {
    runner: R,
    observer: Option<Box<dyn WorkflowObserver>>,
}

impl<R: StepRunner> std::fmt::Debug for Orchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: StepRunner> Orchestrator<R> {
    /// Create an orchestrator
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            observer: None,
        }
    }

    /// Attach an observer
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn WorkflowObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The step runner
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn WorkflowObserver)) {
        if let Some(observer) = self.observer.as_deref_mut() {
            f(observer);
        }
    }

    /// Run `workflow` to completion. The session is closed on every path.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowAborted`] for an invalid workflow or a fatal driver
    /// fault; the partial result is inside.
    pub async fn run(
        &mut self,
        workflow: &Workflow,
        mut session: Session,
        ctx: &mut RunContext,
    ) -> Result<WorkflowResult, WorkflowAborted> {
        let mut result = WorkflowResult::start(workflow, ctx.base_url().as_str());
        self.notify(|o| o.on_run_start(workflow));
        info!(
            workflow = %workflow.name,
            run_id = %result.run_id,
            steps = workflow.steps.len(),
            "workflow started"
        );

        if let Err(e) = workflow.validate() {
            return Err(self.abort(workflow, 0, result, session, e).await);
        }

        let total = workflow.steps.len();
        let mut succeeded: HashSet<StepName> = HashSet::new();
        for (index, spec) in workflow.steps.iter().enumerate() {
            self.notify(|o| o.on_step_start(index, total, spec));

            let unmet: Vec<StepName> = spec
                .requires
                .iter()
                .filter(|r| !succeeded.contains(*r))
                .cloned()
                .collect();
            if !unmet.is_empty() {
                info!(step = %spec.name, unmet = ?unmet, "step skipped");
                let record = result
                    .push(spec, StepStatus::Skipped(SkipReason::Unmet { steps: unmet }))
                    .clone();
                self.notify(|o| o.on_step_finish(&record));
                continue;
            }

            let status = match self.execute(spec, &mut session, ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(step = %spec.name, error = %e, "fatal driver fault, aborting run");
                    let mut evidence = Evidence::default();
                    let captured = session.capture(ctx.screenshot_dir(), ERROR_SCREENSHOT).await;
                    if let Ok(path) = captured {
                        evidence.screenshot = Some(path);
                    }
                    let record = result
                        .push(spec, StepStatus::Executed(StepOutcome::failed(&e, evidence)))
                        .clone();
                    self.notify(|o| o.on_step_finish(&record));
                    return Err(self.abort(workflow, index + 1, result, session, e).await);
                }
            };

            if status.outcome.is_success() {
                succeeded.insert(spec.name.clone());
                if let Some(actor) = spec.action.authenticates() {
                    if let Err(e) = session.bind(actor) {
                        warn!(step = %spec.name, error = %e, "could not bind session");
                    }
                }
            }
            let record = result.push(spec, StepStatus::Executed(status)).clone();
            self.notify(|o| o.on_step_finish(&record));
        }

        if let Err(e) = session.close().await {
            warn!(error = %e, "closing session failed");
        }
        result.finished_at = Utc::now();
        info!(
            workflow = %workflow.name,
            passed = result.passed(),
            total = result.total(),
            all_mandatory_passed = result.all_mandatory_passed(),
            "workflow finished"
        );
        self.notify(|o| o.on_run_finish(&result));
        Ok(result)
    }

    /// Execute one eligible step. Errors returned here are fatal.
    async fn execute(
        &mut self,
        spec: &StepSpec,
        session: &mut Session,
        ctx: &mut RunContext,
    ) -> Result<StepOutcome, VerificaError> {
        if let Some(actor) = spec.action.submits_credentials() {
            if session.needs_clear_for(actor) {
                warn!(
                    step = %spec.name,
                    bound = ?session.actor().map(|a| a.email.as_str()),
                    attempted = ?session.attempted().map(|a| a.email.as_str()),
                    "previous actor may still be signed in, clearing session"
                );
                match session.clear().await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => return Ok(StepOutcome::failed(&e, Evidence::default())),
                }
            }
            session.mark_attempt(actor);
        }
        match self.runner.execute(spec, session, ctx).await {
            Err(e) if !e.is_fatal() => {
                warn!(step = %spec.name, error = %e, "runner returned a recoverable error");
                Ok(StepOutcome::failed(&e, Evidence::default()))
            }
            other => other,
        }
    }

    async fn abort(
        &mut self,
        workflow: &Workflow,
        from: usize,
        mut result: WorkflowResult,
        mut session: Session,
        error: VerificaError,
    ) -> WorkflowAborted {
        for spec in workflow.steps.iter().skip(from) {
            let record = result
                .push(spec, StepStatus::Skipped(SkipReason::Aborted))
                .clone();
            self.notify(|o| o.on_step_finish(&record));
        }
        if let Err(e) = session.close().await {
            debug!(error = %e, "closing session after abort failed");
        }
        result.aborted = Some(error.to_string());
        result.finished_at = Utc::now();
        self.notify(|o| o.on_run_finish(&result));
        WorkflowAborted {
            result: Box::new(result),
            error,
        }
    }
}
