//! Verifica: multi-actor browser workflow verification
//!
//! Drives a ticketing web application through a scripted, multi-actor
//! scenario and classifies every step as SUCCESS, FAILURE or INDETERMINATE
//! from what the page shows, not from what the script expected.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      VERIFICA Architecture                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐   │
//! │  │ Scenario │──►│ Orchestrator │──►│ Executor │──►│  Driver  │   │
//! │  │  graph   │   │ (skip/abort) │   │ + Session│   │ (CDP/mock)│  │
//! │  └──────────┘   └──────┬───────┘   └────┬─────┘   └──────────┘   │
//! │                        │                │                        │
//! │                        ▼                ▼                        │
//! │                 ┌────────────┐   ┌────────────┐                  │
//! │                 │  Reporter  │   │ Classifier │                  │
//! │                 └────────────┘   └────────────┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use verifica::{
//!     MockDriver, Orchestrator, ReportEmitter, RunConfig, RunContext, Scenario, Session,
//!     StepExecutor,
//! };
//!
//! # async fn demo() -> verifica::VerificaResult<()> {
//! let config = RunConfig::default();
//! let scenario = Scenario::Assignment;
//! let mut ctx = RunContext::from_config(&config)?;
//! let mut orchestrator = Orchestrator::new(StepExecutor::new(config.classifier()?));
//! let session = Session::new(Box::new(MockDriver::new()));
//! let result = match orchestrator.run(&scenario.workflow(&config), session, &mut ctx).await {
//!     Ok(result) => result,
//!     Err(aborted) => *aborted.result,
//! };
//! ReportEmitter::for_run(&config, scenario).emit(&result);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod actor;
#[allow(clippy::missing_errors_doc)]
pub mod browser;
mod classifier;
mod config;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod driver;
#[allow(clippy::missing_errors_doc)]
pub mod locator;
pub mod reporter;
mod result;
mod scenario;
#[allow(clippy::missing_errors_doc)]
mod session;
#[allow(clippy::missing_errors_doc, clippy::too_many_lines)]
mod step;
pub mod wait;
#[allow(clippy::missing_errors_doc, clippy::too_many_lines)]
mod workflow;

pub use actor::{Actor, Role};
pub use browser::{launch_driver, BrowserConfig};
#[cfg(feature = "browser")]
pub use browser::ChromiumDriver;
pub use classifier::{
    Classification, Classifier, Observation, Outcome, Paths, Phrases, StepKind,
};
pub use config::{
    ActorSet, RunConfig, RunContext, TicketDraft, DEFAULT_ACTION_TIMEOUT_MS, DEFAULT_BASE_URL,
};
pub use driver::{MockDriver, MockFault, MockPage, OptionChoice, PageDriver, Screenshot};
pub use locator::{LocatorCandidate, Resolution, Selector};
pub use reporter::{EmitSummary, ReportEmitter};
pub use result::{VerificaError, VerificaResult};
pub use scenario::{Scenario, ASSIGNMENT_FOLLOW_UP_SQL};
pub use session::Session;
pub use step::{
    snippet, Evidence, StepAction, StepExecutor, StepName, StepOutcome, StepRunner, StepSpec,
    SNIPPET_CHARS,
};
pub use wait::SettleOptions;
pub use workflow::{
    Orchestrator, SkipReason, StepRecord, StepStatus, Workflow, WorkflowAborted,
    WorkflowObserver, WorkflowResult, ERROR_SCREENSHOT,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        Actor, MockDriver, Orchestrator, Outcome, PageDriver, ReportEmitter, Role, RunConfig,
        RunContext, Scenario, Session, StepExecutor, StepStatus, VerificaError, VerificaResult,
        WorkflowObserver, WorkflowResult,
    };
}
