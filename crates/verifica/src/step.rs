//! Step definitions and the Step Executor.
//!
//! A [`StepSpec`] is declarative: a name, the steps it depends on, the UI
//! action to perform and the rule table that classifies the result. The
//! [`StepExecutor`] performs the action, lets the page settle, always takes
//! a checkpoint screenshot and hands the observed URL and text to the
//! classifier.
//!
//! Recoverable errors (missing element, timeout, failed driver call) are
//! turned into a FAILURE outcome with the error as evidence. Only a fatal
//! driver fault escapes [`StepRunner::execute`].

use crate::actor::Actor;
use crate::classifier::{Classifier, Outcome, StepKind};
use crate::config::{RunContext, TicketDraft};
use crate::driver::{OptionChoice, PageDriver};
use crate::locator::{self, targets, LocatorCandidate, Resolution};
use crate::result::{VerificaError, VerificaResult};
use crate::session::Session;
use crate::wait;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Characters of visible text kept as evidence
pub const SNIPPET_CHARS: usize = 300;

/// Name of a workflow step
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Create a step name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name as str
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// UI action a step performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Fill and submit `/register`
    Register {
        /// Account to register
        actor: Actor,
    },
    /// Fill and submit `/login`
    Login {
        /// Account to log in
        actor: Actor,
    },
    /// Fill and submit `/tickets/new`
    CreateTicket {
        /// Ticket to submit
        draft: TicketDraft,
    },
    /// Open the newest ticket from `/tickets`
    OpenLatestTicket,
    /// Open `/tickets`
    ViewTickets,
    /// Sign out, clear cookies, then open `/dashboard`
    Logout,
    /// Create a user from `/users`
    CreateUser {
        /// User to create
        actor: Actor,
    },
    /// Open `/users` filtered by the user's role
    ListUsers {
        /// User to look for
        actor: Actor,
    },
}

impl StepAction {
    /// Actor that authenticates when this action succeeds
    #[must_use]
    pub const fn authenticates(&self) -> Option<&Actor> {
        match self {
            Self::Login { actor } => Some(actor),
            _ => None,
        }
    }

    /// Actor whose credentials this action submits, whatever the outcome
    #[must_use]
    pub const fn submits_credentials(&self) -> Option<&Actor> {
        match self {
            Self::Login { actor } | Self::Register { actor } => Some(actor),
            _ => None,
        }
    }

    /// Whether a successful run of this action leaves the session signed out
    #[must_use]
    pub const fn signs_out(&self) -> bool {
        matches!(self, Self::Logout)
    }
}

/// Declarative description of one workflow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    /// Unique step name
    pub name: StepName,
    /// Human-readable label for reports
    pub description: String,
    /// Steps that must have produced SUCCESS for this one to run
    pub requires: Vec<StepName>,
    /// What to do
    pub action: StepAction,
    /// How to classify the result
    pub kind: StepKind,
    /// Whether the overall status depends on this step
    pub mandatory: bool,
}

impl StepSpec {
    /// Create a mandatory step with no prerequisites
    #[must_use]
    pub fn new(name: impl Into<String>, action: StepAction, kind: StepKind) -> Self {
        let name = StepName::new(name);
        Self {
            description: name.to_string(),
            name,
            requires: Vec::new(),
            action,
            kind,
            mandatory: true,
        }
    }

    /// Set the report label
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a prerequisite
    #[must_use]
    pub fn requires(mut self, step: impl Into<String>) -> Self {
        self.requires.push(StepName::new(step));
        self
    }

    /// Exclude from the overall status
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }
}

/// What was captured for a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// URL after the step
    pub url: String,
    /// Start of the visible text
    pub snippet: String,
    /// Checkpoint screenshot
    pub screenshot: Option<PathBuf>,
    /// Error or remark
    pub note: Option<String>,
}

impl Evidence {
    fn append_note(&mut self, note: impl Into<String>) {
        let note = note.into();
        self.note = Some(match self.note.take() {
            Some(existing) => format!("{existing}; {note}"),
            None => note,
        });
    }
}

/// First [`SNIPPET_CHARS`] characters of `text`, whitespace collapsed
#[must_use]
pub fn snippet(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}

/// Classified result of an executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Tri-state outcome
    pub outcome: Outcome,
    /// Rule that produced the outcome
    pub rule: String,
    /// Evidence
    pub evidence: Evidence,
}

impl StepOutcome {
    /// FAILURE caused by a recovered error
    #[must_use]
    pub fn failed(error: &VerificaError, evidence: Evidence) -> Self {
        let mut evidence = evidence;
        evidence.append_note(error.to_string());
        Self {
            outcome: Outcome::Failure,
            rule: "error".to_string(),
            evidence,
        }
    }
}

/// Executes one step against a session
#[async_trait]
pub trait StepRunner: Send {
    /// Execute `spec`.
    ///
    /// # Errors
    ///
    /// Only fatal errors ([`VerificaError::is_fatal`]) are returned.
    async fn execute(
        &mut self,
        spec: &StepSpec,
        session: &mut Session,
        ctx: &mut RunContext,
    ) -> VerificaResult<StepOutcome>;
}

/// Signals gathered while performing an action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ActionReport {
    ticket_links: Option<usize>,
}

/// The browser-backed [`StepRunner`]
#[derive(Debug, Clone)]
pub struct StepExecutor {
    classifier: Classifier,
}

impl StepExecutor {
    /// Create an executor classifying with `classifier`
    #[must_use]
    pub const fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    async fn perform(
        action: &StepAction,
        session: &mut Session,
        ctx: &RunContext,
    ) -> VerificaResult<ActionReport> {
        let mut report = ActionReport::default();
        match action {
            StepAction::Register { actor } => {
                let driver = session.driver()?;
                open(driver, ctx, "/register").await?;
                fill(driver, &targets::name_field(), &actor.display_name).await?;
                fill(driver, &targets::email_field(), &actor.email).await?;
                fill(driver, &targets::password_field(), &actor.password).await?;
                fill_optional(driver, &targets::confirm_password_field(), &actor.password).await?;
                submit(driver, ctx).await?;
            }
            StepAction::Login { actor } => {
                let driver = session.driver()?;
                open(driver, ctx, "/login").await?;
                fill(driver, &targets::email_field(), &actor.email).await?;
                fill(driver, &targets::password_field(), &actor.password).await?;
                submit(driver, ctx).await?;
            }
            StepAction::CreateTicket { draft } => {
                let driver = session.driver()?;
                open(driver, ctx, "/tickets/new").await?;
                fill(driver, &targets::title_field(), &draft.title).await?;
                fill(driver, &targets::content_field(), &draft.content).await?;
                select_optional(
                    driver,
                    &targets::category_select(),
                    &OptionChoice::Index(draft.category_index),
                )
                .await?;
                select_optional(
                    driver,
                    &targets::priority_select(),
                    &OptionChoice::Value(draft.priority.clone()),
                )
                .await?;
                submit(driver, ctx).await?;
            }
            StepAction::OpenLatestTicket => {
                let driver = session.driver()?;
                open(driver, ctx, "/tickets").await?;
                match locator::resolve(driver, &targets::ticket_link()).await? {
                    Resolution::Located { selector, matches, .. } => {
                        debug!(matches, "ticket links found");
                        report.ticket_links = Some(matches);
                        driver.click(&selector).await?;
                        wait::settle(driver, ctx.settle()).await?;
                    }
                    Resolution::NotFound { .. } => report.ticket_links = Some(0),
                }
            }
            StepAction::ViewTickets => {
                open(session.driver()?, ctx, "/tickets").await?;
            }
            StepAction::Logout => {
                sign_out(session.driver()?, ctx).await?;
                session.clear().await?;
                open(session.driver()?, ctx, "/dashboard").await?;
            }
            StepAction::CreateUser { actor } => {
                let driver = session.driver()?;
                open(driver, ctx, "/users").await?;
                click(driver, &targets::create_user_button()).await?;
                wait::settle(driver, ctx.settle()).await?;
                fill(driver, &targets::name_field(), &actor.display_name).await?;
                fill(driver, &targets::email_field(), &actor.email).await?;
                fill(driver, &targets::password_field(), &actor.password).await?;
                select_optional(
                    driver,
                    &targets::role_select(),
                    &OptionChoice::Value(actor.role.as_str().to_string()),
                )
                .await?;
                submit(driver, ctx).await?;
            }
            StepAction::ListUsers { actor } => {
                let path = format!("/users?role={}", actor.role);
                open(session.driver()?, ctx, &path).await?;
            }
        }
        Ok(report)
    }
}

async fn open(driver: &mut dyn PageDriver, ctx: &RunContext, path: &str) -> VerificaResult<()> {
    let url = ctx.url(path);
    driver.navigate(&url).await.map_err(|e| match e {
        VerificaError::Driver { message } => VerificaError::Navigation { url, message },
        other => other,
    })?;
    wait::settle(driver, ctx.settle()).await
}

async fn fill(
    driver: &mut dyn PageDriver,
    target: &LocatorCandidate,
    value: &str,
) -> VerificaResult<()> {
    let selector = locator::require(driver, target).await?;
    driver.fill_field(&selector, value).await
}

async fn fill_optional(
    driver: &mut dyn PageDriver,
    target: &LocatorCandidate,
    value: &str,
) -> VerificaResult<bool> {
    match locator::resolve(driver, target).await? {
        Resolution::Located { selector, .. } => {
            driver.fill_field(&selector, value).await?;
            Ok(true)
        }
        Resolution::NotFound { .. } => {
            debug!(target_name = %target.target, "optional field absent");
            Ok(false)
        }
    }
}

async fn select_optional(
    driver: &mut dyn PageDriver,
    target: &LocatorCandidate,
    choice: &OptionChoice,
) -> VerificaResult<bool> {
    match locator::resolve(driver, target).await? {
        Resolution::Located { selector, .. } => {
            driver.select_option(&selector, choice).await?;
            Ok(true)
        }
        Resolution::NotFound { .. } => {
            debug!(target_name = %target.target, "optional selector absent");
            Ok(false)
        }
    }
}

async fn click(driver: &mut dyn PageDriver, target: &LocatorCandidate) -> VerificaResult<()> {
    let selector = locator::require(driver, target).await?;
    driver.click(&selector).await
}

async fn submit(driver: &mut dyn PageDriver, ctx: &RunContext) -> VerificaResult<()> {
    click(driver, &targets::submit_button()).await?;
    wait::settle(driver, ctx.settle()).await
}

/// Use the logout control if the page has one, else the auth sign-out page.
async fn sign_out(driver: &mut dyn PageDriver, ctx: &RunContext) -> VerificaResult<()> {
    if let Resolution::Located { selector, .. } =
        locator::resolve(driver, &targets::logout_button()).await?
    {
        driver.click(&selector).await?;
        return wait::settle(driver, ctx.settle()).await;
    }
    warn!("no logout control found, using the sign-out endpoint");
    open(driver, ctx, "/api/auth/signout").await?;
    if let Resolution::Located { selector, .. } =
        locator::resolve(driver, &targets::signout_confirm()).await?
    {
        driver.click(&selector).await?;
        wait::settle(driver, ctx.settle()).await?;
    }
    Ok(())
}

#[async_trait]
impl StepRunner for StepExecutor {
    async fn execute(
        &mut self,
        spec: &StepSpec,
        session: &mut Session,
        ctx: &mut RunContext,
    ) -> VerificaResult<StepOutcome> {
        info!(step = %spec.name, kind = spec.kind.name(), "step started");
        let timeout = ctx.action_timeout();
        let performed =
            match tokio::time::timeout(timeout, Self::perform(&spec.action, session, ctx)).await {
                Ok(result) => result,
                Err(_) => Err(VerificaError::timeout(
                    format!("step {}", spec.name),
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };
        let report = match performed {
            Ok(report) => Ok(report),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(step = %spec.name, error = %e, "step action failed");
                Err(e)
            }
        };

        let mut evidence = Evidence::default();
        let checkpoint = ctx.next_checkpoint(spec.name.as_str());
        match session.capture(ctx.screenshot_dir(), &checkpoint).await {
            Ok(path) => evidence.screenshot = Some(path),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(step = %spec.name, error = %e, "checkpoint screenshot failed");
                evidence.append_note(format!("screenshot failed: {e}"));
            }
        }

        let observed = session.observe().await;
        let observation = match observed {
            Ok(observation) => observation,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let error = report.err().unwrap_or(e);
                return Ok(StepOutcome::failed(&error, evidence));
            }
        };
        evidence.url.clone_from(&observation.url);
        evidence.snippet = snippet(&observation.text);

        let report = match report {
            Ok(report) => report,
            Err(e) => return Ok(StepOutcome::failed(&e, evidence)),
        };
        let observation = match report.ticket_links {
            Some(count) => observation.with_ticket_links(count),
            None => observation,
        };
        let classification = self.classifier.classify(&spec.kind, &observation);
        info!(
            step = %spec.name,
            outcome = %classification.outcome,
            rule = classification.rule,
            url = %observation.url,
            "step classified"
        );
        Ok(StepOutcome {
            outcome: classification.outcome,
            rule: classification.rule.to_string(),
            evidence,
        })
    }
}
