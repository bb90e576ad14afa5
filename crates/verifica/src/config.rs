//! Run configuration and the per-run context.
//!
//! [`RunConfig`] is the serialisable input (YAML). [`RunContext`] is the
//! value threaded through the orchestrator and executor for one run: the
//! resolved base URL, output paths, waits, actors and the checkpoint counter
//! used to name screenshots in order.

use crate::actor::{Actor, Role};
use crate::classifier::{Classifier, Paths, Phrases};
use crate::result::{VerificaError, VerificaResult};
use crate::wait::SettleOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default target origin
pub const DEFAULT_BASE_URL: &str = "http://localhost:3002";

/// Default per-step action timeout
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

/// The actors a scenario can use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorSet {
    /// Opens the ticket
    pub customer: Actor,
    /// Expected assignee
    pub agent: Actor,
    /// Manages users (provisioning scenario)
    pub admin: Actor,
}

impl Default for ActorSet {
    fn default() -> Self {
        Self {
            customer: Actor::default_customer(),
            agent: Actor::default_agent(),
            admin: Actor::default_admin(),
        }
    }
}

/// Ticket submitted by the customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketDraft {
    /// Title; also the text the agent must see
    pub title: String,
    /// Body
    pub content: String,
    /// Category option index (0 is the placeholder)
    pub category_index: usize,
    /// Priority option value
    pub priority: String,
}

impl Default for TicketDraft {
    fn default() -> Self {
        Self {
            title: "자동 할당 테스트 티켓".to_string(),
            content: "Round-robin 할당 알고리즘 테스트를 위한 티켓입니다. \
                      자동으로 온라인 상태의 Agent에게 할당되어야 합니다."
                .to_string(),
            category_index: 1,
            priority: "high".to_string(),
        }
    }
}

fn default_credential_candidates() -> Vec<Actor> {
    vec![
        Actor::new("customer1@example.com", "Customer123!", "customer1", Role::Customer),
        Actor::new("customer1@example.com", "customer123", "customer1", Role::Customer),
        Actor::new("customer1@example.com", "password123", "customer1", Role::Customer),
        Actor::new("agent1@example.com", "Agent123!", "agent1", Role::Agent),
        Actor::new("agent1@example.com", "agent123", "agent1", Role::Agent),
    ]
}

/// Run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Target origin
    pub base_url: String,
    /// Run the browser without a window
    pub headless: bool,
    /// Chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Disable the Chromium sandbox (containers)
    pub no_sandbox: bool,
    /// Where checkpoint screenshots go
    pub screenshot_dir: PathBuf,
    /// Markdown report
    pub report_path: PathBuf,
    /// JSON summary (defaults to the report path with `.json`)
    pub summary_path: Option<PathBuf>,
    /// Accounts sheet written by the provisioning scenario
    pub accounts_path: PathBuf,
    /// Upper bound for the network-idle wait
    pub settle_timeout_ms: u64,
    /// Fixed pause after the page went idle
    pub settle_delay_ms: u64,
    /// Upper bound for one step's action sequence
    pub action_timeout_ms: u64,
    /// Actors
    pub actors: ActorSet,
    /// Credentials tried by the credentials scenario
    pub credential_candidates: Vec<Actor>,
    /// Ticket the customer submits
    pub ticket: TicketDraft,
    /// Classifier vocabulary
    pub phrases: Phrases,
    /// Application paths the classifier compares against
    pub paths: Paths,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            chromium_path: None,
            no_sandbox: false,
            screenshot_dir: PathBuf::from("test-screenshots"),
            report_path: PathBuf::from("docs/ticket_assignment_test_result.md"),
            summary_path: None,
            accounts_path: PathBuf::from("test_accounts.txt"),
            settle_timeout_ms: crate::wait::DEFAULT_SETTLE_TIMEOUT_MS,
            settle_delay_ms: crate::wait::DEFAULT_SETTLE_DELAY_MS,
            action_timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
            actors: ActorSet::default(),
            credential_candidates: default_credential_candidates(),
            ticket: TicketDraft::default(),
            phrases: Phrases::default(),
            paths: Paths::default(),
        }
    }
}

impl RunConfig {
    /// Parse from YAML; missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns a YAML error on malformed input.
    pub fn from_yaml(yaml: &str) -> VerificaResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns I/O or YAML errors.
    pub fn load(path: &Path) -> VerificaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize to YAML.
    ///
    /// # Errors
    ///
    /// Returns a YAML error if serialization fails.
    pub fn to_yaml(&self) -> VerificaResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Write to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns I/O or YAML errors.
    pub fn save(&self, path: &Path) -> VerificaResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns a config error unless the base URL is an absolute http(s) URL.
    pub fn base(&self) -> VerificaResult<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| VerificaError::config(format!("base_url {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VerificaError::config(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// JSON summary path
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.summary_path
            .clone()
            .unwrap_or_else(|| self.report_path.with_extension("json"))
    }

    /// Settle waits
    #[must_use]
    pub const fn settle_options(&self) -> SettleOptions {
        SettleOptions {
            timeout_ms: self.settle_timeout_ms,
            delay_ms: self.settle_delay_ms,
        }
    }

    /// Classifier built from the configured vocabulary.
    ///
    /// # Errors
    ///
    /// Returns a config error for an invalid ticket path pattern or base URL.
    pub fn classifier(&self) -> VerificaResult<Classifier> {
        Ok(Classifier::new(self.phrases.clone(), self.paths.clone())?.with_base(self.base()?))
    }

    /// Check the configuration before a run.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a config error.
    pub fn validate(&self) -> VerificaResult<()> {
        self.base()?;
        for (role, actor) in [
            ("customer", &self.actors.customer),
            ("agent", &self.actors.agent),
            ("admin", &self.actors.admin),
        ] {
            if actor.email.trim().is_empty() {
                return Err(VerificaError::config(format!("{role} email is empty")));
            }
        }
        if self.settle_timeout_ms == 0 {
            return Err(VerificaError::config("settle_timeout_ms must be positive"));
        }
        if self.action_timeout_ms == 0 {
            return Err(VerificaError::config("action_timeout_ms must be positive"));
        }
        if self.ticket.title.trim().is_empty() {
            return Err(VerificaError::config("ticket title is empty"));
        }
        Classifier::new(self.phrases.clone(), self.paths.clone())?;
        Ok(())
    }
}

/// Everything one run needs, passed explicitly
#[derive(Debug, Clone)]
pub struct RunContext {
    base_url: Url,
    screenshot_dir: PathBuf,
    settle: SettleOptions,
    action_timeout: Duration,
    checkpoint: usize,
}

impl RunContext {
    /// Build the context for a run.
    ///
    /// # Errors
    ///
    /// Returns a config error for an unusable base URL.
    pub fn from_config(config: &RunConfig) -> VerificaResult<Self> {
        Ok(Self {
            base_url: config.base()?,
            screenshot_dir: config.screenshot_dir.clone(),
            settle: config.settle_options(),
            action_timeout: Duration::from_millis(config.action_timeout_ms),
            checkpoint: 0,
        })
    }

    /// Target origin
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of an application path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        self.base_url.join(path).map_or_else(
            |_| format!("{}{path}", self.base_url.as_str().trim_end_matches('/')),
            String::from,
        )
    }

    /// Screenshot directory
    #[must_use]
    pub fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir
    }

    /// Settle waits
    #[must_use]
    pub const fn settle(&self) -> &SettleOptions {
        &self.settle
    }

    /// Per-step action timeout
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        self.action_timeout
    }

    /// Next ordered screenshot name, e.g. `03_createTicket`
    pub fn next_checkpoint(&mut self, label: &str) -> String {
        self.checkpoint += 1;
        let safe: String = label
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        format!("{:02}_{safe}", self.checkpoint)
    }

    /// Number of checkpoints taken so far
    #[must_use]
    pub const fn checkpoints(&self) -> usize {
        self.checkpoint
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod run_config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = RunConfig::default();
            assert_eq!(config.base_url, "http://localhost:3002");
            assert!(config.headless);
            assert_eq!(config.screenshot_dir, PathBuf::from("test-screenshots"));
            assert_eq!(
                config.summary_path(),
                PathBuf::from("docs/ticket_assignment_test_result.json")
            );
            assert_eq!(config.ticket.category_index, 1);
            assert_eq!(config.ticket.priority, "high");
            config.validate().unwrap();
        }

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let config = RunConfig::from_yaml(
                "base_url: https://staging.example.com\n\
                 actors:\n  agent:\n    email: a2@example.com\n    password: pw\n\
                 \x20   display_name: 상담사\n    role: agent\n",
            )
            .unwrap();
            assert_eq!(config.base_url, "https://staging.example.com");
            assert_eq!(config.actors.agent.display_name, "상담사");
            assert_eq!(config.actors.customer, Actor::default_customer());
            assert_eq!(config.settle_timeout_ms, 10_000);
        }

        #[test]
        fn test_yaml_file_round_trip() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested/verifica.yaml");
            let mut config = RunConfig::default();
            config.headless = false;
            config.save(&path).unwrap();
            assert_eq!(RunConfig::load(&path).unwrap(), config);
        }

        #[test]
        fn test_validate_rejects_bad_base_url() {
            let config = RunConfig {
                base_url: "localhost:3002/app".to_string(),
                ..RunConfig::default()
            };
            assert!(matches!(config.validate(), Err(VerificaError::Config { .. })));
            let config = RunConfig {
                base_url: "not a url".to_string(),
                ..RunConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_validate_rejects_zero_timeouts_and_empty_email() {
            let config = RunConfig {
                action_timeout_ms: 0,
                ..RunConfig::default()
            };
            assert!(config.validate().is_err());

            let mut config = RunConfig::default();
            config.actors.agent.email = "  ".to_string();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("agent email"));
        }

        #[test]
        fn test_malformed_yaml() {
            assert!(matches!(
                RunConfig::from_yaml("headless: [unterminated"),
                Err(VerificaError::Yaml(_))
            ));
        }
    }

    mod run_context_tests {
        use super::*;

        #[test]
        fn test_url_join() {
            let ctx = RunContext::from_config(&RunConfig::default()).unwrap();
            assert_eq!(ctx.url("/tickets/new"), "http://localhost:3002/tickets/new");
            assert_eq!(ctx.url("/users?role=agent"), "http://localhost:3002/users?role=agent");
        }

        #[test]
        fn test_checkpoints_are_ordered() {
            let mut ctx = RunContext::from_config(&RunConfig::default()).unwrap();
            assert_eq!(ctx.next_checkpoint("registerCustomer"), "01_registerCustomer");
            assert_eq!(ctx.next_checkpoint("login#2"), "02_login_2");
            assert_eq!(ctx.checkpoints(), 2);
        }
    }
}
