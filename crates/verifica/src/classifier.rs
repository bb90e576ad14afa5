//! Outcome Classifier.
//!
//! Turns what a step left on screen (URL, visible text, ticket link count)
//! into a tri-state [`Outcome`]. Each [`StepKind`] owns a small ordered rule
//! table; the first matching rule wins.
//!
//! Classification never fails: every input maps to exactly one outcome.
//! A state that matches neither a positive nor a negative rule is reported
//! as [`Outcome::Indeterminate`], never upgraded or downgraded.

use crate::result::{VerificaError, VerificaResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Tri-state result of an executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The observed state confirms the step worked
    Success,
    /// The observed state shows the step did not work
    Failure,
    /// The available signals neither confirm nor deny success
    Indeterminate,
}

impl Outcome {
    /// Upper-case label used in reports
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Indeterminate => "INDETERMINATE",
        }
    }

    /// Whether this is [`Outcome::Success`]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which rule table classifies a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Account registration
    Registration,
    /// Credential login
    Login,
    /// Ticket submission
    TicketCreation,
    /// Whether the newest ticket shows an assignee
    AssignmentCheck {
        /// Display name of the agent expected to be assigned
        agent_name: String,
    },
    /// Whether a role's ticket list shows the ticket created in this run
    RoleView {
        /// Distinguishing ticket title
        title: String,
    },
    /// Sign-out followed by a protected-page check
    Logout,
    /// Admin creates a user through the UI
    UserProvisioning {
        /// Email of the created user
        email: String,
    },
    /// The users list shows a user
    UserListed {
        /// Email of the user
        email: String,
    },
}

impl StepKind {
    /// Short snake-case name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Login => "login",
            Self::TicketCreation => "ticket_creation",
            Self::AssignmentCheck { .. } => "assignment_check",
            Self::RoleView { .. } => "role_view",
            Self::Logout => "logout",
            Self::UserProvisioning { .. } => "user_provisioning",
            Self::UserListed { .. } => "user_listed",
        }
    }
}

/// What a step left on screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Page URL after the step settled
    pub url: String,
    /// Visible body text
    pub text: String,
    /// Number of ticket links on the page, when the step counted them
    pub ticket_links: Option<usize>,
}

impl Observation {
    /// Create an observation
    #[must_use]
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            ticket_links: None,
        }
    }

    /// Attach a ticket link count
    #[must_use]
    pub const fn with_ticket_links(mut self, count: usize) -> Self {
        self.ticket_links = Some(count);
        self
    }
}

/// Vocabulary the rule tables look for in page text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phrases {
    /// Registration rejected because the account exists
    pub already_registered: Vec<String>,
    /// Registration confirmed without a redirect
    pub registration_success: Vec<String>,
    /// Login rejected
    pub login_failure: Vec<String>,
    /// Text that shows a ticket has an assignee
    pub assignment_markers: Vec<String>,
    /// User creation rejected because the user exists
    pub user_exists: Vec<String>,
}

impl Default for Phrases {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(ToString::to_string).collect()
        }
        Self {
            already_registered: owned(&["이미 등록된"]),
            registration_success: owned(&["회원가입 성공", "로그인 페이지로 이동"]),
            login_failure: owned(&["로그인 실패", "올바르지 않습니다"]),
            assignment_markers: owned(&["할당됨", "Assigned", "Agent", "agent"]),
            user_exists: owned(&["이미 존재", "이미 등록된", "already exists"]),
        }
    }
}

fn contains_any(text: &str, phrases: &[String]) -> bool {
    phrases
        .iter()
        .any(|p| !p.is_empty() && text.contains(p.as_str()))
}

/// Application paths the rule tables compare against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Login page
    pub login: String,
    /// Where the app lands after registration
    pub post_registration: Vec<String>,
    /// Ticket collection or detail page; group `id` is the ticket id
    pub ticket_pattern: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            post_registration: vec!["/login".to_string(), "/dashboard".to_string()],
            ticket_pattern: r"^/tickets(?:/(?P<id>[^/]+))?/?$".to_string(),
        }
    }
}

/// Result of classification plus the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Outcome
    pub outcome: Outcome,
    /// Identifier of the winning rule
    pub rule: &'static str,
}

impl Classification {
    const fn new(outcome: Outcome, rule: &'static str) -> Self {
        Self { outcome, rule }
    }
}

/// Rule tables for every [`StepKind`]
#[derive(Debug, Clone)]
pub struct Classifier {
    phrases: Phrases,
    paths: Paths,
    ticket_pattern: Regex,
    base: Option<Url>,
}

impl Classifier {
    /// Build a classifier.
    ///
    /// # Errors
    ///
    /// Returns a config error if the ticket path pattern is not a valid regex.
    pub fn new(phrases: Phrases, paths: Paths) -> VerificaResult<Self> {
        let ticket_pattern = Regex::new(&paths.ticket_pattern).map_err(|e| {
            VerificaError::config(format!("invalid ticket path pattern: {e}"))
        })?;
        Ok(Self {
            phrases,
            paths,
            ticket_pattern,
            base: None,
        })
    }

    /// Resolve relative observed URLs against `base`
    #[must_use]
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    /// Phrases in use
    #[must_use]
    pub const fn phrases(&self) -> &Phrases {
        &self.phrases
    }

    /// Path of the observed URL without query or fragment, trailing `/`
    /// removed. `None` when the URL cannot be parsed.
    #[must_use]
    pub fn path_of(&self, url: &str) -> Option<String> {
        let parsed = match (Url::parse(url), &self.base) {
            (Ok(parsed), _) => parsed,
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => base.join(url).ok()?,
            (Err(_), _) => return None,
        };
        if parsed.cannot_be_a_base() {
            return None;
        }
        let path = parsed.path();
        let trimmed = path.trim_end_matches('/');
        Some(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
    }

    /// Ticket id in a ticket detail path (`None` for the collection page)
    #[must_use]
    pub fn ticket_id(&self, path: &str) -> Option<String> {
        self.ticket_pattern
            .captures(path)
            .and_then(|c| c.name("id"))
            .map(|m| m.as_str().to_string())
    }

    fn is_ticket_path(&self, path: &str) -> bool {
        self.ticket_pattern.is_match(path) && self.ticket_id(path).as_deref() != Some("new")
    }

    /// Classify an observation. Total: every input yields an outcome.
    #[must_use]
    pub fn classify(&self, kind: &StepKind, observation: &Observation) -> Classification {
        let path = self.path_of(&observation.url);
        let path = path.as_deref();
        let text = observation.text.as_str();
        let p = &self.phrases;
        match kind {
            StepKind::Registration => {
                if path.is_some_and(|path| self.paths.post_registration.iter().any(|r| r == path)) {
                    Classification::new(Outcome::Success, "registration.redirected")
                } else if contains_any(text, &p.already_registered) {
                    Classification::new(Outcome::Success, "registration.already_registered")
                } else if contains_any(text, &p.registration_success) {
                    Classification::new(Outcome::Success, "registration.confirmed")
                } else {
                    Classification::new(Outcome::Failure, "registration.other")
                }
            }
            StepKind::Login => {
                if path.is_some_and(|path| path != self.paths.login) {
                    Classification::new(Outcome::Success, "login.left_login_page")
                } else if contains_any(text, &p.login_failure) {
                    Classification::new(Outcome::Failure, "login.failure_phrase")
                } else if path == Some(self.paths.login.as_str()) {
                    Classification::new(Outcome::Failure, "login.still_on_login_page")
                } else {
                    Classification::new(Outcome::Success, "login.default")
                }
            }
            StepKind::TicketCreation => {
                if path.is_some_and(|path| self.is_ticket_path(path)) {
                    Classification::new(Outcome::Success, "ticket.on_tickets_path")
                } else {
                    Classification::new(Outcome::Failure, "ticket.other")
                }
            }
            StepKind::AssignmentCheck { agent_name } => {
                let named = !agent_name.is_empty() && text.contains(agent_name.as_str());
                if named || contains_any(text, &p.assignment_markers) {
                    Classification::new(Outcome::Success, "assignment.marker")
                } else if observation.ticket_links == Some(0) {
                    Classification::new(Outcome::Failure, "assignment.no_ticket")
                } else {
                    Classification::new(Outcome::Indeterminate, "assignment.unmarked")
                }
            }
            StepKind::RoleView { title } => {
                if !title.is_empty() && text.contains(title.as_str()) {
                    Classification::new(Outcome::Success, "role_view.title_visible")
                } else {
                    Classification::new(Outcome::Failure, "role_view.title_missing")
                }
            }
            StepKind::Logout => {
                if path.is_some_and(|path| path.starts_with(self.paths.login.as_str())) {
                    Classification::new(Outcome::Success, "logout.redirected_to_login")
                } else {
                    Classification::new(Outcome::Failure, "logout.session_alive")
                }
            }
            StepKind::UserProvisioning { email } => {
                if !email.is_empty() && text.contains(email.as_str()) {
                    Classification::new(Outcome::Success, "provisioning.listed")
                } else if contains_any(text, &p.user_exists) {
                    Classification::new(Outcome::Success, "provisioning.already_exists")
                } else {
                    Classification::new(Outcome::Indeterminate, "provisioning.unconfirmed")
                }
            }
            StepKind::UserListed { email } => {
                let local = crate::actor::local_part(email);
                let found = (!email.is_empty() && text.contains(email.as_str()))
                    || (!local.is_empty() && text.contains(local));
                if found {
                    Classification::new(Outcome::Success, "user_listed.found")
                } else {
                    Classification::new(Outcome::Failure, "user_listed.missing")
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> Classifier {
        Classifier::new(Phrases::default(), Paths::default()).unwrap()
    }

    fn classify(kind: &StepKind, url: &str, text: &str) -> Outcome {
        classifier()
            .classify(kind, &Observation::new(url, text))
            .outcome
    }

    mod path_tests {
        use super::*;

        #[test]
        fn test_query_and_trailing_slash_ignored() {
            let c = classifier();
            assert_eq!(c.path_of("http://app.test/login?error=1").as_deref(), Some("/login"));
            assert_eq!(c.path_of("http://app.test/tickets/").as_deref(), Some("/tickets"));
            assert_eq!(c.path_of("http://app.test").as_deref(), Some("/"));
        }

        #[test]
        fn test_relative_needs_base() {
            assert_eq!(classifier().path_of("/login"), None);
            let c = classifier().with_base(Url::parse("http://app.test").unwrap());
            assert_eq!(c.path_of("/login").as_deref(), Some("/login"));
        }

        #[test]
        fn test_ticket_id() {
            let c = classifier();
            assert_eq!(c.ticket_id("/tickets/123").as_deref(), Some("123"));
            assert_eq!(c.ticket_id("/tickets"), None);
        }

        #[test]
        fn test_invalid_ticket_pattern_is_config_error() {
            let paths = Paths {
                ticket_pattern: "(".to_string(),
                ..Paths::default()
            };
            let err = Classifier::new(Phrases::default(), paths).unwrap_err();
            assert!(matches!(err, VerificaError::Config { .. }));
        }
    }

    mod registration_tests {
        use super::*;

        #[test]
        fn test_redirect_to_login_or_dashboard() {
            let kind = StepKind::Registration;
            assert_eq!(classify(&kind, "http://app.test/login", ""), Outcome::Success);
            assert_eq!(classify(&kind, "http://app.test/dashboard", ""), Outcome::Success);
        }

        #[test]
        fn test_already_registered_is_success() {
            let outcome = classify(
                &StepKind::Registration,
                "http://app.test/register",
                "이미 등록된 이메일입니다",
            );
            assert_eq!(outcome, Outcome::Success);
        }

        #[test]
        fn test_success_phrase() {
            let outcome = classify(&StepKind::Registration, "http://app.test/register", "회원가입 성공!");
            assert_eq!(outcome, Outcome::Success);
        }

        #[test]
        fn test_anything_else_fails() {
            let outcome =
                classify(&StepKind::Registration, "http://app.test/register", "비밀번호가 짧습니다");
            assert_eq!(outcome, Outcome::Failure);
        }
    }

    mod login_tests {
        use super::*;

        #[test]
        fn test_left_login_page() {
            let c = classifier()
                .classify(&StepKind::Login, &Observation::new("http://app.test/dashboard", ""));
            assert_eq!(c.outcome, Outcome::Success);
            assert_eq!(c.rule, "login.left_login_page");
        }

        #[test]
        fn test_failure_phrase_on_login_page() {
            let c = classifier().classify(
                &StepKind::Login,
                &Observation::new("http://app.test/login", "로그인 실패: 이메일 또는 비밀번호가 올바르지 않습니다"),
            );
            assert_eq!(c.outcome, Outcome::Failure);
            assert_eq!(c.rule, "login.failure_phrase");
        }

        #[test]
        fn test_still_on_login_page_with_query() {
            let c = classifier().classify(
                &StepKind::Login,
                &Observation::new("http://app.test/login?error=CredentialsSignin", ""),
            );
            assert_eq!(c.outcome, Outcome::Failure);
            assert_eq!(c.rule, "login.still_on_login_page");
        }

        #[test]
        fn test_unparseable_url_defaults_to_success() {
            let c = classifier().classify(&StepKind::Login, &Observation::new("", ""));
            assert_eq!(c.outcome, Outcome::Success);
            assert_eq!(c.rule, "login.default");
        }
    }

    mod ticket_tests {
        use super::*;

        #[test]
        fn test_collection_and_detail_succeed() {
            assert_eq!(
                classify(&StepKind::TicketCreation, "http://app.test/tickets", ""),
                Outcome::Success
            );
            assert_eq!(
                classify(&StepKind::TicketCreation, "http://app.test/tickets/123", ""),
                Outcome::Success
            );
        }

        #[test]
        fn test_still_on_new_ticket_form_fails() {
            assert_eq!(
                classify(&StepKind::TicketCreation, "http://app.test/tickets/new", ""),
                Outcome::Failure
            );
            assert_eq!(
                classify(&StepKind::TicketCreation, "http://app.test/dashboard", ""),
                Outcome::Failure
            );
        }
    }

    mod assignment_tests {
        use super::*;

        fn kind() -> StepKind {
            StepKind::AssignmentCheck {
                agent_name: "Test Agent".to_string(),
            }
        }

        #[test]
        fn test_marker_found() {
            let obs = Observation::new("http://app.test/tickets/123", "Assigned to Test Agent")
                .with_ticket_links(1);
            assert_eq!(classifier().classify(&kind(), &obs).outcome, Outcome::Success);
        }

        #[test]
        fn test_agent_name_alone_is_marker() {
            let c = Classifier::new(
                Phrases {
                    assignment_markers: vec![],
                    ..Phrases::default()
                },
                Paths::default(),
            )
            .unwrap();
            let obs = Observation::new("http://app.test/tickets/1", "담당자: Test Agent");
            assert_eq!(c.classify(&kind(), &obs).outcome, Outcome::Success);
        }

        #[test]
        fn test_no_ticket_link_fails() {
            let obs = Observation::new("http://app.test/tickets", "티켓이 없습니다").with_ticket_links(0);
            assert_eq!(classifier().classify(&kind(), &obs).outcome, Outcome::Failure);
        }

        #[test]
        fn test_unmarked_is_indeterminate() {
            let obs = Observation::new("http://app.test/tickets/123", "Round-robin 테스트\n상태: 열림")
                .with_ticket_links(3);
            let c = classifier().classify(&kind(), &obs);
            assert_eq!(c.outcome, Outcome::Indeterminate);
            assert_eq!(c.rule, "assignment.unmarked");
        }
    }

    mod other_kind_tests {
        use super::*;

        #[test]
        fn test_role_view() {
            let kind = StepKind::RoleView {
                title: "자동 할당 테스트".to_string(),
            };
            assert_eq!(
                classify(&kind, "http://app.test/tickets", "자동 할당 테스트 티켓"),
                Outcome::Success
            );
            assert_eq!(classify(&kind, "http://app.test/tickets", "티켓 없음"), Outcome::Failure);
            let empty = StepKind::RoleView { title: String::new() };
            assert_eq!(classify(&empty, "http://app.test/tickets", "anything"), Outcome::Failure);
        }

        #[test]
        fn test_logout_dashboard_check() {
            assert_eq!(
                classify(&StepKind::Logout, "http://app.test/login?callbackUrl=%2Fdashboard", ""),
                Outcome::Success
            );
            assert_eq!(
                classify(&StepKind::Logout, "http://app.test/dashboard", ""),
                Outcome::Failure
            );
        }

        #[test]
        fn test_user_provisioning() {
            let kind = StepKind::UserProvisioning {
                email: "agent1@example.com".to_string(),
            };
            assert_eq!(
                classify(&kind, "http://app.test/users", "agent1@example.com Agent"),
                Outcome::Success
            );
            assert_eq!(classify(&kind, "http://app.test/users", "이미 존재하는 사용자"), Outcome::Success);
            assert_eq!(classify(&kind, "http://app.test/users", "사용자 목록"), Outcome::Indeterminate);
        }

        #[test]
        fn test_user_listed_by_local_part() {
            let kind = StepKind::UserListed {
                email: "agent1@example.com".to_string(),
            };
            assert_eq!(
                classify(&kind, "http://app.test/users", "agent1 (Agent)"),
                Outcome::Success
            );
            assert_eq!(classify(&kind, "http://app.test/users", "no users"), Outcome::Failure);
        }
    }

    fn any_kind() -> impl Strategy<Value = StepKind> {
        prop_oneof![
            Just(StepKind::Registration),
            Just(StepKind::Login),
            Just(StepKind::TicketCreation),
            Just(StepKind::Logout),
            ".*".prop_map(|agent_name| StepKind::AssignmentCheck { agent_name }),
            ".*".prop_map(|title| StepKind::RoleView { title }),
            ".*".prop_map(|email| StepKind::UserProvisioning { email }),
            ".*".prop_map(|email| StepKind::UserListed { email }),
        ]
    }

    proptest! {
        #[test]
        fn prop_classification_is_total(
            kind in any_kind(),
            url in ".*",
            text in ".*",
            links in proptest::option::of(0usize..5),
        ) {
            let observation = Observation { url, text, ticket_links: links };
            let c = classifier().classify(&kind, &observation);
            prop_assert!(matches!(
                c.outcome,
                Outcome::Success | Outcome::Failure | Outcome::Indeterminate
            ));
            prop_assert!(!c.rule.is_empty());
        }

        #[test]
        fn prop_registration_idempotent_on_already_registered(
            url in ".*",
            prefix in ".*",
            suffix in ".*",
        ) {
            let text = format!("{prefix}이미 등록된{suffix}");
            prop_assert_eq!(classify(&StepKind::Registration, &url, &text), Outcome::Success);
        }
    }
}
