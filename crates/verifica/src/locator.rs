//! Locator Resolution Strategy.
//!
//! The application's markup is not controlled by the verifier and uses
//! different attribute conventions across deployments (`id` vs `name` vs
//! `type`). A logical UI target is therefore described by an ordered list of
//! selector candidates, and resolution binds to the first candidate that
//! matches at least one attached element. No scoring: order is the only
//! tie-breaker.

use crate::driver::PageDriver;
use crate::result::{VerificaError, VerificaResult};
use std::fmt;
use tracing::debug;

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// CSS selector (e.g., `button[type="submit"]`)
    Css(String),
    /// Any element whose text content includes the string
    Text(String),
    /// Test ID selector (`data-testid` attribute)
    TestId(String),
    /// CSS selector filtered by text content
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a CSS selector filtered by text
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// JavaScript expression evaluating to the first matching element (or null)
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelector({s:?})"),
            Self::Text(t) => {
                format!(
                    "Array.from(document.querySelectorAll('body *')) \
                     .filter(el => el.children.length === 0) \
                     .find(el => el.textContent.includes({t:?}))"
                )
            }
            Self::TestId(id) => format!("document.querySelector('[data-testid={id:?}]')"),
            Self::CssWithText { css, text } => {
                format!(
                    "Array.from(document.querySelectorAll({css:?})) \
                     .find(el => el.textContent.includes({text:?}))"
                )
            }
        }
    }

    /// JavaScript expression evaluating to the number of matching elements
    #[must_use]
    pub fn to_count_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelectorAll({s:?}).length"),
            Self::Text(t) => {
                format!(
                    "Array.from(document.querySelectorAll('body *')) \
                     .filter(el => el.children.length === 0 && el.textContent.includes({t:?})) \
                     .length"
                )
            }
            Self::TestId(id) => format!("document.querySelectorAll('[data-testid={id:?}]').length"),
            Self::CssWithText { css, text } => {
                format!(
                    "Array.from(document.querySelectorAll({css:?})) \
                     .filter(el => el.textContent.includes({text:?})).length"
                )
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "{s}"),
            Self::Text(t) => write!(f, "text={t}"),
            Self::TestId(id) => write!(f, "[data-testid=\"{id}\"]"),
            Self::CssWithText { css, text } => write!(f, "{css}:has-text(\"{text}\")"),
        }
    }
}

/// Ordered selector strategies for one logical UI target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorCandidate {
    /// Logical target name, used in diagnostics
    pub target: String,
    /// Candidates, tried left to right
    pub candidates: Vec<Selector>,
}

impl LocatorCandidate {
    /// Create a candidate list for `target`
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            candidates: Vec::new(),
        }
    }

    /// Append a candidate
    #[must_use]
    pub fn or(mut self, selector: Selector) -> Self {
        self.candidates.push(selector);
        self
    }

    /// Append a CSS candidate
    #[must_use]
    pub fn or_css(self, css: impl Into<String>) -> Self {
        self.or(Selector::css(css))
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether there are no candidates
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Outcome of resolving a [`LocatorCandidate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A candidate matched
    Located {
        /// The winning selector
        selector: Selector,
        /// Position of the winner in the candidate list
        index: usize,
        /// Number of elements the winner matched
        matches: usize,
    },
    /// Nothing matched
    NotFound {
        /// Every candidate that was tried, in order
        attempted: Vec<String>,
    },
}

impl Resolution {
    /// The winning selector, if any
    #[must_use]
    pub const fn selector(&self) -> Option<&Selector> {
        match self {
            Self::Located { selector, .. } => Some(selector),
            Self::NotFound { .. } => None,
        }
    }

    /// Whether a candidate matched
    #[must_use]
    pub const fn is_located(&self) -> bool {
        matches!(self, Self::Located { .. })
    }
}

/// Try each candidate in order and bind to the first that matches at least
/// one attached element.
///
/// # Errors
///
/// Only driver errors are returned; "no match" is [`Resolution::NotFound`].
pub async fn resolve<D: PageDriver + ?Sized>(
    driver: &mut D,
    locator: &LocatorCandidate,
) -> VerificaResult<Resolution> {
    let mut attempted = Vec::with_capacity(locator.len());
    for (index, selector) in locator.candidates.iter().enumerate() {
        let matches = driver.count(selector).await?;
        debug!(target_name = %locator.target, %selector, matches, "locator candidate");
        if matches > 0 {
            return Ok(Resolution::Located {
                selector: selector.clone(),
                index,
                matches,
            });
        }
        attempted.push(selector.to_string());
    }
    Ok(Resolution::NotFound { attempted })
}

/// Like [`resolve`] but a missing target is an error.
///
/// # Errors
///
/// Returns [`VerificaError::LocatorNotFound`] when no candidate matches.
pub async fn require<D: PageDriver + ?Sized>(
    driver: &mut D,
    locator: &LocatorCandidate,
) -> VerificaResult<Selector> {
    match resolve(driver, locator).await? {
        Resolution::Located { selector, .. } => Ok(selector),
        Resolution::NotFound { attempted } => Err(VerificaError::LocatorNotFound {
            target: locator.target.clone(),
            attempted,
        }),
    }
}

/// Candidate lists for the UI targets the scenarios touch.
pub mod targets {
    use super::{LocatorCandidate, Selector};

    /// Name field on registration and user forms
    #[must_use]
    pub fn name_field() -> LocatorCandidate {
        LocatorCandidate::new("name field")
            .or_css("#name")
            .or_css(r#"input[name="name"]"#)
            .or_css(r#"input[placeholder*="이름"]"#)
    }

    /// Email field
    #[must_use]
    pub fn email_field() -> LocatorCandidate {
        LocatorCandidate::new("email field")
            .or_css("#email")
            .or_css(r#"input[name="email"]"#)
            .or_css(r#"input[type="email"]"#)
    }

    /// Password field
    #[must_use]
    pub fn password_field() -> LocatorCandidate {
        LocatorCandidate::new("password field")
            .or_css("#password")
            .or_css(r#"input[name="password"]"#)
            .or_css(r#"input[type="password"]"#)
    }

    /// Password confirmation on the registration form
    #[must_use]
    pub fn confirm_password_field() -> LocatorCandidate {
        LocatorCandidate::new("confirm password field")
            .or_css("#confirmPassword")
            .or_css(r#"input[name="confirmPassword"]"#)
    }

    /// Form submit button
    #[must_use]
    pub fn submit_button() -> LocatorCandidate {
        LocatorCandidate::new("submit button")
            .or_css(r#"button[type="submit"]"#)
            .or_css(r#"input[type="submit"]"#)
    }

    /// Ticket title input
    #[must_use]
    pub fn title_field() -> LocatorCandidate {
        LocatorCandidate::new("ticket title field")
            .or_css(r#"input[name="title"]"#)
            .or_css("#title")
    }

    /// Ticket body textarea
    #[must_use]
    pub fn content_field() -> LocatorCandidate {
        LocatorCandidate::new("ticket content field")
            .or_css(r#"textarea[name="content"]"#)
            .or_css(r#"textarea[name="description"]"#)
            .or_css("textarea")
    }

    /// Category selector on the ticket form
    #[must_use]
    pub fn category_select() -> LocatorCandidate {
        LocatorCandidate::new("category selector")
            .or_css(r#"select[name="categoryId"]"#)
            .or_css(r#"select[name="category"]"#)
            .or_css(r#"[name="categoryId"]"#)
    }

    /// Priority selector on the ticket form
    #[must_use]
    pub fn priority_select() -> LocatorCandidate {
        LocatorCandidate::new("priority selector")
            .or_css(r#"select[name="priority"]"#)
            .or_css(r#"[name="priority"]"#)
    }

    /// Links to individual tickets (the "new ticket" link excluded)
    #[must_use]
    pub fn ticket_link() -> LocatorCandidate {
        LocatorCandidate::new("ticket link")
            .or_css(r#"a[href^="/tickets/"]:not([href="/tickets/new"])"#)
    }

    /// Logout control in the header / user menu
    #[must_use]
    pub fn logout_button() -> LocatorCandidate {
        LocatorCandidate::new("logout button")
            .or(Selector::css_with_text("button", "로그아웃"))
            .or(Selector::css_with_text("a", "로그아웃"))
            .or(Selector::test_id("logout"))
            .or(Selector::text("로그아웃"))
    }

    /// Confirmation button on the auth sign-out page
    #[must_use]
    pub fn signout_confirm() -> LocatorCandidate {
        LocatorCandidate::new("sign-out confirmation")
            .or(Selector::css_with_text("button", "Sign out"))
            .or_css("form button")
    }

    /// Button opening the create-user form on the users page
    #[must_use]
    pub fn create_user_button() -> LocatorCandidate {
        LocatorCandidate::new("create user button")
            .or(Selector::css_with_text("button", "새 사용자"))
            .or(Selector::css_with_text("button", "사용자 추가"))
            .or(Selector::css_with_text("button", "추가"))
            .or(Selector::css_with_text("a", "새 사용자"))
            .or(Selector::test_id("create-user"))
    }

    /// Role selector on the create-user form
    #[must_use]
    pub fn role_select() -> LocatorCandidate {
        LocatorCandidate::new("role selector")
            .or_css(r#"select[name="role"]"#)
            .or_css("#role")
    }
}
