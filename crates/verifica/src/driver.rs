//! PageDriver - the Page Interaction Adapter
//!
//! Every interaction the verifier has with the application under test goes
//! through this trait: navigation, field fills, clicks, reading the URL and
//! visible text, screenshots, settle waits and cookie clearing.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageDriver (capability trait)                               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐       ┌──────────────────────────┐ │
//! │  │  ChromiumDriver      │       │  MockDriver              │ │
//! │  │  (feature "browser") │       │  (scripted pages, tests) │ │
//! │  │  CDP via chromiumoxide│      │                          │ │
//! │  └──────────────────────┘       └──────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations report a browser that can no longer be used as
//! [`VerificaError::DriverFault`]; every other error is recoverable and the
//! step executor turns it into a FAILURE outcome.

use crate::locator::Selector;
use crate::result::{VerificaError, VerificaResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Screenshot data captured from the page
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// When the screenshot was taken
    pub taken_at: SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            taken_at: SystemTime::now(),
        }
    }

    /// Get the size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if screenshot has data
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }
}

/// How to pick an `<option>` in a `<select>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    /// Pick by position (0 is usually the placeholder)
    Index(usize),
    /// Pick by `value` attribute
    Value(String),
}

impl std::fmt::Display for OptionChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "index={i}"),
            Self::Value(v) => write!(f, "value={v}"),
        }
    }
}

/// Capability interface over a browser page.
///
/// All calls are bounded by the implementation; none wait forever.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to an absolute URL
    async fn navigate(&mut self, url: &str) -> VerificaResult<()>;

    /// Replace the value of the first element matching `selector`
    async fn fill_field(&mut self, selector: &Selector, value: &str) -> VerificaResult<()>;

    /// Select an option in the first `<select>` matching `selector`
    async fn select_option(&mut self, selector: &Selector, choice: &OptionChoice)
        -> VerificaResult<()>;

    /// Click the first element matching `selector`
    async fn click(&mut self, selector: &Selector) -> VerificaResult<()>;

    /// Number of attached elements matching `selector`
    async fn count(&mut self, selector: &Selector) -> VerificaResult<usize>;

    /// Current page URL
    async fn current_url(&mut self) -> VerificaResult<String>;

    /// Rendered text of the document body
    async fn visible_text(&mut self) -> VerificaResult<String>;

    /// Capture a full-page screenshot
    async fn screenshot(&mut self) -> VerificaResult<Screenshot>;

    /// Wait until the page has had no network activity for a short quiet
    /// period, or fail with a timeout after `timeout`
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> VerificaResult<()>;

    /// Drop every cookie of the browser context
    async fn clear_cookies(&mut self) -> VerificaResult<()>;

    /// Close the page and release the browser
    async fn close(&mut self) -> VerificaResult<()>;
}

// ============================================================================
// MockDriver
// ============================================================================

/// A page as seen by [`MockDriver`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockPage {
    /// URL path (and query) the page reports
    pub url: String,
    /// Body text
    pub text: String,
    /// Selectors (in their `Display` form) that match on this page.
    /// A selector listed twice counts as two elements.
    pub elements: Vec<String>,
}

impl MockPage {
    /// Create an empty page at `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the body text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Add an element matching `selector`
    #[must_use]
    pub fn with_element(mut self, selector: impl ToString) -> Self {
        self.elements.push(selector.to_string());
        self
    }

    /// Add several elements
    #[must_use]
    pub fn with_elements<S: ToString>(mut self, selectors: impl IntoIterator<Item = S>) -> Self {
        self.elements
            .extend(selectors.into_iter().map(|s| s.to_string()));
        self
    }

    fn matches(&self, selector: &str) -> usize {
        self.elements.iter().filter(|e| e.as_str() == selector).count()
    }
}

/// Fault injected into a [`MockDriver`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Return a recoverable driver error
    Recoverable,
    /// Return a timeout
    Timeout,
    /// Return a fatal driver fault
    Fatal,
}

#[derive(Debug, Clone)]
struct ClickRule {
    path: String,
    selector: String,
    when_filled: Option<(String, String)>,
    page: MockPage,
}

/// Scripted driver for unit testing.
///
/// Pages are registered per path; clicks on a given page can move to another
/// page, optionally depending on what was typed into a field first. Every
/// call is recorded in `call_history`.
#[derive(Debug, Default)]
pub struct MockDriver {
    origin: String,
    routes: HashMap<String, MockPage>,
    click_rules: Vec<ClickRule>,
    current: MockPage,
    filled: HashMap<String, String>,
    faults: Vec<(String, MockFault)>,
    closed: bool,
    /// Call history for verification
    pub call_history: Vec<String>,
    /// Number of times cookies were cleared
    pub cookie_clears: usize,
}

impl MockDriver {
    /// Create a mock serving under `http://app.test`
    #[must_use]
    pub fn new() -> Self {
        Self::with_origin("http://app.test")
    }

    /// Create a mock serving under `origin`
    #[must_use]
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            current: MockPage::new("about:blank"),
            ..Self::default()
        }
    }

    /// Serve `page` when `path` is navigated to
    #[must_use]
    pub fn route(mut self, path: impl Into<String>, page: MockPage) -> Self {
        self.routes.insert(path.into(), page);
        self
    }

    /// Move to `page` when `selector` is clicked on the page at `path`
    #[must_use]
    pub fn on_click(
        mut self,
        path: impl Into<String>,
        selector: impl ToString,
        page: MockPage,
    ) -> Self {
        self.click_rules.push(ClickRule {
            path: path.into(),
            selector: selector.to_string(),
            when_filled: None,
            page,
        });
        self
    }

    /// Like [`MockDriver::on_click`] but only when `field` currently holds `value`
    #[must_use]
    pub fn on_click_when(
        mut self,
        path: impl Into<String>,
        selector: impl ToString,
        field: impl ToString,
        value: impl Into<String>,
        page: MockPage,
    ) -> Self {
        self.click_rules.push(ClickRule {
            path: path.into(),
            selector: selector.to_string(),
            when_filled: Some((field.to_string(), value.into())),
            page,
        });
        self
    }

    /// Fail every call whose history entry starts with `prefix`
    #[must_use]
    pub fn fail_on(mut self, prefix: impl Into<String>, fault: MockFault) -> Self {
        self.faults.push((prefix.into(), fault));
        self
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.call_history
    }

    /// Check if a call starting with `prefix` was made
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.call_history.iter().any(|c| c.starts_with(prefix))
    }

    /// Number of calls starting with `prefix`
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.call_history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Value last typed into `selector`
    #[must_use]
    pub fn filled_value(&self, selector: &str) -> Option<&str> {
        self.filled.get(selector).map(String::as_str)
    }

    /// Whether the driver was closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn record(&mut self, entry: String) -> VerificaResult<()> {
        if self.closed && !entry.starts_with("close") {
            self.call_history.push(entry);
            return Err(VerificaError::fault("browser already closed"));
        }
        let fault = self
            .faults
            .iter()
            .find(|(prefix, _)| entry.starts_with(prefix.as_str()))
            .map(|(_, fault)| *fault);
        self.call_history.push(entry.clone());
        match fault {
            None => Ok(()),
            Some(MockFault::Recoverable) => {
                Err(VerificaError::driver(format!("injected: {entry}")))
            }
            Some(MockFault::Timeout) => Err(VerificaError::timeout(entry, 0)),
            Some(MockFault::Fatal) => Err(VerificaError::fault(format!("injected: {entry}"))),
        }
    }

    fn path_of<'a>(&self, url: &'a str) -> &'a str {
        url.strip_prefix(self.origin.as_str()).unwrap_or(url)
    }

    fn require(&self, selector: &str) -> VerificaResult<()> {
        if self.current.matches(selector) == 0 {
            return Err(VerificaError::driver(format!(
                "no element matches {selector} on {}",
                self.current.url
            )));
        }
        Ok(())
    }

    fn current_path(&self) -> &str {
        self.current.url.split('?').next().unwrap_or_default()
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&mut self, url: &str) -> VerificaResult<()> {
        let path = self.path_of(url).to_string();
        self.record(format!("navigate:{path}"))?;
        let bare = path.split('?').next().unwrap_or_default();
        self.current = self
            .routes
            .get(&path)
            .or_else(|| self.routes.get(bare))
            .cloned()
            .unwrap_or_else(|| {
                MockPage::new(path.clone()).with_text("404 | This page could not be found.")
            });
        self.filled.clear();
        Ok(())
    }

    async fn fill_field(&mut self, selector: &Selector, value: &str) -> VerificaResult<()> {
        let key = selector.to_string();
        self.record(format!("fill:{key}={value}"))?;
        self.require(&key)?;
        self.filled.insert(key, value.to_string());
        Ok(())
    }

    async fn select_option(
        &mut self,
        selector: &Selector,
        choice: &OptionChoice,
    ) -> VerificaResult<()> {
        let key = selector.to_string();
        self.record(format!("select:{key}={choice}"))?;
        self.require(&key)?;
        self.filled.insert(key, choice.to_string());
        Ok(())
    }

    async fn click(&mut self, selector: &Selector) -> VerificaResult<()> {
        let key = selector.to_string();
        self.record(format!("click:{key}"))?;
        self.require(&key)?;
        let path = self.current_path().to_string();
        let next = self
            .click_rules
            .iter()
            .find(|rule| {
                rule.path == path
                    && rule.selector == key
                    && rule.when_filled.as_ref().map_or(true, |(field, value)| {
                        self.filled.get(field).is_some_and(|v| v == value)
                    })
            })
            .map(|rule| rule.page.clone());
        if let Some(page) = next {
            self.current = page;
            self.filled.clear();
        }
        Ok(())
    }

    async fn count(&mut self, selector: &Selector) -> VerificaResult<usize> {
        let key = selector.to_string();
        self.record(format!("count:{key}"))?;
        Ok(self.current.matches(&key))
    }

    async fn current_url(&mut self) -> VerificaResult<String> {
        self.record("url".to_string())?;
        Ok(format!("{}{}", self.origin, self.current.url))
    }

    async fn visible_text(&mut self) -> VerificaResult<String> {
        self.record("text".to_string())?;
        Ok(self.current.text.clone())
    }

    async fn screenshot(&mut self) -> VerificaResult<Screenshot> {
        self.record("screenshot".to_string())?;
        Ok(Screenshot::new(vec![0x89, 0x50, 0x4E, 0x47]))
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> VerificaResult<()> {
        self.record(format!("wait_idle:{}", timeout.as_millis()))
    }

    async fn clear_cookies(&mut self) -> VerificaResult<()> {
        self.record("clear_cookies".to_string())?;
        self.cookie_clears += 1;
        Ok(())
    }

    async fn close(&mut self) -> VerificaResult<()> {
        self.record("close".to_string())?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod screenshot_tests {
        use super::*;

        #[test]
        fn test_screenshot_size_bytes() {
            let screenshot = Screenshot::new(vec![0; 1024]);
            assert_eq!(screenshot.size_bytes(), 1024);
        }

        #[test]
        fn test_screenshot_is_valid() {
            assert!(Screenshot::new(vec![1, 2, 3]).is_valid());
            assert!(!Screenshot::new(vec![]).is_valid());
        }
    }

    mod mock_driver_tests {
        use super::*;

        fn login_app() -> MockDriver {
            MockDriver::new()
                .route(
                    "/login",
                    MockPage::new("/login")
                        .with_text("로그인")
                        .with_elements(["#email", "#password", r#"button[type="submit"]"#]),
                )
                .on_click_when(
                    "/login",
                    r#"button[type="submit"]"#,
                    "#email",
                    "a@test.com",
                    MockPage::new("/dashboard").with_text("환영합니다"),
                )
        }

        #[tokio::test]
        async fn test_navigate_serves_route() {
            let mut driver = login_app();
            driver.navigate("http://app.test/login").await.unwrap();
            assert_eq!(driver.current_url().await.unwrap(), "http://app.test/login");
            assert_eq!(driver.visible_text().await.unwrap(), "로그인");
            assert!(driver.was_called("navigate:/login"));
        }

        #[tokio::test]
        async fn test_unknown_route_is_404_page() {
            let mut driver = MockDriver::new();
            driver.navigate("http://app.test/nowhere").await.unwrap();
            assert!(driver.visible_text().await.unwrap().contains("404"));
        }

        #[tokio::test]
        async fn test_click_rule_depends_on_filled_value() {
            let mut driver = login_app();
            driver.navigate("http://app.test/login").await.unwrap();
            driver
                .fill_field(&Selector::css("#email"), "wrong@test.com")
                .await
                .unwrap();
            driver
                .click(&Selector::css(r#"button[type="submit"]"#))
                .await
                .unwrap();
            assert!(driver.current_url().await.unwrap().ends_with("/login"));

            driver
                .fill_field(&Selector::css("#email"), "a@test.com")
                .await
                .unwrap();
            driver
                .click(&Selector::css(r#"button[type="submit"]"#))
                .await
                .unwrap();
            assert!(driver.current_url().await.unwrap().ends_with("/dashboard"));
        }

        #[tokio::test]
        async fn test_fill_missing_element_errors() {
            let mut driver = login_app();
            driver.navigate("http://app.test/login").await.unwrap();
            let err = driver
                .fill_field(&Selector::css("#name"), "x")
                .await
                .unwrap_err();
            assert!(!err.is_fatal());
        }

        #[tokio::test]
        async fn test_count_occurrences() {
            let mut driver = MockDriver::new().route(
                "/tickets",
                MockPage::new("/tickets").with_elements(["a.ticket", "a.ticket"]),
            );
            driver.navigate("http://app.test/tickets").await.unwrap();
            assert_eq!(driver.count(&Selector::css("a.ticket")).await.unwrap(), 2);
            assert_eq!(driver.count(&Selector::css("a.other")).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_injected_faults() {
            let mut driver = MockDriver::new()
                .fail_on("navigate:/tickets/new", MockFault::Recoverable)
                .fail_on("screenshot", MockFault::Fatal);
            let err = driver
                .navigate("http://app.test/tickets/new")
                .await
                .unwrap_err();
            assert!(!err.is_fatal());
            assert!(driver.screenshot().await.unwrap_err().is_fatal());
        }

        #[tokio::test]
        async fn test_closed_driver_rejects_calls() {
            let mut driver = MockDriver::new();
            driver.close().await.unwrap();
            assert!(driver.is_closed());
            assert!(driver.current_url().await.unwrap_err().is_fatal());
        }

        #[tokio::test]
        async fn test_clear_cookies_counted() {
            let mut driver = MockDriver::new();
            driver.clear_cookies().await.unwrap();
            driver.clear_cookies().await.unwrap();
            assert_eq!(driver.cookie_clears, 2);
            assert_eq!(driver.call_count("clear_cookies"), 2);
        }
    }
}
