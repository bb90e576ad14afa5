//! Browser control over the Chrome `DevTools` Protocol.
//!
//! With the `browser` feature, [`ChromiumDriver`] drives a real Chromium
//! through chromiumoxide and implements [`PageDriver`]. Without it,
//! [`launch_driver`] reports a launch error so callers can fall back to
//! [`crate::driver::MockDriver`].
//!
//! Every page interaction is a small JavaScript expression built from a
//! [`Selector`]; the script builders are plain functions so they can be
//! checked without a browser.

use crate::config::RunConfig;
use crate::driver::{OptionChoice, PageDriver};
use crate::locator::Selector;
use crate::result::{VerificaError, VerificaResult};
use crate::wait::NETWORK_IDLE_THRESHOLD_MS;

/// Window property the click script stamps with `performance.now()`
pub const CLICK_MARKER: &str = "__verificaClickedAt";

/// Browser configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 900,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

impl From<&RunConfig> for BrowserConfig {
    fn from(config: &RunConfig) -> Self {
        let mut browser = Self::default().with_headless(config.headless);
        if let Some(path) = &config.chromium_path {
            browser = browser.with_chromium_path(path.clone());
        }
        if config.no_sandbox {
            browser = browser.with_no_sandbox();
        }
        browser
    }
}

fn js_string(value: &str) -> String {
    // a JSON string literal is a valid JS string literal
    serde_json::Value::from(value).to_string()
}

/// Script that sets a form control's value the way typing would, returning
/// `false` when nothing matches.
#[must_use]
pub fn fill_script(selector: &Selector, value: &str) -> String {
    format!(
        "(() => {{ const el = {query}; if (!el) return false; el.focus(); \
         const proto = Object.getPrototypeOf(el); \
         const desc = Object.getOwnPropertyDescriptor(proto, 'value'); \
         if (desc && desc.set) {{ desc.set.call(el, {value}); }} else {{ el.value = {value}; }} \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return true; }})()",
        query = selector.to_query(),
        value = js_string(value),
    )
}

/// Script that picks an option of a `<select>`, returning `false` when the
/// control or the option is missing.
#[must_use]
pub fn select_script(selector: &Selector, choice: &OptionChoice) -> String {
    let pick = match choice {
        OptionChoice::Index(i) => format!(
            "if (el.options.length <= {i}) return false; el.selectedIndex = {i};"
        ),
        OptionChoice::Value(v) => {
            let v = js_string(v);
            format!(
                "if (!Array.from(el.options).some(o => o.value === {v})) return false; \
                 el.value = {v};"
            )
        }
    };
    format!(
        "(() => {{ const el = {query}; if (!el || !el.options) return false; {pick} \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
        query = selector.to_query(),
    )
}

/// Script that clicks the first match, returning `false` when nothing matches.
///
/// The click time is stamped on `window` so the idle check can tell that the
/// old document is still showing.
#[must_use]
pub fn click_script(selector: &Selector) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return false; \
         window.{CLICK_MARKER} = performance.now(); el.click(); return true; }})()",
        selector.to_query()
    )
}

/// Rendered text of the page body
pub const TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Script answering whether the page has loaded and no resource finished
/// within the idle threshold.
///
/// Right after a click the old document stays "idle" until the navigation
/// starts, so a document carrying a fresh click stamp is never idle.
#[must_use]
pub fn network_idle_script() -> String {
    format!(
        "(() => {{ if (document.readyState !== 'complete') return false; \
         const clicked = window.{CLICK_MARKER}; \
         if (clicked !== undefined && performance.now() - clicked < {NETWORK_IDLE_THRESHOLD_MS}) \
         return false; \
         const ends = performance.getEntriesByType('resource').map(e => e.responseEnd); \
         const last = ends.length ? Math.max(...ends) : 0; \
         return performance.now() - last >= {NETWORK_IDLE_THRESHOLD_MS}; }})()"
    )
}

fn missing(selector: &Selector) -> VerificaError {
    VerificaError::driver(format!("no element matches {selector}"))
}

/// Launch a browser-backed driver.
///
/// # Errors
///
/// Returns [`VerificaError::BrowserLaunch`] if the browser cannot be started
/// or the crate was built without the `browser` feature.
#[cfg(feature = "browser")]
pub async fn launch_driver(config: BrowserConfig) -> VerificaResult<Box<dyn PageDriver>> {
    Ok(Box::new(ChromiumDriver::launch(config).await?))
}

/// Launch a browser-backed driver.
///
/// # Errors
///
/// Always fails: this build has no browser support.
#[cfg(not(feature = "browser"))]
#[allow(clippy::unused_async)]
pub async fn launch_driver(config: BrowserConfig) -> VerificaResult<Box<dyn PageDriver>> {
    let _ = config;
    Err(VerificaError::BrowserLaunch {
        message: "built without the `browser` feature".to_string(),
    })
}

#[cfg(feature = "browser")]
pub use cdp::ChromiumDriver;

#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::significant_drop_tightening)]
mod cdp {
    use super::{
        click_script, fill_script, missing, network_idle_script, select_script, BrowserConfig,
        TEXT_SCRIPT,
    };
    use crate::driver::{OptionChoice, PageDriver, Screenshot};
    use crate::locator::Selector;
    use crate::result::{VerificaError, VerificaResult};
    use crate::wait::{poll_until, DEFAULT_POLL_INTERVAL_MS};
    use async_trait::async_trait;
    use base64::Engine;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
    use chromiumoxide::cdp::browser_protocol::page::{
        CaptureScreenshotFormat, CaptureScreenshotParams,
    };
    use chromiumoxide::error::CdpError;
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use serde::de::DeserializeOwned;
    use std::time::Duration;
    use tracing::{debug, warn};

    fn map_cdp(e: CdpError) -> VerificaError {
        match e {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                VerificaError::fault(e.to_string())
            }
            other => VerificaError::driver(other.to_string()),
        }
    }

    /// [`PageDriver`] over a single Chromium tab
    #[derive(Debug)]
    pub struct ChromiumDriver {
        browser: CdpBrowser,
        page: CdpPage,
        handle: tokio::task::JoinHandle<()>,
        closed: bool,
    }

    impl ChromiumDriver {
        /// Launch Chromium and open a blank tab
        pub async fn launch(config: BrowserConfig) -> VerificaResult<Self> {
            let launch_err = |message: String| VerificaError::BrowserLaunch { message };

            let mut builder = CdpConfig::builder()
                .window_size(config.viewport_width, config.viewport_height);
            if !config.headless {
                builder = builder.with_head();
            }
            if !config.sandbox {
                builder = builder.no_sandbox();
            }
            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }
            let cdp_config = builder.build().map_err(launch_err)?;

            let (browser, mut handler) = CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| launch_err(e.to_string()))?;

            let handle = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| launch_err(e.to_string()))?;
            debug!(headless = config.headless, "chromium launched");

            Ok(Self {
                browser,
                page,
                handle,
                closed: false,
            })
        }

        fn live(&self) -> VerificaResult<&CdpPage> {
            if self.closed {
                return Err(VerificaError::fault("browser already closed"));
            }
            Ok(&self.page)
        }
    }

    async fn eval<T: DeserializeOwned>(page: &CdpPage, expr: &str) -> VerificaResult<T> {
        let result = page.evaluate(expr).await.map_err(map_cdp)?;
        result
            .into_value()
            .map_err(|e| VerificaError::driver(format!("unexpected script result: {e}")))
    }

    #[async_trait]
    impl PageDriver for ChromiumDriver {
        async fn navigate(&mut self, url: &str) -> VerificaResult<()> {
            self.live()?.goto(url).await.map_err(map_cdp)?;
            Ok(())
        }

        async fn fill_field(&mut self, selector: &Selector, value: &str) -> VerificaResult<()> {
            if eval::<bool>(self.live()?, &fill_script(selector, value)).await? {
                Ok(())
            } else {
                Err(missing(selector))
            }
        }

        async fn select_option(
            &mut self,
            selector: &Selector,
            choice: &OptionChoice,
        ) -> VerificaResult<()> {
            if eval::<bool>(self.live()?, &select_script(selector, choice)).await? {
                Ok(())
            } else {
                Err(VerificaError::driver(format!(
                    "cannot select {choice} in {selector}"
                )))
            }
        }

        async fn click(&mut self, selector: &Selector) -> VerificaResult<()> {
            if eval::<bool>(self.live()?, &click_script(selector)).await? {
                Ok(())
            } else {
                Err(missing(selector))
            }
        }

        async fn count(&mut self, selector: &Selector) -> VerificaResult<usize> {
            eval(self.live()?, &selector.to_count_query()).await
        }

        async fn current_url(&mut self) -> VerificaResult<String> {
            let url = self.live()?.url().await.map_err(map_cdp)?;
            Ok(url.unwrap_or_else(|| "about:blank".to_string()))
        }

        async fn visible_text(&mut self) -> VerificaResult<String> {
            eval(self.live()?, TEXT_SCRIPT).await
        }

        async fn screenshot(&mut self) -> VerificaResult<Screenshot> {
            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            let shot = self.live()?.execute(params).await.map_err(map_cdp)?;
            let data = base64::engine::general_purpose::STANDARD
                .decode(&shot.data)
                .map_err(|e| VerificaError::Screenshot {
                    message: e.to_string(),
                })?;
            Ok(Screenshot::new(data))
        }

        async fn wait_for_network_idle(&mut self, timeout: Duration) -> VerificaResult<()> {
            let script = network_idle_script();
            let script = script.as_str();
            let page = self.live()?;
            poll_until(
                "network idle",
                timeout,
                Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                move || eval::<bool>(page, script),
            )
            .await
        }

        async fn clear_cookies(&mut self) -> VerificaResult<()> {
            self.live()?
                .execute(ClearBrowserCookiesParams::default())
                .await
                .map_err(map_cdp)?;
            Ok(())
        }

        async fn close(&mut self) -> VerificaResult<()> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            let result = self.browser.close().await;
            if let Err(e) = self.browser.wait().await {
                warn!(error = %e, "chromium did not exit cleanly");
            }
            self.handle.abort();
            result.map(|_| ()).map_err(map_cdp)
        }
    }

    impl Drop for ChromiumDriver {
        fn drop(&mut self) {
            if !self.closed {
                self.handle.abort();
            }
        }
    }
}
