use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChromiumSection;

use super::driver::{Driver, LoadCondition, SessionFactory};
use super::error::{BrowserError, BrowserResult};
use super::poll::{PollSpec, Poller};

const WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves a selector to an array of nodes. XPath when the selector starts
/// with `/` or `(`, CSS otherwise.
const RESOLVE_NODES: &str = r#"
const __resolve = (selector) => {
    if (selector.startsWith('/') || selector.startsWith('(')) {
        const snapshot = document.evaluate(
            selector, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const nodes = [];
        for (let i = 0; i < snapshot.snapshotLength; i++) {
            nodes.push(snapshot.snapshotItem(i));
        }
        return nodes;
    }
    return Array.from(document.querySelectorAll(selector));
};
"#;

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Arc<ChromiumSection>,
}

impl ChromiumLauncher {
    pub fn new(config: ChromiumSection) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn with_headless(self, headless: bool) -> Self {
        let mut config = (*self.config).clone();
        config.headless = headless;
        Self::new(config)
    }

    pub fn config(&self) -> &ChromiumSection {
        &self.config
    }

    pub async fn launch(&self) -> BrowserResult<ChromiumDriver> {
        let profile = tempfile::Builder::new()
            .prefix("sweep-profile-")
            .tempdir()?;
        let chromium_config = self.build_chromium_config(profile.path())?;
        info!(
            profile = %profile.path().display(),
            width = self.config.window_size[0],
            height = self.config.window_size[1],
            headless = self.config.headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let page = browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;

        Ok(ChromiumDriver {
            browser,
            page,
            handler_task: Some(handler_task),
            profile: Some(profile),
        })
    }

    fn build_chromium_config(&self, profile_dir: &Path) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.window_size;
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(profile_dir)
            .window_size(width, height)
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });

        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec!["--no-first-run".to_string(), "--password-store=basic".to_string()];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        args.extend(self.config.extra_args.iter().cloned());
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

/// `Driver` over one Chromium process and its single page.
#[derive(Debug)]
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    profile: Option<TempDir>,
}

impl ChromiumDriver {
    /// The page, as long as `close` has not run.
    fn page(&self) -> BrowserResult<&Page> {
        if self.handler_task.is_some() {
            Ok(&self.page)
        } else {
            Err(BrowserError::SessionClosed)
        }
    }

    async fn eval_json<T: DeserializeOwned>(&self, script: &str) -> BrowserResult<T> {
        let result = self.page()?.evaluate(script).await?;
        let value = result.value().cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|err| BrowserError::Script(err.to_string()))
    }

    /// Runs `body` with `nodes` bound to the resolved selector.
    async fn with_nodes<T: DeserializeOwned>(&self, selector: &str, body: &str) -> BrowserResult<T> {
        let selector_literal = serde_json::to_string(selector)
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        let script = format!(
            "(() => {{ {RESOLVE_NODES} const nodes = __resolve({selector_literal}); {body} }})()"
        );
        self.eval_json(&script).await
    }

    /// Runs `body` with `node` bound to the match at `index`; a missing node
    /// becomes `ElementNotFound`.
    async fn on_node(&self, selector: &str, index: usize, body: &str) -> BrowserResult<()> {
        let found: bool = self
            .with_nodes(
                selector,
                &format!("const node = nodes[{index}]; if (!node) {{ return false; }} {body} return true;"),
            )
            .await?;
        if found {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
                index,
            })
        }
    }

    async fn ready_state(&self) -> BrowserResult<String> {
        self.eval_json("document.readyState").await
    }
}

#[async_trait(?Send)]
impl Driver for ChromiumDriver {
    async fn count(&mut self, selector: &str) -> BrowserResult<usize> {
        self.with_nodes(selector, "return nodes.length;").await
    }

    async fn texts(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        self.with_nodes(selector, "return nodes.map((n) => (n.textContent || '').trim());")
            .await
    }

    async fn text_at(&mut self, selector: &str, index: usize) -> BrowserResult<Option<String>> {
        self.with_nodes(
            selector,
            &format!(
                "const node = nodes[{index}]; return node ? (node.textContent || '').trim() : null;"
            ),
        )
        .await
    }

    async fn is_visible(&mut self, selector: &str) -> BrowserResult<bool> {
        self.with_nodes(
            selector,
            r#"
const node = nodes[0];
if (!node) { return false; }
const element = node instanceof Element ? node : node.parentElement;
if (!element) { return false; }
const rect = element.getBoundingClientRect();
const style = window.getComputedStyle(element);
return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
"#,
        )
        .await
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let mut poller = Poller::new(PollSpec::covering(timeout, WAIT_INTERVAL));
        while poller.next().await {
            match self.is_visible(selector).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(err) => debug!(selector, error = %err, "visibility probe failed"),
            }
        }
        Err(BrowserError::Timeout(selector.to_string()))
    }

    async fn click_at(&mut self, selector: &str, index: usize) -> BrowserResult<()> {
        debug!(selector, index, "click");
        self.on_node(
            selector,
            index,
            r#"
if (typeof node.click === 'function') {
    node.click();
} else {
    node.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window }));
}
"#,
        )
        .await
    }

    async fn hover_at(&mut self, selector: &str, index: usize) -> BrowserResult<()> {
        self.on_node(
            selector,
            index,
            r#"
for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
    node.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window }));
}
"#,
        )
        .await
    }

    async fn scroll_into_view_at(&mut self, selector: &str, index: usize) -> BrowserResult<()> {
        self.on_node(
            selector,
            index,
            "node.scrollIntoView({ block: 'center', inline: 'nearest' });",
        )
        .await
    }

    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<()> {
        let value_literal =
            serde_json::to_string(value).map_err(|err| BrowserError::Script(err.to_string()))?;
        self.on_node(
            selector,
            0,
            &format!(
                r#"
node.focus();
const proto = node instanceof HTMLTextAreaElement
    ? HTMLTextAreaElement.prototype
    : HTMLInputElement.prototype;
Object.getOwnPropertyDescriptor(proto, 'value').set.call(node, {value_literal});
node.dispatchEvent(new Event('input', {{ bubbles: true }}));
node.dispatchEvent(new Event('change', {{ bubbles: true }}));
"#
            ),
        )
        .await
    }

    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value> {
        self.eval_json(script).await
    }

    async fn clear_cookies(&mut self) -> BrowserResult<()> {
        self.page()?.execute(ClearBrowserCookiesParams::default()).await?;
        Ok(())
    }

    async fn goto(
        &mut self,
        url: &str,
        condition: LoadCondition,
        timeout: Duration,
    ) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        match tokio::time::timeout(timeout, self.page()?.goto(params)).await {
            Ok(result) => {
                result?;
            }
            Err(_) => return Err(BrowserError::Timeout(format!("navigation to {url}"))),
        }
        let mut poller = Poller::new(PollSpec::covering(timeout, WAIT_INTERVAL));
        while poller.next().await {
            if condition.accepts(&self.ready_state().await?) {
                return Ok(());
            }
        }
        Err(BrowserError::Timeout(format!("{condition:?} on {url}")))
    }

    async fn go_back(&mut self) -> BrowserResult<()> {
        let _: Value = self.eval_json("(() => { history.back(); return true; })()").await?;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> BrowserResult<()> {
        let params = ScreenshotParams::builder().full_page(full_page).build();
        let bytes = self.page()?.screenshot(params).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        info!("Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        self.profile.take();
        Ok(())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("ChromiumDriver dropped without explicit close");
            }
        }
    }
}

/// Launches a fresh Chromium process for every new session.
#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    launcher: ChromiumLauncher,
}

impl ChromiumSessionFactory {
    pub fn new(launcher: ChromiumLauncher) -> Self {
        Self { launcher }
    }
}

#[async_trait(?Send)]
impl SessionFactory for ChromiumSessionFactory {
    async fn create(&self) -> BrowserResult<Box<dyn Driver>> {
        let driver = self.launcher.launch().await?;
        Ok(Box::new(driver))
    }
}
