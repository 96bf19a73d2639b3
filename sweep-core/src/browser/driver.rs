use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::error::BrowserResult;

/// Page readiness required before a navigation counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCondition {
    DomContentLoaded,
    Load,
}

impl LoadCondition {
    pub fn accepts(&self, ready_state: &str) -> bool {
        match self {
            LoadCondition::DomContentLoaded => {
                matches!(ready_state, "interactive" | "complete")
            }
            LoadCondition::Load => ready_state == "complete",
        }
    }
}

/// Capabilities the sweep needs from a remote UI.
///
/// Elements are addressed by `(selector, index)` and resolved again on every
/// call; nothing holds element handles across navigations. Selectors that
/// start with `/` or `(` are XPath, anything else is CSS.
#[async_trait(?Send)]
pub trait Driver {
    async fn count(&mut self, selector: &str) -> BrowserResult<usize>;

    /// Trimmed text content of every match, in document order.
    async fn texts(&mut self, selector: &str) -> BrowserResult<Vec<String>>;

    async fn text_at(&mut self, selector: &str, index: usize) -> BrowserResult<Option<String>>;

    /// Whether the first match exists and is rendered with a non-empty box.
    async fn is_visible(&mut self, selector: &str) -> BrowserResult<bool>;

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    async fn click_at(&mut self, selector: &str, index: usize) -> BrowserResult<()>;

    async fn hover_at(&mut self, selector: &str, index: usize) -> BrowserResult<()>;

    async fn scroll_into_view_at(&mut self, selector: &str, index: usize) -> BrowserResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<()>;

    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value>;

    async fn clear_cookies(&mut self) -> BrowserResult<()>;

    async fn goto(
        &mut self,
        url: &str,
        condition: LoadCondition,
        timeout: Duration,
    ) -> BrowserResult<()>;

    async fn go_back(&mut self) -> BrowserResult<()>;

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> BrowserResult<()>;

    /// Tears down every surface owned by this driver.
    async fn close(&mut self) -> BrowserResult<()>;

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        self.click_at(selector, 0).await
    }

    /// Waits for `selector` and clicks it.
    async fn wait_and_click(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.wait_for(selector, timeout).await?;
        self.click_at(selector, 0).await
    }
}

/// Creates the driver behind a brand-new browsing session.
#[async_trait(?Send)]
pub trait SessionFactory {
    async fn create(&self) -> BrowserResult<Box<dyn Driver>>;
}
