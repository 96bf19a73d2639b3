use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserResult, Driver};
use crate::config::SweepConfig;

use super::error::{SweepError, SweepResult};
use super::pagination::PaginationNavigator;

/// Clicks through the site chrome to the provider list, selects providers
/// and launches items on the current page.
#[derive(Debug, Clone)]
pub struct CatalogNavigator {
    entry: Vec<String>,
    providers: String,
    launch_buttons: String,
    names: String,
    launch_attempts: u32,
    step_timeout: Duration,
    launch_visible_timeout: Duration,
    launch_retry_pause: Duration,
    pre_click_pause: Duration,
    provider_settle: Duration,
    retry_hover_pause: Duration,
}

impl CatalogNavigator {
    pub fn new(config: &SweepConfig) -> Self {
        let selectors = &config.selectors;
        let timing = &config.timing;
        Self {
            entry: selectors.catalog_entry.clone(),
            providers: selectors.provider_buttons.clone(),
            launch_buttons: selectors.item_launch_buttons.clone(),
            names: selectors.item_names.clone(),
            launch_attempts: config.policy.launch_attempts.max(1),
            step_timeout: timing.login_step_timeout(),
            launch_visible_timeout: timing.launch_visible_timeout(),
            launch_retry_pause: timing.launch_retry_pause(),
            pre_click_pause: timing.pre_click_pause(),
            provider_settle: timing.provider_settle(),
            retry_hover_pause: timing.retry_hover_pause(),
        }
    }

    pub async fn open_catalog(&self, driver: &mut dyn Driver) -> BrowserResult<()> {
        for selector in &self.entry {
            debug!(selector, "opening catalog");
            driver.wait_and_click(selector, self.step_timeout).await?;
        }
        driver.wait_for(&self.providers, self.step_timeout).await
    }

    pub async fn provider_names(&self, driver: &mut dyn Driver) -> BrowserResult<Vec<String>> {
        driver.texts(&self.providers).await
    }

    /// Clicks the provider whose trimmed label equals `name`.
    pub async fn select_provider(&self, driver: &mut dyn Driver, name: &str) -> SweepResult<()> {
        let labels = self.provider_names(driver).await?;
        let Some(index) = labels.iter().position(|label| label.trim() == name.trim()) else {
            warn!(provider = name, available = labels.len(), "provider not listed");
            return Err(SweepError::ProviderNotFound(name.to_string()));
        };
        driver.scroll_into_view_at(&self.providers, index).await?;
        sleep(self.provider_settle).await;
        driver.click_at(&self.providers, index).await?;
        info!(provider = name, "provider selected");
        Ok(())
    }

    pub async fn item_count(&self, driver: &mut dyn Driver) -> BrowserResult<usize> {
        driver.count(&self.launch_buttons).await
    }

    /// Display name of the item at `index`, or a positional placeholder.
    pub async fn item_name(&self, driver: &mut dyn Driver, index: usize) -> String {
        match driver.text_at(&self.names, index).await {
            Ok(Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
            Ok(_) => format!("item-{index}"),
            Err(err) => {
                debug!(index, error = %err, "item name unavailable");
                format!("item-{index}")
            }
        }
    }

    /// First launch of an item. The last error is returned once every
    /// attempt is spent.
    pub async fn launch_item(&self, driver: &mut dyn Driver, index: usize) -> BrowserResult<()> {
        let mut last_error = None;
        for attempt in 1..=self.launch_attempts {
            match self.try_launch(driver, index).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(index, attempt, error = %err, "launch attempt failed");
                    last_error = Some(err);
                }
            }
            if attempt < self.launch_attempts {
                sleep(self.launch_retry_pause).await;
            }
        }
        Err(last_error.unwrap_or_else(|| {
            BrowserError::Unexpected(format!("item #{index} was never launched"))
        }))
    }

    async fn try_launch(&self, driver: &mut dyn Driver, index: usize) -> BrowserResult<()> {
        driver.wait_for(&self.launch_buttons, self.launch_visible_timeout).await?;
        driver.scroll_into_view_at(&self.launch_buttons, index).await?;
        sleep(self.pre_click_pause).await;
        driver.click_at(&self.launch_buttons, index).await
    }

    /// The single relaunch recovery gets: locate by index, hover, click once.
    pub async fn relaunch_item(&self, driver: &mut dyn Driver, index: usize) -> SweepResult<()> {
        let count = self.item_count(driver).await?;
        if index >= count {
            return Err(SweepError::ItemMissing { index, count });
        }
        driver.scroll_into_view_at(&self.launch_buttons, index).await?;
        driver.hover_at(&self.launch_buttons, index).await?;
        sleep(self.retry_hover_pause).await;
        driver.click_at(&self.launch_buttons, index).await?;
        Ok(())
    }
}

/// Brings a fresh or freshly reset page back to a provider page.
#[async_trait(?Send)]
pub trait Renavigate {
    async fn renavigate(&self, driver: &mut dyn Driver, provider: &str, page: u32) -> SweepResult<()>;
}

/// Catalog selection followed by pagination.
#[derive(Debug, Clone)]
pub struct CatalogRoute {
    catalog: CatalogNavigator,
    pagination: PaginationNavigator,
}

impl CatalogRoute {
    pub fn new(catalog: CatalogNavigator, pagination: PaginationNavigator) -> Self {
        Self {
            catalog,
            pagination,
        }
    }
}

#[async_trait(?Send)]
impl Renavigate for CatalogRoute {
    async fn renavigate(&self, driver: &mut dyn Driver, provider: &str, page: u32) -> SweepResult<()> {
        self.catalog.open_catalog(driver).await?;
        self.catalog.select_provider(driver, provider).await?;
        if page > 1 && !self.pagination.navigate_to(driver, page).await {
            return Err(SweepError::NavigationExhausted { page });
        }
        Ok(())
    }
}
