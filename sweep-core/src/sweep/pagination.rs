use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserResult, Driver, PollSpec, Poller};
use crate::config::SweepConfig;

/// Next click the navigator should make given the visible window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowStep {
    /// The target label is visible at this button index.
    Target(usize),
    /// Click this button to move the window towards the target.
    Shift(usize),
    /// No numeric button to act on.
    Stuck,
}

fn page_number(label: &str) -> Option<u32> {
    label.trim().parse().ok()
}

pub(crate) fn plan_step(labels: &[String], target: u32) -> WindowStep {
    let numeric: Vec<(usize, u32)> = labels
        .iter()
        .enumerate()
        .filter_map(|(index, label)| page_number(label).map(|page| (index, page)))
        .collect();
    if let Some((index, _)) = numeric.iter().find(|(_, page)| *page == target) {
        return WindowStep::Target(*index);
    }
    let Some(&(first_index, smallest)) = numeric.iter().min_by_key(|(_, page)| *page) else {
        return WindowStep::Stuck;
    };
    if target < smallest {
        return WindowStep::Shift(first_index);
    }
    // The last button shifts the window forward; filler there means the
    // nearest numeric button before it does the job.
    match numeric.last() {
        Some(&(index, _)) => WindowStep::Shift(index),
        None => WindowStep::Stuck,
    }
}

/// Drives a pagination widget that only shows a sliding window of page
/// buttons.
#[derive(Debug, Clone)]
pub struct PaginationNavigator {
    buttons: String,
    active: Option<String>,
    filler: Vec<String>,
    items: String,
    attempts: u32,
    max_window_shifts: u32,
    shift_settle: Duration,
    retry_pause: Duration,
    refresh: PollSpec,
}

impl PaginationNavigator {
    pub fn new(config: &SweepConfig) -> Self {
        let selectors = &config.selectors;
        let timing = &config.timing;
        Self {
            buttons: selectors.pagination_buttons.clone(),
            active: selectors.pagination_active.clone(),
            filler: selectors.pagination_filler.clone(),
            items: selectors.item_launch_buttons.clone(),
            attempts: config.policy.pagination_attempts.max(1),
            max_window_shifts: config.policy.max_window_shifts,
            shift_settle: timing.window_shift_settle(),
            retry_pause: timing.launch_retry_pause(),
            refresh: PollSpec::new(timing.page_settle(), timing.page_refresh_polls),
        }
    }

    /// Button labels currently rendered, filler included.
    pub async fn visible_labels(&self, driver: &mut dyn Driver) -> BrowserResult<Vec<String>> {
        driver.texts(&self.buttons).await
    }

    /// Page the widget marks as current, when it exposes one.
    pub async fn active_page(&self, driver: &mut dyn Driver) -> BrowserResult<Option<u32>> {
        let Some(selector) = &self.active else {
            return Ok(None);
        };
        Ok(driver
            .text_at(selector, 0)
            .await?
            .and_then(|label| page_number(&label)))
    }

    /// Highest page number visible in the widget; 1 when there is no widget.
    pub async fn last_visible_page(&self, driver: &mut dyn Driver) -> BrowserResult<u32> {
        let labels = self.visible_labels(driver).await?;
        Ok(labels
            .iter()
            .filter_map(|label| page_number(label))
            .max()
            .unwrap_or(1))
    }

    fn is_filler(&self, label: &str) -> bool {
        let label = label.trim();
        self.filler.iter().any(|filler| filler == label)
    }

    /// Brings the widget to `target`. Returns false once the retry budget is
    /// spent; never errors.
    pub async fn navigate_to(&self, driver: &mut dyn Driver, target: u32) -> bool {
        if target == 0 {
            warn!("page numbers start at 1");
            return false;
        }
        for attempt in 1..=self.attempts {
            match self.attempt(driver, target).await {
                Ok(true) => return true,
                Ok(false) => debug!(target, attempt, "page not reached"),
                Err(err) => warn!(target, attempt, error = %err, "pagination attempt failed"),
            }
            if attempt < self.attempts {
                sleep(self.retry_pause).await;
            }
        }
        warn!(target, attempts = self.attempts, "could not reach page");
        false
    }

    async fn attempt(&self, driver: &mut dyn Driver, target: u32) -> BrowserResult<bool> {
        if self.active_page(driver).await? == Some(target) {
            debug!(target, "already on page");
            return Ok(true);
        }
        let mut labels = self.visible_labels(driver).await?;
        if labels.is_empty() {
            // Single-page lists render no widget at all.
            return Ok(target == 1 && driver.count(&self.items).await? > 0);
        }
        let mut shifts = 0u32;
        loop {
            match plan_step(&labels, target) {
                WindowStep::Target(index) => {
                    self.press(driver, index).await?;
                    let reached = self.wait_for_refresh(driver, target).await?;
                    if reached {
                        info!(target, "page reached");
                    }
                    return Ok(reached);
                }
                WindowStep::Shift(index) => {
                    if shifts >= self.max_window_shifts {
                        debug!(target, shifts, "window shift budget spent");
                        return Ok(false);
                    }
                    shifts += 1;
                    debug!(
                        target,
                        clicked = %labels[index],
                        last_is_filler = labels.last().is_some_and(|label| self.is_filler(label)),
                        "shifting pagination window"
                    );
                    self.press(driver, index).await?;
                    sleep(self.shift_settle).await;
                    let next = self.visible_labels(driver).await?;
                    if next == labels {
                        debug!(target, "pagination window did not move");
                        return Ok(false);
                    }
                    labels = next;
                }
                WindowStep::Stuck => return Ok(false),
            }
        }
    }

    async fn press(&self, driver: &mut dyn Driver, index: usize) -> BrowserResult<()> {
        driver.scroll_into_view_at(&self.buttons, index).await?;
        driver.click_at(&self.buttons, index).await
    }

    async fn wait_for_refresh(&self, driver: &mut dyn Driver, target: u32) -> BrowserResult<bool> {
        let mut poller = Poller::new(self.refresh);
        while poller.next().await {
            let on_target = match self.active_page(driver).await? {
                Some(page) => page == target,
                None => true,
            };
            if on_target && driver.count(&self.items).await? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
