use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{DiagnosticLabel, DiagnosticReason, DiagnosticSink, Driver, PollSpec, Poller};
use crate::config::SweepConfig;

use super::model::{ItemKey, Verdict};

/// The launched item as the classifier sees it.
#[derive(Debug, Clone, Copy)]
pub struct ItemHandle<'a> {
    pub key: &'a ItemKey,
    pub name: &'a str,
}

impl<'a> ItemHandle<'a> {
    fn label(&self) -> DiagnosticLabel<'a> {
        DiagnosticLabel {
            provider: &self.key.provider,
            page: self.key.page,
            item: self.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Loaded,
    FailureToast,
}

/// Waits for the loaded signal or the failure toast after a launch and
/// leaves the UI back on the catalog.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    close: String,
    toast: String,
    back: String,
    budget: PollSpec,
    success_dwell: Duration,
    failure_settle: Duration,
    close_timeout: Duration,
    back_timeout: Duration,
    diagnostics: DiagnosticSink,
}

impl OutcomeClassifier {
    pub fn new(config: &SweepConfig, diagnostics: DiagnosticSink) -> Self {
        let selectors = &config.selectors;
        let timing = &config.timing;
        Self {
            close: selectors.item_close.clone(),
            toast: selectors.failure_toast.clone(),
            back: selectors.back_button.clone(),
            budget: PollSpec::new(timing.poll_interval(), timing.outcome_polls),
            success_dwell: timing.success_dwell(),
            failure_settle: timing.failure_settle(),
            close_timeout: timing.close_timeout(),
            back_timeout: timing.back_timeout(),
            diagnostics,
        }
    }

    pub fn default_budget(&self) -> PollSpec {
        self.budget
    }

    pub async fn await_outcome(
        &self,
        driver: &mut dyn Driver,
        item: ItemHandle<'_>,
        budget: PollSpec,
    ) -> Verdict {
        match self.observe(driver, budget).await {
            Some(Signal::Loaded) => {
                info!(item = %item.key, name = item.name, "item loaded");
                self.dismiss(driver, item).await;
                Verdict::Success
            }
            Some(Signal::FailureToast) => {
                warn!(item = %item.key, name = item.name, "item reported failure");
                self.return_to_catalog(driver, item).await;
                Verdict::Failure
            }
            None => {
                warn!(
                    item = %item.key,
                    name = item.name,
                    polls = budget.probes,
                    waited = ?budget.budget(),
                    "no outcome signal before timeout"
                );
                self.diagnostics
                    .capture(driver, DiagnosticReason::Timeout, item.label())
                    .await;
                Verdict::TimedOut
            }
        }
    }

    async fn observe(&self, driver: &mut dyn Driver, budget: PollSpec) -> Option<Signal> {
        let mut poller = Poller::new(budget);
        while poller.next().await {
            match self.probe(driver).await {
                Ok(Some(signal)) => {
                    debug!(?signal, polls = poller.probes_issued(), "outcome signal observed");
                    return Some(signal);
                }
                Ok(None) => {}
                Err(err) => debug!(error = %err, "outcome probe failed"),
            }
        }
        None
    }

    async fn probe(
        &self,
        driver: &mut dyn Driver,
    ) -> crate::browser::BrowserResult<Option<Signal>> {
        if driver.is_visible(&self.toast).await? {
            return Ok(Some(Signal::FailureToast));
        }
        if driver.is_visible(&self.close).await? {
            return Ok(Some(Signal::Loaded));
        }
        Ok(None)
    }

    /// Best effort: the item did load, so a failed close is only logged.
    async fn dismiss(&self, driver: &mut dyn Driver, item: ItemHandle<'_>) {
        sleep(self.success_dwell).await;
        if let Err(err) = driver.wait_and_click(&self.close, self.close_timeout).await {
            warn!(item = %item.key, error = %err, "could not close item");
            self.diagnostics
                .capture(driver, DiagnosticReason::Success, item.label())
                .await;
        }
    }

    async fn return_to_catalog(&self, driver: &mut dyn Driver, item: ItemHandle<'_>) {
        sleep(self.failure_settle).await;
        if let Err(err) = driver.wait_and_click(&self.back, self.back_timeout).await {
            warn!(item = %item.key, error = %err, "back affordance missing, navigating back");
            self.diagnostics
                .capture(driver, DiagnosticReason::Fail, item.label())
                .await;
            if let Err(err) = driver.go_back().await {
                warn!(item = %item.key, error = %err, "navigate back failed");
            }
        }
    }
}
