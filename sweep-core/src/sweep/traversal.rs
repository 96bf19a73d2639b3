use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::Session;
use crate::config::SweepConfig;

use super::catalog::CatalogNavigator;
use super::classifier::{ItemHandle, OutcomeClassifier};
use super::model::{
    EscalationCounter, FailureBudget, ItemKey, RecoveryReason, RetriedSet, Verdict,
};
use super::pagination::PaginationNavigator;
use super::recovery::{RecoveryManager, RecoveryOutcome, RecoveryRequest};
use super::report::ProviderReport;

enum Flow {
    Continue,
    SkipPage,
    Halt,
}

/// Walks provider → page → item, classifying each launch and handing
/// anything but success to recovery.
pub struct TraversalController {
    session: Session,
    catalog: CatalogNavigator,
    pagination: PaginationNavigator,
    classifier: OutcomeClassifier,
    recovery: RecoveryManager,
    retried: RetriedSet,
    escalation: EscalationCounter,
    /// Set when a recovery gave up somewhere between the landing page and
    /// the item, so the session is no longer on the provider's list.
    context_lost: bool,
    failure_budget: u32,
    item_settle: Duration,
    page_settle: Duration,
}

impl TraversalController {
    pub fn new(
        config: &SweepConfig,
        session: Session,
        catalog: CatalogNavigator,
        pagination: PaginationNavigator,
        classifier: OutcomeClassifier,
        recovery: RecoveryManager,
    ) -> Self {
        Self {
            session,
            catalog,
            pagination,
            classifier,
            recovery,
            retried: RetriedSet::new(),
            escalation: EscalationCounter::new(config.policy.escalation_interval),
            context_lost: false,
            failure_budget: config.policy.failure_budget,
            item_settle: config.timing.item_settle(),
            page_settle: config.timing.page_settle(),
        }
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn retried(&self) -> &RetriedSet {
        &self.retried
    }

    pub fn escalation(&self) -> &EscalationCounter {
        &self.escalation
    }

    /// Sweeps one provider. Never fails: every problem ends up in the report.
    pub async fn run(&mut self, provider: &str) -> ProviderReport {
        let started = Instant::now();
        let mut report = ProviderReport::new(provider);
        let mut budget = FailureBudget::new(self.failure_budget);

        // A previous provider may have ended with the session stranded.
        let entered = if self.context_lost {
            self.recovery
                .reenter(&mut self.session, provider, 1)
                .await
                .map(|_| report.reentries += 1)
        } else {
            self.catalog.select_provider(self.session.driver(), provider).await
        };
        if let Err(err) = entered {
            warn!(provider, error = %err, "cannot start provider");
            report.aborted = Some(err.to_string());
            report.duration_ms = started.elapsed().as_millis() as u64;
            return report;
        }
        self.context_lost = false;
        sleep(self.page_settle).await;
        let mut last_page = self.read_last_page(1).await;
        info!(provider, last_page, "provider opened");

        let mut page = 1u32;
        while page <= last_page {
            if !self.ensure_page(provider, page, &mut report).await {
                warn!(provider, page, "page unreachable, skipping");
                report.record_navigation_failure(page);
                page += 1;
                continue;
            }
            sleep(self.page_settle).await;
            last_page = self.read_last_page(last_page).await;
            report.pages_visited += 1;

            let count = match self.catalog.item_count(self.session.driver()).await {
                Ok(count) => count,
                Err(err) => {
                    warn!(provider, page, error = %err, "cannot count items");
                    0
                }
            };
            info!(provider, page, last_page, items = count, "page entered");

            match self.visit_page(provider, page, count, &mut budget, &mut report).await {
                Flow::Continue | Flow::SkipPage => {}
                Flow::Halt => {
                    warn!(
                        provider,
                        page,
                        failures = budget.used(),
                        limit = budget.limit(),
                        "failure budget exhausted, halting provider"
                    );
                    report.halted_by_budget = true;
                    break;
                }
            }
            page += 1;
        }

        report.last_page = last_page;
        report.failure_budget_used = budget.used();
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            provider,
            attempted = report.items_attempted,
            successes = report.successes,
            recovered = report.recovered,
            skipped = report.permanent_skips,
            halted = report.halted_by_budget,
            "provider finished"
        );
        report
    }

    /// Puts the session on `page` of `provider`. A pagination click is
    /// enough while the list is still on screen; page 1 is where the list
    /// lands after every close, so it needs nothing. Otherwise the route is
    /// rebuilt from the landing page.
    async fn ensure_page(&mut self, provider: &str, page: u32, report: &mut ProviderReport) -> bool {
        if !self.context_lost
            && (page == 1 || self.pagination.navigate_to(self.session.driver(), page).await)
        {
            return true;
        }
        match self.recovery.reenter(&mut self.session, provider, page).await {
            Ok(mode) => {
                info!(provider, page, %mode, "catalog context rebuilt");
                self.context_lost = false;
                report.reentries += 1;
                true
            }
            Err(err) => {
                warn!(provider, page, error = %err, "cannot rebuild catalog context");
                self.context_lost = true;
                false
            }
        }
    }

    /// The widget can re-render with a wider window, so the highest label
    /// seen so far wins.
    async fn read_last_page(&mut self, known: u32) -> u32 {
        match self.pagination.last_visible_page(self.session.driver()).await {
            Ok(visible) => visible.max(known),
            Err(err) => {
                debug!(error = %err, "cannot read pagination");
                known
            }
        }
    }

    async fn visit_page(
        &mut self,
        provider: &str,
        page: u32,
        count: usize,
        budget: &mut FailureBudget,
        report: &mut ProviderReport,
    ) -> Flow {
        for index in 0..count {
            let key = ItemKey::new(provider, page, index);
            if self.retried.contains(&key) {
                info!(item = %key, "already retried once, skipping");
                report.record_skip(key);
                continue;
            }
            // Closing an item re-renders the list from its first page.
            if index > 0 && !self.ensure_page(provider, page, report).await {
                warn!(item = %key, "page lost before launch, skipping rest of page");
                report.record_navigation_failure(page);
                return Flow::SkipPage;
            }
            let name = self.catalog.item_name(self.session.driver(), index).await;
            report.items_attempted += 1;
            let failure = self.attempt(&key, &name).await;
            let Some(reason) = failure else {
                report.record_success(key, name);
                sleep(self.item_settle).await;
                continue;
            };

            self.retried.insert(key.clone());
            let hard_hint = match reason {
                RecoveryReason::Failure => {
                    let used = budget.record();
                    let hard = self.escalation.record();
                    debug!(item = %key, used, escalation = self.escalation.count(), hard, "failure counted");
                    hard
                }
                RecoveryReason::TimedOut => false,
                RecoveryReason::Exception => true,
            };
            let outcome = self
                .recovery
                .recover(
                    &mut self.session,
                    RecoveryRequest {
                        key: &key,
                        item_name: &name,
                        reason,
                        hard_hint,
                    },
                )
                .await;
            let lost_page = matches!(outcome, RecoveryOutcome::NavigationExhausted { .. });
            if !matches!(outcome, RecoveryOutcome::Retried { .. }) {
                self.context_lost = true;
            }
            report.record_recovery(key, name, reason, outcome);

            if budget.exhausted() {
                return Flow::Halt;
            }
            if lost_page {
                report.record_navigation_failure(page);
                return Flow::SkipPage;
            }
            sleep(self.item_settle).await;
        }
        Flow::Continue
    }

    /// Launches and classifies one item; `None` means success.
    async fn attempt(&mut self, key: &ItemKey, name: &str) -> Option<RecoveryReason> {
        let driver = self.session.driver();
        if let Err(err) = self.catalog.launch_item(driver, key.index).await {
            warn!(item = %key, error = %err, "launch failed");
            return Some(RecoveryReason::Exception);
        }
        let verdict = self
            .classifier
            .await_outcome(driver, ItemHandle { key, name }, self.classifier.default_budget())
            .await;
        match verdict {
            Verdict::Success => None,
            Verdict::Failure => Some(RecoveryReason::Failure),
            Verdict::TimedOut => Some(RecoveryReason::TimedOut),
        }
    }
}
