use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{FailureKind, ItemKey, RecoveryReason, ResetMode};
use super::recovery::RecoveryOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    /// Failed the first launch, succeeded on the recovery retry.
    Recovered,
    Failed { kind: FailureKind },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRecord {
    pub key: ItemKey,
    pub name: Option<String>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryOutcome>,
}

/// What one `run(provider)` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderReport {
    pub provider: String,
    pub pages_visited: u32,
    pub last_page: u32,
    pub items_attempted: usize,
    pub successes: usize,
    pub failures: usize,
    pub timeouts: usize,
    pub exceptions: usize,
    pub permanent_skips: usize,
    pub recoveries: usize,
    pub recovered: usize,
    pub hard_restarts: usize,
    pub auth_exhausted: usize,
    pub navigation_failures: Vec<u32>,
    /// Times the provider/page context had to be rebuilt outside an item
    /// recovery.
    pub reentries: usize,
    pub failure_budget_used: u32,
    pub halted_by_budget: bool,
    pub aborted: Option<String>,
    pub items: Vec<ItemRecord>,
    pub duration_ms: u64,
}

impl ProviderReport {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, key: ItemKey, name: String) {
        self.successes += 1;
        self.items.push(ItemRecord {
            key,
            name: Some(name),
            status: ItemStatus::Success,
            first_failure: None,
            recovery: None,
        });
    }

    pub fn record_skip(&mut self, key: ItemKey) {
        self.permanent_skips += 1;
        self.items.push(ItemRecord {
            key,
            name: None,
            status: ItemStatus::Failed {
                kind: FailureKind::PermanentSkip,
            },
            first_failure: None,
            recovery: None,
        });
    }

    pub fn record_recovery(
        &mut self,
        key: ItemKey,
        name: String,
        reason: RecoveryReason,
        outcome: RecoveryOutcome,
    ) {
        match reason {
            RecoveryReason::Failure => self.failures += 1,
            RecoveryReason::TimedOut => self.timeouts += 1,
            RecoveryReason::Exception => self.exceptions += 1,
        }
        self.recoveries += 1;
        if outcome.mode() == Some(ResetMode::Hard) {
            self.hard_restarts += 1;
        }
        if matches!(outcome, RecoveryOutcome::AuthExhausted { .. }) {
            self.auth_exhausted += 1;
        }
        let status = match outcome.failure_kind() {
            None => {
                self.recovered += 1;
                ItemStatus::Recovered
            }
            Some(kind) => ItemStatus::Failed { kind },
        };
        self.items.push(ItemRecord {
            key,
            name: Some(name),
            status,
            first_failure: Some(reason.failure_kind()),
            recovery: Some(outcome),
        });
    }

    pub fn record_navigation_failure(&mut self, page: u32) {
        if !self.navigation_failures.contains(&page) {
            self.navigation_failures.push(page);
        }
    }

    pub fn status_of(&self, key: &ItemKey) -> Option<&ItemStatus> {
        self.items
            .iter()
            .rev()
            .find(|record| &record.key == key)
            .map(|record| &record.status)
    }
}

/// Whole-run summary returned by the sweep runner.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub providers: Vec<ProviderReport>,
    pub retried_items: usize,
    pub escalation_count: u32,
}

impl SweepReport {
    pub fn items_attempted(&self) -> usize {
        self.providers.iter().map(|p| p.items_attempted).sum()
    }

    pub fn successes(&self) -> usize {
        self.providers.iter().map(|p| p.successes + p.recovered).sum()
    }

    pub fn halted_providers(&self) -> impl Iterator<Item = &ProviderReport> {
        self.providers.iter().filter(|p| p.halted_by_budget)
    }
}
