use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

/// Identity of one catalog item: the unit of dedup and retry tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ItemKey {
    pub provider: String,
    pub page: u32,
    pub index: usize,
}

impl ItemKey {
    pub fn new(provider: impl Into<String>, page: u32, index: usize) -> Self {
        Self {
            provider: provider.into(),
            page,
            index,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / page {} / #{}", self.provider, self.page, self.index)
    }
}

/// Verdict of a single launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure,
    TimedOut,
}

/// Why an item was handed to recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    Failure,
    TimedOut,
    Exception,
}

impl RecoveryReason {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RecoveryReason::Failure => FailureKind::ExplicitFailure,
            RecoveryReason::TimedOut => FailureKind::TimedOut,
            RecoveryReason::Exception => FailureKind::UnclassifiedException,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TimedOut,
    ExplicitFailure,
    UnclassifiedException,
    AuthExhausted,
    NavigationExhausted,
    PermanentSkip,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::TimedOut => "timed out",
            FailureKind::ExplicitFailure => "explicit failure",
            FailureKind::UnclassifiedException => "unclassified exception",
            FailureKind::AuthExhausted => "authentication exhausted",
            FailureKind::NavigationExhausted => "navigation exhausted",
            FailureKind::PermanentSkip => "permanent skip",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetMode {
    Soft,
    Hard,
}

impl fmt::Display for ResetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetMode::Soft => f.write_str("soft"),
            ResetMode::Hard => f.write_str("hard"),
        }
    }
}

/// Items already handed to recovery during this traversal session.
#[derive(Debug, Clone, Default)]
pub struct RetriedSet {
    keys: HashSet<ItemKey>,
}

impl RetriedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns false when the key was already present.
    pub fn insert(&mut self, key: ItemKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Per-provider circuit breaker over failure verdicts.
#[derive(Debug, Clone)]
pub struct FailureBudget {
    used: u32,
    limit: u32,
}

impl FailureBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            used: 0,
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self) -> u32 {
        self.used = self.used.saturating_add(1);
        self.used
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

/// Decides when a failure escalates recovery to a hard restart.
#[derive(Debug, Clone)]
pub struct EscalationCounter {
    count: u32,
    interval: u32,
}

impl EscalationCounter {
    pub fn new(interval: u32) -> Self {
        Self {
            count: 0,
            interval: interval.max(1),
        }
    }

    /// Counts one failure; true when this failure is due for a hard restart.
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count % self.interval == 0
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
