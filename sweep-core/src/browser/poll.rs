use std::time::Duration;

use tokio::time::sleep;

/// Interval and probe budget for one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub probes: u32,
}

impl PollSpec {
    pub fn new(interval: Duration, probes: u32) -> Self {
        Self {
            interval,
            probes: probes.max(1),
        }
    }

    /// Enough probes at `interval` to cover `timeout`.
    pub fn covering(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let probes = timeout.as_millis().div_ceil(interval_ms) as u32;
        Self::new(interval, probes.saturating_add(1))
    }

    pub fn budget(&self) -> Duration {
        self.interval * self.probes.saturating_sub(1)
    }
}

/// Paces a probe loop: the first `next` returns immediately, every later one
/// sleeps for the interval first, and `next` returns false once the probe
/// budget is spent.
///
/// ```ignore
/// let mut poller = Poller::new(spec);
/// while poller.next().await {
///     if driver.is_visible(selector).await? {
///         return Ok(true);
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Poller {
    spec: PollSpec,
    issued: u32,
}

impl Poller {
    pub fn new(spec: PollSpec) -> Self {
        Self { spec, issued: 0 }
    }

    pub async fn next(&mut self) -> bool {
        if self.issued >= self.spec.probes {
            return false;
        }
        if self.issued > 0 && !self.spec.interval.is_zero() {
            sleep(self.spec.interval).await;
        }
        self.issued += 1;
        true
    }

    pub fn probes_issued(&self) -> u32 {
        self.issued
    }

    pub fn exhausted(&self) -> bool {
        self.issued >= self.spec.probes
    }
}
