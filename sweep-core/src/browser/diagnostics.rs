use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DiagnosticsSection;

use super::driver::Driver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticReason {
    Timeout,
    Fail,
    Success,
    Reset,
}

impl fmt::Display for DiagnosticReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticReason::Timeout => "timeout",
            DiagnosticReason::Fail => "fail",
            DiagnosticReason::Success => "success",
            DiagnosticReason::Reset => "reset",
        };
        f.write_str(label)
    }
}

/// Identity stamped onto a screenshot file name.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticLabel<'a> {
    pub provider: &'a str,
    pub page: u32,
    pub item: &'a str,
}

/// Writes screenshots named `{reason}_{provider}_page{page}_{item}_{timestamp}.png`.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    dir: PathBuf,
    full_page: bool,
    timestamp_format: String,
}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static pattern"))
}

fn sanitize(segment: &str) -> String {
    let cleaned = unsafe_chars().replace_all(segment.trim(), "_");
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.into_owned()
    }
}

impl DiagnosticSink {
    pub fn new(section: &DiagnosticsSection) -> Self {
        Self {
            dir: section.screenshot_dir.clone(),
            full_page: section.full_page,
            timestamp_format: section.timestamp_format.clone(),
        }
    }

    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(
        &self,
        reason: DiagnosticReason,
        label: DiagnosticLabel<'_>,
        at: DateTime<Local>,
    ) -> PathBuf {
        let file = format!(
            "{reason}_{}_page{}_{}_{}.png",
            sanitize(label.provider),
            label.page,
            sanitize(label.item),
            sanitize(&at.format(&self.timestamp_format).to_string()),
        );
        self.dir.join(file)
    }

    /// Best-effort capture: failures are logged and reported as `None`.
    pub async fn capture(
        &self,
        driver: &mut dyn Driver,
        reason: DiagnosticReason,
        label: DiagnosticLabel<'_>,
    ) -> Option<PathBuf> {
        let path = self.path_for(reason, label, Local::now());
        if let Err(err) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %err, "cannot create screenshot directory");
            return None;
        }
        match driver.screenshot(&path, self.full_page).await {
            Ok(()) => {
                info!(%reason, path = %path.display(), "diagnostic screenshot saved");
                Some(path)
            }
            Err(err) => {
                warn!(%reason, error = %err, "diagnostic screenshot failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_carries_identity_and_timestamp() {
        let sink = DiagnosticSink::new(&DiagnosticsSection::default()).with_dir("/tmp/shots");
        let at = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let path = sink.path_for(
            DiagnosticReason::Timeout,
            DiagnosticLabel {
                provider: "Pragmatic Play",
                page: 2,
                item: "Gates of Olympus / 1000",
            },
            at,
        );
        assert_eq!(
            path,
            PathBuf::from("/tmp/shots/timeout_Pragmatic_Play_page2_Gates_of_Olympus_1000_09-03-25_14-05-07.png")
        );
    }

    #[test]
    fn empty_segments_get_a_placeholder() {
        assert_eq!(sanitize("   "), "unnamed");
        assert_eq!(sanitize("a/b"), "a_b");
    }
}
