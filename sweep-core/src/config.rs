use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SweepConfig {
    pub site: SiteSection,
    #[serde(default)]
    pub chromium: ChromiumSection,
    pub selectors: SelectorSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.site.base_url).map_err(|err| ConfigError::Invalid {
            field: "site.base_url",
            reason: err.to_string(),
        })?;
        let positive: [(&'static str, u64); 7] = [
            ("policy.failure_budget", self.policy.failure_budget as u64),
            ("policy.escalation_interval", self.policy.escalation_interval as u64),
            ("policy.login_attempts", self.policy.login_attempts as u64),
            ("policy.pagination_attempts", self.policy.pagination_attempts as u64),
            ("policy.launch_attempts", self.policy.launch_attempts as u64),
            ("timing.outcome_polls", self.timing.outcome_polls as u64),
            ("timing.page_refresh_polls", self.timing.page_refresh_polls as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.selectors.provider_buttons.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "selectors.provider_buttons",
                reason: "selector is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteSection {
    pub base_url: String,
    #[serde(default = "default_username_env")]
    pub username_env: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_username_env() -> String {
    "SWEEP_USERNAME".to_string()
}

fn default_password_env() -> String {
    "SWEEP_PASSWORD".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window_size: [u32; 2],
    pub request_timeout_seconds: Option<u64>,
    pub extra_args: Vec<String>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: false,
            window_size: [1920, 1080],
            request_timeout_seconds: Some(60),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    /// Clicked in order to reach the provider list from the landing page.
    #[serde(default)]
    pub catalog_entry: Vec<String>,
    pub provider_buttons: String,
    pub pagination_buttons: String,
    #[serde(default)]
    pub pagination_active: Option<String>,
    #[serde(default = "default_filler_labels")]
    pub pagination_filler: Vec<String>,
    pub item_launch_buttons: String,
    pub item_names: String,
    pub item_close: String,
    pub failure_toast: String,
    pub back_button: String,
    #[serde(default)]
    pub logged_in_marker: Option<String>,
    pub login: LoginSelectors,
    #[serde(default)]
    pub welcome_popup_close: Option<String>,
}

fn default_filler_labels() -> Vec<String> {
    vec!["…".to_string(), "...".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSelectors {
    pub open_button: String,
    pub username_input: String,
    pub password_input: String,
    pub submit_button: String,
    #[serde(default)]
    pub modal_close: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub poll_interval_ms: u64,
    pub outcome_polls: u32,
    pub success_dwell_ms: u64,
    pub failure_settle_ms: u64,
    pub close_timeout_ms: u64,
    pub back_timeout_ms: u64,
    pub launch_visible_timeout_ms: u64,
    pub launch_retry_pause_ms: u64,
    pub pre_click_pause_ms: u64,
    pub item_settle_ms: u64,
    pub page_settle_ms: u64,
    pub page_refresh_polls: u32,
    pub window_shift_settle_ms: u64,
    pub navigation_timeout_ms: u64,
    pub login_step_timeout_ms: u64,
    pub login_backoff_ms: u64,
    pub login_backoff_jitter_ms: u64,
    pub popup_timeout_ms: u64,
    pub retry_hover_pause_ms: u64,
    pub provider_settle_ms: u64,
    pub post_recovery_settle_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            outcome_polls: 20,
            success_dwell_ms: 10_000,
            failure_settle_ms: 3_000,
            close_timeout_ms: 10_000,
            back_timeout_ms: 10_000,
            launch_visible_timeout_ms: 15_000,
            launch_retry_pause_ms: 1_000,
            pre_click_pause_ms: 1_000,
            item_settle_ms: 2_500,
            page_settle_ms: 1_000,
            page_refresh_polls: 10,
            window_shift_settle_ms: 1_500,
            navigation_timeout_ms: 20_000,
            login_step_timeout_ms: 12_000,
            login_backoff_ms: 5_000,
            login_backoff_jitter_ms: 0,
            popup_timeout_ms: 3_000,
            retry_hover_pause_ms: 1_500,
            provider_settle_ms: 300,
            post_recovery_settle_ms: 3_000,
        }
    }
}

impl TimingSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn success_dwell(&self) -> Duration {
        Duration::from_millis(self.success_dwell_ms)
    }

    pub fn failure_settle(&self) -> Duration {
        Duration::from_millis(self.failure_settle_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn back_timeout(&self) -> Duration {
        Duration::from_millis(self.back_timeout_ms)
    }

    pub fn launch_visible_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_visible_timeout_ms)
    }

    pub fn launch_retry_pause(&self) -> Duration {
        Duration::from_millis(self.launch_retry_pause_ms)
    }

    pub fn pre_click_pause(&self) -> Duration {
        Duration::from_millis(self.pre_click_pause_ms)
    }

    pub fn item_settle(&self) -> Duration {
        Duration::from_millis(self.item_settle_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn window_shift_settle(&self) -> Duration {
        Duration::from_millis(self.window_shift_settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn login_step_timeout(&self) -> Duration {
        Duration::from_millis(self.login_step_timeout_ms)
    }

    pub fn login_backoff(&self) -> Duration {
        Duration::from_millis(self.login_backoff_ms)
    }

    pub fn popup_timeout(&self) -> Duration {
        Duration::from_millis(self.popup_timeout_ms)
    }

    pub fn retry_hover_pause(&self) -> Duration {
        Duration::from_millis(self.retry_hover_pause_ms)
    }

    pub fn provider_settle(&self) -> Duration {
        Duration::from_millis(self.provider_settle_ms)
    }

    pub fn post_recovery_settle(&self) -> Duration {
        Duration::from_millis(self.post_recovery_settle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub failure_budget: u32,
    pub escalation_interval: u32,
    pub login_attempts: u32,
    pub pagination_attempts: u32,
    pub max_window_shifts: u32,
    pub launch_attempts: u32,
    pub skip_leading_providers: usize,
    pub skip_providers: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            failure_budget: 15,
            escalation_interval: 5,
            login_attempts: 3,
            pagination_attempts: 3,
            max_window_shifts: 12,
            launch_attempts: 3,
            skip_leading_providers: 1,
            skip_providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSection {
    /// Relative paths are taken from the config file's directory.
    pub screenshot_dir: PathBuf,
    pub full_page: bool,
    pub timestamp_format: String,
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            screenshot_dir: PathBuf::from("screenshots"),
            full_page: true,
            timestamp_format: "%d-%m-%y_%H-%M-%S".to_string(),
        }
    }
}

pub fn load_sweep_config<P: AsRef<Path>>(path: P) -> Result<SweepConfig> {
    let path = path.as_ref();
    let mut config: SweepConfig = load_toml(path)?;
    config.validate()?;
    if let Some(base_dir) = path.parent() {
        config.diagnostics.screenshot_dir =
            resolve_path(base_dir, &config.diagnostics.screenshot_dir);
    }
    Ok(config)
}

fn resolve_path<P: AsRef<Path>>(base_dir: &Path, candidate: P) -> PathBuf {
    let path = candidate.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
