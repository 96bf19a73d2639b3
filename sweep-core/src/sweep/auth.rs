use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserResult, Driver};
use crate::config::{LoginSelectors, SiteSection, SweepConfig};

use super::error::{SweepError, SweepResult};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads credentials from the environment variables named in `site`.
    pub fn from_env(site: &SiteSection) -> SweepResult<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.is_empty())
                .ok_or_else(|| SweepError::MissingCredentials(name.to_string()))
        };
        Ok(Self::new(read(&site.username_env)?, read(&site.password_env)?))
    }
}

#[async_trait(?Send)]
pub trait Authenticator {
    /// One login attempt. `Ok(false)` means the site rejected or never
    /// confirmed it.
    async fn login(&self, driver: &mut dyn Driver, credentials: &Credentials) -> BrowserResult<bool>;

    /// Best effort.
    async fn dismiss_welcome_popup(&self, driver: &mut dyn Driver);
}

const INTERNAL_ATTEMPTS: u32 = 2;

/// Modal login form of the target site.
#[derive(Debug, Clone)]
pub struct SiteLogin {
    form: LoginSelectors,
    logged_in_marker: Option<String>,
    popup_close: Option<String>,
    step_timeout: Duration,
    popup_timeout: Duration,
}

impl SiteLogin {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            form: config.selectors.login.clone(),
            logged_in_marker: config.selectors.logged_in_marker.clone(),
            popup_close: config.selectors.welcome_popup_close.clone(),
            step_timeout: config.timing.login_step_timeout(),
            popup_timeout: config.timing.popup_timeout(),
        }
    }

    async fn submit(&self, driver: &mut dyn Driver, credentials: &Credentials) -> BrowserResult<()> {
        driver.wait_and_click(&self.form.open_button, self.step_timeout).await?;
        driver.wait_for(&self.form.username_input, self.step_timeout).await?;
        driver.fill(&self.form.username_input, &credentials.username).await?;
        driver.fill(&self.form.password_input, &credentials.password).await?;
        driver.click(&self.form.submit_button).await?;
        match &self.logged_in_marker {
            Some(marker) => driver.wait_for(marker, self.step_timeout).await,
            None => Ok(()),
        }
    }

    async fn close_modal(&self, driver: &mut dyn Driver) {
        let Some(close) = &self.form.modal_close else {
            return;
        };
        match driver.is_visible(close).await {
            Ok(true) => {
                if let Err(err) = driver.click(close).await {
                    debug!(error = %err, "could not close login modal");
                }
            }
            Ok(false) => {}
            Err(err) => debug!(error = %err, "login modal probe failed"),
        }
    }
}

#[async_trait(?Send)]
impl Authenticator for SiteLogin {
    async fn login(&self, driver: &mut dyn Driver, credentials: &Credentials) -> BrowserResult<bool> {
        if let Some(marker) = &self.logged_in_marker {
            if driver.is_visible(marker).await? {
                debug!("session already logged in");
                return Ok(true);
            }
        }
        for attempt in 1..=INTERNAL_ATTEMPTS {
            match self.submit(driver, credentials).await {
                Ok(()) => {
                    info!(attempt, "logged in");
                    return Ok(true);
                }
                Err(err)
                    if err.is_timeout() || matches!(err, BrowserError::ElementNotFound { .. }) =>
                {
                    warn!(attempt, error = %err, "login step did not complete");
                    self.close_modal(driver).await;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }

    async fn dismiss_welcome_popup(&self, driver: &mut dyn Driver) {
        let Some(close) = &self.popup_close else {
            return;
        };
        match driver.wait_and_click(close, self.popup_timeout).await {
            Ok(()) => debug!("welcome popup dismissed"),
            Err(err) => debug!(error = %err, "no welcome popup"),
        }
    }
}

/// Bounded login attempts with a fixed backoff and optional jitter.
#[derive(Debug, Clone)]
pub struct LoginRetry {
    attempts: u32,
    backoff: Duration,
    jitter_ms: u64,
}

impl LoginRetry {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            attempts: config.policy.login_attempts.max(1),
            backoff: config.timing.login_backoff(),
            jitter_ms: config.timing.login_backoff_jitter_ms,
        }
    }

    fn delay(&self) -> Duration {
        let mut delay = self.backoff;
        if self.jitter_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
            delay += Duration::from_millis(jitter);
        }
        delay
    }

    /// Returns the attempt that succeeded.
    pub async fn authenticate(
        &self,
        auth: &dyn Authenticator,
        driver: &mut dyn Driver,
        credentials: &Credentials,
    ) -> SweepResult<u32> {
        for attempt in 1..=self.attempts {
            match auth.login(driver, credentials).await {
                Ok(true) => {
                    auth.dismiss_welcome_popup(driver).await;
                    return Ok(attempt);
                }
                Ok(false) => warn!(attempt, max = self.attempts, "login rejected"),
                Err(err) => warn!(attempt, max = self.attempts, error = %err, "login errored"),
            }
            if attempt < self.attempts {
                sleep(self.delay()).await;
            }
        }
        Err(SweepError::AuthExhausted {
            attempts: self.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn missing_env_var_is_named() {
        let site = SiteSection {
            base_url: "https://example.test".to_string(),
            username_env: "SWEEP_TEST_UNSET_USER_7F3A".to_string(),
            password_env: "SWEEP_TEST_UNSET_PASS_7F3A".to_string(),
        };
        match Credentials::from_env(&site) {
            Err(SweepError::MissingCredentials(name)) => {
                assert_eq!(name, "SWEEP_TEST_UNSET_USER_7F3A")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
