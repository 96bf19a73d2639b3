use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{
    DiagnosticLabel, DiagnosticReason, DiagnosticSink, Driver, LoadCondition, Session,
    SessionFactory,
};
use crate::config::SweepConfig;

use super::auth::{Authenticator, Credentials, LoginRetry};
use super::catalog::{CatalogNavigator, Renavigate};
use super::classifier::{ItemHandle, OutcomeClassifier};
use super::error::{SweepError, SweepResult};
use super::model::{FailureKind, ItemKey, RecoveryReason, ResetMode, Verdict};

const CLEAR_STORAGE: &str = r#"(() => {
    try { window.localStorage.clear(); } catch (e) {}
    try { window.sessionStorage.clear(); } catch (e) {}
    return true;
})()"#;

/// One item handed to recovery.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryRequest<'a> {
    pub key: &'a ItemKey,
    pub item_name: &'a str,
    pub reason: RecoveryReason,
    pub hard_hint: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Retried { mode: ResetMode, verdict: Verdict },
    AuthExhausted { mode: ResetMode },
    NavigationExhausted { mode: ResetMode, page: u32 },
    ProviderMissing { mode: ResetMode },
    ItemMissing { mode: ResetMode, count: usize },
    SessionLost { error: String },
    Aborted { mode: ResetMode, error: String },
}

impl RecoveryOutcome {
    /// The single retry ended in success.
    pub fn recovered(&self) -> bool {
        matches!(
            self,
            RecoveryOutcome::Retried {
                verdict: Verdict::Success,
                ..
            }
        )
    }

    pub fn mode(&self) -> Option<ResetMode> {
        match self {
            RecoveryOutcome::Retried { mode, .. }
            | RecoveryOutcome::AuthExhausted { mode }
            | RecoveryOutcome::NavigationExhausted { mode, .. }
            | RecoveryOutcome::ProviderMissing { mode }
            | RecoveryOutcome::ItemMissing { mode, .. }
            | RecoveryOutcome::Aborted { mode, .. } => Some(*mode),
            RecoveryOutcome::SessionLost { .. } => None,
        }
    }

    /// Failure kind this outcome leaves the item in, if recovery itself broke
    /// down rather than the retry.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RecoveryOutcome::Retried {
                verdict: Verdict::Success,
                ..
            } => None,
            RecoveryOutcome::Retried {
                verdict: Verdict::Failure,
                ..
            } => Some(FailureKind::ExplicitFailure),
            RecoveryOutcome::Retried {
                verdict: Verdict::TimedOut,
                ..
            } => Some(FailureKind::TimedOut),
            RecoveryOutcome::AuthExhausted { .. } => Some(FailureKind::AuthExhausted),
            RecoveryOutcome::NavigationExhausted { .. } | RecoveryOutcome::ProviderMissing { .. } => {
                Some(FailureKind::NavigationExhausted)
            }
            RecoveryOutcome::ItemMissing { .. }
            | RecoveryOutcome::SessionLost { .. }
            | RecoveryOutcome::Aborted { .. } => Some(FailureKind::UnclassifiedException),
        }
    }

    fn from_error(mode: ResetMode, err: SweepError) -> Self {
        match err {
            SweepError::AuthExhausted { .. } => RecoveryOutcome::AuthExhausted { mode },
            SweepError::NavigationExhausted { page } => {
                RecoveryOutcome::NavigationExhausted { mode, page }
            }
            SweepError::ProviderNotFound(_) => RecoveryOutcome::ProviderMissing { mode },
            SweepError::ItemMissing { count, .. } => RecoveryOutcome::ItemMissing { mode, count },
            SweepError::SessionLost(err) => RecoveryOutcome::SessionLost {
                error: err.to_string(),
            },
            other => RecoveryOutcome::Aborted {
                mode,
                error: other.to_string(),
            },
        }
    }
}

/// Brings a broken item back to a clean, authenticated catalog page and
/// retries it once.
pub struct RecoveryManager {
    base_url: String,
    credentials: Credentials,
    sessions: Arc<dyn SessionFactory>,
    auth: Arc<dyn Authenticator>,
    route: Arc<dyn Renavigate>,
    catalog: CatalogNavigator,
    classifier: OutcomeClassifier,
    diagnostics: DiagnosticSink,
    login: LoginRetry,
    navigation_timeout: Duration,
    post_recovery_settle: Duration,
}

impl RecoveryManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &SweepConfig,
        credentials: Credentials,
        sessions: Arc<dyn SessionFactory>,
        auth: Arc<dyn Authenticator>,
        route: Arc<dyn Renavigate>,
        catalog: CatalogNavigator,
        classifier: OutcomeClassifier,
        diagnostics: DiagnosticSink,
    ) -> Self {
        Self {
            base_url: config.site.base_url.clone(),
            credentials,
            sessions,
            auth,
            route,
            catalog,
            classifier,
            diagnostics,
            login: LoginRetry::new(config),
            navigation_timeout: config.timing.navigation_timeout(),
            post_recovery_settle: config.timing.post_recovery_settle(),
        }
    }

    pub async fn recover(&self, session: &mut Session, request: RecoveryRequest<'_>) -> RecoveryOutcome {
        let key = request.key;
        info!(
            item = %key,
            name = request.item_name,
            reason = ?request.reason,
            hard = request.hard_hint,
            session = %session.id(),
            "starting recovery"
        );
        self.diagnostics
            .capture(
                session.driver(),
                DiagnosticReason::Reset,
                DiagnosticLabel {
                    provider: &key.provider,
                    page: key.page,
                    item: request.item_name,
                },
            )
            .await;

        if !request.hard_hint {
            match self.soft_reset(session.driver(), request).await {
                Ok(verdict) => return self.finish(ResetMode::Soft, verdict, key),
                Err(err @ (SweepError::AuthExhausted { .. } | SweepError::ItemMissing { .. })) => {
                    warn!(item = %key, error = %err, "soft recovery gave up");
                    return RecoveryOutcome::from_error(ResetMode::Soft, err);
                }
                Err(err) => {
                    warn!(item = %key, error = %err, "soft reset failed, escalating to hard restart");
                }
            }
        }

        match self.hard_restart(session, request).await {
            Ok(verdict) => self.finish(ResetMode::Hard, verdict, key),
            Err(err) => {
                warn!(item = %key, error = %err, "hard restart gave up");
                RecoveryOutcome::from_error(ResetMode::Hard, err)
            }
        }
    }

    /// Walks an intact or stranded session back to `provider`'s `page`
    /// without touching any item. A fresh session is tried only when the
    /// current one cannot reach the provider list at all; an unreachable page
    /// or a missing provider would look the same after a restart.
    pub async fn reenter(&self, session: &mut Session, provider: &str, page: u32) -> SweepResult<ResetMode> {
        match self.rejoin(session.driver(), provider, page).await {
            Ok(()) => return Ok(ResetMode::Soft),
            Err(err @ (SweepError::NavigationExhausted { .. } | SweepError::ProviderNotFound(_))) => {
                return Err(err)
            }
            Err(err) => {
                warn!(provider, page, error = %err, "cannot rejoin catalog, restarting session");
            }
        }
        session
            .restart(self.sessions.as_ref())
            .await
            .map_err(SweepError::SessionLost)?;
        self.rejoin(session.driver(), provider, page).await?;
        Ok(ResetMode::Hard)
    }

    async fn rejoin(&self, driver: &mut dyn Driver, provider: &str, page: u32) -> SweepResult<()> {
        driver
            .goto(&self.base_url, LoadCondition::DomContentLoaded, self.navigation_timeout)
            .await?;
        self.login
            .authenticate(self.auth.as_ref(), driver, &self.credentials)
            .await?;
        self.route.renavigate(driver, provider, page).await
    }

    fn finish(&self, mode: ResetMode, verdict: Verdict, key: &ItemKey) -> RecoveryOutcome {
        info!(item = %key, %mode, ?verdict, "retry finished");
        RecoveryOutcome::Retried { mode, verdict }
    }

    async fn soft_reset(&self, driver: &mut dyn Driver, request: RecoveryRequest<'_>) -> SweepResult<Verdict> {
        debug!(item = %request.key, "clearing cookies and storage");
        driver.clear_cookies().await?;
        if let Err(err) = driver.evaluate(CLEAR_STORAGE).await {
            debug!(error = %err, "storage clear failed");
        }
        driver
            .goto(&self.base_url, LoadCondition::DomContentLoaded, self.navigation_timeout)
            .await?;
        self.resume(driver, request).await
    }

    async fn hard_restart(&self, session: &mut Session, request: RecoveryRequest<'_>) -> SweepResult<Verdict> {
        session
            .restart(self.sessions.as_ref())
            .await
            .map_err(SweepError::SessionLost)?;
        let driver = session.driver();
        driver
            .goto(&self.base_url, LoadCondition::DomContentLoaded, self.navigation_timeout)
            .await?;
        self.resume(driver, request).await
    }

    /// Authenticate, walk back to the item and relaunch it exactly once.
    async fn resume(&self, driver: &mut dyn Driver, request: RecoveryRequest<'_>) -> SweepResult<Verdict> {
        let key = request.key;
        let attempt = self
            .login
            .authenticate(self.auth.as_ref(), driver, &self.credentials)
            .await?;
        debug!(item = %key, attempt, "authenticated during recovery");
        self.route.renavigate(driver, &key.provider, key.page).await?;
        self.catalog.relaunch_item(driver, key.index).await?;
        let verdict = self
            .classifier
            .await_outcome(
                driver,
                ItemHandle {
                    key,
                    name: request.item_name,
                },
                self.classifier.default_budget(),
            )
            .await;
        sleep(self.post_recovery_settle).await;
        Ok(verdict)
    }
}
