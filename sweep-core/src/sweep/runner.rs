use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::browser::{DiagnosticSink, LoadCondition, Session, SessionFactory};
use crate::config::SweepConfig;

use super::auth::{Authenticator, Credentials, LoginRetry};
use super::catalog::{CatalogNavigator, CatalogRoute};
use super::classifier::OutcomeClassifier;
use super::error::SweepResult;
use super::pagination::PaginationNavigator;
use super::recovery::RecoveryManager;
use super::report::SweepReport;
use super::traversal::TraversalController;

/// Providers to sweep, in catalog order.
///
/// An explicit `only` list wins over the configured skips.
pub fn select_providers(config: &SweepConfig, listed: &[String], only: &[String]) -> Vec<String> {
    if !only.is_empty() {
        return listed
            .iter()
            .filter(|name| only.iter().any(|wanted| wanted.trim() == name.trim()))
            .cloned()
            .collect();
    }
    listed
        .iter()
        .skip(config.policy.skip_leading_providers)
        .filter(|name| !config.policy.skip_providers.iter().any(|skip| skip.trim() == name.trim()))
        .cloned()
        .collect()
}

/// Opens the first session and runs the traversal once per provider.
pub struct SweepRunner {
    config: Arc<SweepConfig>,
    sessions: Arc<dyn SessionFactory>,
    auth: Arc<dyn Authenticator>,
    credentials: Credentials,
    diagnostics: DiagnosticSink,
}

impl SweepRunner {
    pub fn new(
        config: Arc<SweepConfig>,
        sessions: Arc<dyn SessionFactory>,
        auth: Arc<dyn Authenticator>,
        credentials: Credentials,
    ) -> Self {
        let diagnostics = DiagnosticSink::new(&config.diagnostics);
        Self {
            config,
            sessions,
            auth,
            credentials,
            diagnostics,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticSink) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// New session, logged in and sitting on the provider list.
    pub async fn open_session(&self) -> SweepResult<Session> {
        let mut session = Session::open(self.sessions.as_ref()).await?;
        match self.prepare(&mut session).await {
            Ok(()) => Ok(session),
            Err(err) => {
                if let Err(close_err) = session.shutdown().await {
                    warn!(error = %close_err, "failed to close session after setup error");
                }
                Err(err)
            }
        }
    }

    async fn prepare(&self, session: &mut Session) -> SweepResult<()> {
        let driver = session.driver();
        driver
            .goto(
                &self.config.site.base_url,
                LoadCondition::DomContentLoaded,
                self.config.timing.navigation_timeout(),
            )
            .await?;
        LoginRetry::new(&self.config)
            .authenticate(self.auth.as_ref(), driver, &self.credentials)
            .await?;
        CatalogNavigator::new(&self.config).open_catalog(driver).await?;
        Ok(())
    }

    pub async fn list_providers(&self) -> SweepResult<Vec<String>> {
        let mut session = self.open_session().await?;
        let listed = CatalogNavigator::new(&self.config)
            .provider_names(session.driver())
            .await;
        session.shutdown().await?;
        Ok(listed?)
    }

    pub async fn run(&self, only: &[String]) -> SweepResult<SweepReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        let config = self.config.as_ref();

        let mut session = self.open_session().await?;
        let catalog = CatalogNavigator::new(config);
        let listed = match catalog.provider_names(session.driver()).await {
            Ok(listed) => listed,
            Err(err) => {
                if let Err(close_err) = session.shutdown().await {
                    warn!(error = %close_err, "failed to close session");
                }
                return Err(err.into());
            }
        };
        let providers = select_providers(config, &listed, only);
        info!(listed = listed.len(), selected = providers.len(), "providers enumerated");

        let pagination = PaginationNavigator::new(config);
        let classifier = OutcomeClassifier::new(config, self.diagnostics.clone());
        let recovery = RecoveryManager::new(
            config,
            self.credentials.clone(),
            self.sessions.clone(),
            self.auth.clone(),
            Arc::new(CatalogRoute::new(catalog.clone(), pagination.clone())),
            catalog.clone(),
            classifier.clone(),
            self.diagnostics.clone(),
        );
        let mut controller = TraversalController::new(
            config,
            session,
            catalog.clone(),
            pagination,
            classifier,
            recovery,
        );

        let mut reports = Vec::with_capacity(providers.len());
        for (position, provider) in providers.iter().enumerate() {
            if position > 0 {
                if let Err(err) = catalog.open_catalog(controller.session().driver()).await {
                    warn!(provider = %provider, error = %err, "could not reopen catalog");
                }
            }
            reports.push(controller.run(provider).await);
        }

        let retried_items = controller.retried().len();
        let escalation_count = controller.escalation().count();
        if let Err(err) = controller.into_session().shutdown().await {
            warn!(error = %err, "failed to close session");
        }

        let report = SweepReport {
            started_at,
            duration_secs: started.elapsed().as_secs(),
            providers: reports,
            retried_items,
            escalation_count,
        };
        info!(
            providers = report.providers.len(),
            attempted = report.items_attempted(),
            successes = report.successes(),
            duration_secs = report.duration_secs,
            "sweep finished"
        );
        Ok(report)
    }
}
