use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::driver::{Driver, SessionFactory};
use super::error::BrowserResult;

/// The authenticated browsing context. A hard restart swaps the driver and
/// the identity; a soft reset keeps both.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    driver: Box<dyn Driver>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn from_driver(driver: Box<dyn Driver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            driver,
        }
    }

    pub async fn open(factory: &dyn SessionFactory) -> BrowserResult<Self> {
        let driver = factory.create().await?;
        let session = Self::from_driver(driver);
        info!(session = %session.id, "browsing session opened");
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn driver(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    /// Replaces the underlying driver with a fresh one and tears the old one
    /// down. When the factory fails the current driver is left in place.
    pub async fn restart(&mut self, factory: &dyn SessionFactory) -> BrowserResult<()> {
        let fresh = factory.create().await?;
        let mut previous = std::mem::replace(&mut self.driver, fresh);
        let previous_id = self.id;
        self.id = Uuid::new_v4();
        self.created_at = Utc::now();
        if let Err(err) = previous.close().await {
            warn!(session = %previous_id, error = %err, "failed to close replaced session");
        }
        info!(previous = %previous_id, session = %self.id, "browsing session restarted");
        Ok(())
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(session = %self.id, "closing browsing session");
        self.driver.close().await
    }
}
