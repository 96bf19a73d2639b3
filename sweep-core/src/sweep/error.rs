use thiserror::Error;

use crate::browser::BrowserError;
use crate::error::ConfigError;

pub type SweepResult<T> = Result<T, SweepError>;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("authentication failed after {attempts} attempts")]
    AuthExhausted { attempts: u32 },
    #[error("could not reach page {page}")]
    NavigationExhausted { page: u32 },
    #[error("provider not found: {0}")]
    ProviderNotFound(String),
    #[error("item #{index} missing, page lists {count} items")]
    ItemMissing { index: usize, count: usize },
    #[error("could not open a new session: {0}")]
    SessionLost(BrowserError),
    #[error("missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),
}
