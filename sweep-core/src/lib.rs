pub mod browser;
pub mod config;
pub mod error;
pub mod sweep;

pub use config::{load_sweep_config, SweepConfig};
pub use error::{ConfigError, Result};
pub use sweep::{
    Credentials, ProviderReport, SiteLogin, SweepError, SweepReport, SweepResult, SweepRunner,
};
