mod auth;
mod catalog;
mod classifier;
mod error;
mod model;
mod pagination;
mod recovery;
mod report;
mod runner;
mod traversal;

pub use auth::{Authenticator, Credentials, LoginRetry, SiteLogin};
pub use catalog::{CatalogNavigator, CatalogRoute, Renavigate};
pub use classifier::{ItemHandle, OutcomeClassifier};
pub use error::{SweepError, SweepResult};
pub use model::{
    EscalationCounter, FailureBudget, FailureKind, ItemKey, RecoveryReason, ResetMode,
    RetriedSet, Verdict,
};
pub use pagination::PaginationNavigator;
pub use recovery::{RecoveryManager, RecoveryOutcome, RecoveryRequest};
pub use report::{ItemRecord, ItemStatus, ProviderReport, SweepReport};
pub use runner::{select_providers, SweepRunner};
pub use traversal::TraversalController;
