mod chromium;
mod diagnostics;
mod driver;
mod error;
mod poll;
mod session;

pub use chromium::{ChromiumDriver, ChromiumLauncher, ChromiumSessionFactory};
pub use diagnostics::{DiagnosticLabel, DiagnosticReason, DiagnosticSink};
pub use driver::{Driver, LoadCondition, SessionFactory};
pub use error::{BrowserError, BrowserResult};
pub use poll::{PollSpec, Poller};
pub use session::Session;
