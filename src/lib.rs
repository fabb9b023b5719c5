//! # taxbot
//!
//! Drives the municipal and provincial revenue tax portals through a real
//! browser and reports every run as a `(status, output, error)` triple.
//!
//! Workflows are YAML data: a locator table plus named phases of steps. The
//! engine runs the steps strictly in order, pairs each transition with an
//! explicit completion condition, and always closes the session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taxbot::{Bot, Credentials, RunRequest, Site};
//!
//! # #[tokio::main]
//! # async fn main() -> taxbot::Result<()> {
//! let bot = Bot::for_site(Site::Municipal)?;
//! let request = RunRequest::municipal(Credentials::new("user", "secret"), "1500.00");
//! let outcome = bot.run(request).await;
//! println!("{}: {}", outcome.status, outcome.output);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod workflow;

pub use config::{
    DownloadsConfig, Interaction, Locator, OptionChoice, ParamDef, Params, SessionConfig,
    SessionMode, Site, Step, Target, Timeouts, WaitState, WorkflowConfig,
};
pub use driver::{AnyDriver, BrowserConnector, Connector, Driver, ElementState, PageInfo};
pub use engine::{
    CheckpointHook, Engine, Reporter, RunOutcome, RunState, ScreenshotDir, Sequencer, Status,
};
pub use workflow::{
    run_municipal, run_revenue, run_revenue_standalone, Bot, Credentials, Ingestor, RunRequest,
};

/// Result type for taxbot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a workflow or running it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("spreadsheet error: {0}")]
    Data(#[from] taxbot_sheets::SheetError),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("{phase} step {index} ({step}): {source}")]
    Step {
        phase: String,
        index: usize,
        step: String,
        #[source]
        source: Box<Error>,
    },
}

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A wait condition was not met within its bound.
    Timeout,
    /// A locator matched nothing when an interaction was attempted.
    ElementNotFound,
    /// No browser could be launched or reached.
    Connection,
    /// The spreadsheet could not be read, or had nothing to declare.
    Data,
    Unclassified,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::ElementNotFound(_) => ErrorKind::ElementNotFound,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Data(_) => ErrorKind::Data,
            Self::Browser(eoka::Error::ElementNotFound(_)) => ErrorKind::ElementNotFound,
            Self::Step { source, .. } => source.kind(),
            _ => ErrorKind::Unclassified,
        }
    }

    /// Wrap a step failure so its message names the phase and step.
    pub fn in_step(self, phase: &str, index: usize, step: &Step) -> Self {
        Self::Step {
            phase: phase.to_string(),
            index,
            step: step.describe(),
            source: Box::new(self),
        }
    }
}
