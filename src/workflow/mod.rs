//! The two site workflows and their entry points.

mod municipal;
mod period;
mod revenue;

pub use period::Period;
pub use revenue::format_amount;

use chrono::{Local, NaiveDate};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taxbot_sheets::Aggregate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Params, SessionMode, Site, WorkflowConfig};
use crate::driver::{BrowserConnector, Connector};
use crate::engine::{CheckpointHook, Engine, Reporter, RunOutcome};
use crate::{Error, Result};

/// Reads a spreadsheet into per-category totals.
pub type Ingestor = Arc<dyn Fn(&Path) -> taxbot_sheets::Result<Aggregate> + Send + Sync>;

/// Portal login. The password never appears in `Debug` output.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Everything one run needs from its caller.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub site: Site,
    pub credentials: Credentials,
    /// Decimal amount, `1500.00` or `1500,00`. Empty means the workflow default.
    pub amount: String,
    /// Pre-downloaded spreadsheet; skips the download phase.
    pub spreadsheet: Option<PathBuf>,
    /// Press the final submit control instead of stopping at the filled form.
    pub submit: bool,
}

impl RunRequest {
    pub fn municipal(credentials: Credentials, amount: impl Into<String>) -> Self {
        Self {
            site: Site::Municipal,
            credentials,
            amount: amount.into(),
            spreadsheet: None,
            submit: false,
        }
    }

    pub fn revenue(amount: impl Into<String>) -> Self {
        Self {
            site: Site::Revenue,
            credentials: Credentials::default(),
            amount: amount.into(),
            spreadsheet: None,
            submit: false,
        }
    }

    pub fn with_spreadsheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.spreadsheet = Some(path.into());
        self
    }

    pub fn with_submission(mut self, submit: bool) -> Self {
        self.submit = submit;
        self
    }
}

/// Check that `amount` is a plain decimal: digits, optionally followed by
/// `.` or `,` and one or two more digits.
pub fn validate_amount(amount: &str) -> Result<()> {
    let (whole, fraction) = match amount.split_once(['.', ',']) {
        Some((w, f)) => (w, Some(f)),
        None => (amount, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let ok = digits(whole) && fraction.map_or(true, |f| digits(f) && f.len() <= 2);
    if ok {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "amount '{}' is not a decimal like 1500.00",
            amount
        )))
    }
}

/// Runs one workflow. Built once per run and consumed by [`Bot::run`].
pub struct Bot<C: Connector = BrowserConnector> {
    config: WorkflowConfig,
    connector: C,
    hook: Option<Arc<dyn CheckpointHook>>,
    cancel: CancellationToken,
    ingest: Ingestor,
    today: Option<NaiveDate>,
}

impl Bot<BrowserConnector> {
    /// Bot for the built-in workflow of `site`, driving a real browser.
    pub fn for_site(site: Site) -> Result<Self> {
        Ok(Self::new(WorkflowConfig::builtin(site)?, BrowserConnector))
    }
}

impl<C: Connector> Bot<C> {
    pub fn new(config: WorkflowConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            hook: None,
            cancel: CancellationToken::new(),
            ingest: Arc::new(|path: &Path| taxbot_sheets::ingest(path)),
            today: None,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn with_checkpoints(mut self, hook: impl CheckpointHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replace the spreadsheet reader.
    pub fn with_ingestor(
        mut self,
        ingest: impl Fn(&Path) -> taxbot_sheets::Result<Aggregate> + Send + Sync + 'static,
    ) -> Self {
        self.ingest = Arc::new(ingest);
        self
    }

    /// Fix the date the declared period is computed from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Execute `request` end to end. Never fails: every problem ends up in
    /// the outcome's error.
    pub async fn run(self, request: RunRequest) -> RunOutcome {
        info!("{}: starting '{}'", request.site.as_str(), self.config.name);
        if request.site != self.config.site {
            let mut reporter = Reporter::new();
            reporter.fail(
                Error::Config(format!(
                    "workflow '{}' drives the {} portal, not {}",
                    self.config.name,
                    self.config.site.as_str(),
                    request.site.as_str()
                ))
                .to_string(),
            );
            return reporter.finish();
        }
        match request.site {
            Site::Municipal => municipal::run(&self, &request).await,
            Site::Revenue => revenue::run(&self, &request).await,
        }
    }

    fn params(&self, request: &RunRequest) -> Result<Params> {
        let mut params = Params::new();
        if !request.credentials.username.is_empty() {
            params.insert("username", request.credentials.username.clone());
            params.insert("password", request.credentials.password().to_string());
        }
        let amount = request.amount.trim();
        if !amount.is_empty() {
            validate_amount(amount)?;
            params.insert("amount", amount);
        }
        let period = match self.today {
            Some(today) => Period::previous_month(today),
            None => Period::previous_month(Local::now().date_naive()),
        };
        period.insert_into(&mut params);
        Ok(params)
    }

    /// Connect a session. On failure the returned outcome holds the
    /// connection error and no step has run.
    async fn establish(
        &self,
        mut reporter: Reporter,
    ) -> std::result::Result<Engine<C::Driver>, RunOutcome> {
        if self.cancel.is_cancelled() {
            reporter.fail(Error::Cancelled.to_string());
            return Err(reporter.finish());
        }
        match self.connector.connect(&self.config.session).await {
            Ok(driver) => Ok(Engine::new(driver, reporter, &self.config)
                .with_checkpoints(self.hook.clone())
                .with_cancellation(self.cancel.clone())),
            Err(e) => {
                reporter.fail(e.to_string());
                Err(reporter.finish())
            }
        }
    }

    /// A launched browser starts logged out; run the workflow's login phase.
    async fn login(&self, engine: &mut Engine<C::Driver>, params: &Params) -> Result<()> {
        if self.config.session.mode != SessionMode::Launch || !self.config.has_phase("login") {
            debug!("no login phase to run");
            return Ok(());
        }
        engine.run_phase(&self.config, "login", params).await
    }
}

fn failed(error: Error) -> RunOutcome {
    let mut reporter = Reporter::new();
    reporter.fail(error.to_string());
    reporter.finish()
}

/// Municipal monthly declaration with the legacy call shape.
/// `driver_path` is accepted and ignored.
pub async fn run_municipal(
    username: &str,
    password: &str,
    amount: &str,
    driver_path: Option<&str>,
) -> (String, String, String) {
    if let Some(path) = driver_path {
        debug!("ignoring driver path {}", path);
    }
    let request = RunRequest::municipal(Credentials::new(username, password), amount);
    match Bot::for_site(Site::Municipal) {
        Ok(bot) => bot.run(request).await.into_tuple(),
        Err(e) => failed(e).into_tuple(),
    }
}

/// Revenue declaration with the legacy call shape: downloads the
/// spreadsheet first and saves the declaration. The credentials are unused,
/// the attached browser is already logged in.
pub async fn run_revenue(
    _username: &str,
    _password: &str,
    amount: &str,
    driver_path: Option<&str>,
) -> (String, String, String) {
    if let Some(path) = driver_path {
        debug!("ignoring driver path {}", path);
    }
    let request = RunRequest::revenue(amount).with_submission(true);
    match Bot::for_site(Site::Revenue) {
        Ok(bot) => bot.run(request).await.into_tuple(),
        Err(e) => failed(e).into_tuple(),
    }
}

/// Revenue declaration from an optional pre-downloaded spreadsheet.
pub async fn run_revenue_standalone(spreadsheet: Option<&Path>) -> (String, String, String) {
    let mut request = RunRequest::revenue("").with_submission(true);
    if let Some(path) = spreadsheet {
        request = request.with_spreadsheet(path);
    }
    match Bot::for_site(Site::Revenue) {
        Ok(bot) => bot.run(request).await.into_tuple(),
        Err(e) => failed(e).into_tuple(),
    }
}
