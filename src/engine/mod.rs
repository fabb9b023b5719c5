//! Runs workflow steps against one browser session.
//!
//! [`Engine`] owns the session for the length of a run and is the only
//! place that closes it. [`Sequencer`] walks one phase in order.

mod capture;
mod checkpoint;
mod report;
mod waiter;

pub use checkpoint::{CheckpointHook, ScreenshotDir};
pub use report::{Reporter, RunOutcome, Status};
pub use waiter::wait_for;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::steps::{ClickStep, FillStep, SelectStep};
use crate::config::{DownloadsConfig, Interaction, Params, Step, Timeouts, WorkflowConfig};
use crate::driver::Driver;
use crate::{Error, Result};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    SessionReady,
    Navigating,
    AwaitingElement,
    Interacting,
    PopupSwitch,
    DownloadWait,
    Submitted,
    Closed(Status),
}

/// One run's session plus everything the steps need around it.
pub struct Engine<D: Driver> {
    driver: D,
    reporter: Reporter,
    timeouts: Timeouts,
    downloads: DownloadsConfig,
    hook: Option<Arc<dyn CheckpointHook>>,
    cancel: CancellationToken,
    state: RunState,
    saved: Vec<PathBuf>,
    closed: bool,
}

impl<D: Driver> Engine<D> {
    /// Take ownership of a live session. `reporter` may already hold
    /// lines logged before the session existed.
    pub fn new(driver: D, reporter: Reporter, config: &WorkflowConfig) -> Self {
        Self {
            driver,
            reporter,
            timeouts: config.timeouts,
            downloads: config.downloads.clone(),
            hook: None,
            cancel: CancellationToken::new(),
            state: RunState::SessionReady,
            saved: Vec::new(),
            closed: false,
        }
    }

    pub fn with_checkpoints(mut self, hook: Option<Arc<dyn CheckpointHook>>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn mark_submitted(&mut self) {
        self.state = RunState::Submitted;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Append a progress line to the run output.
    pub fn report(&mut self, message: impl Into<String>) {
        self.reporter.push(message);
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// The most recent file stored by a download capture.
    pub fn last_download(&self) -> Option<&Path> {
        self.saved.last().map(|p| p.as_path())
    }

    /// Build a phase with `params` substituted and run it to the end.
    pub async fn run_phase(
        &mut self,
        config: &WorkflowConfig,
        phase: &str,
        params: &Params,
    ) -> Result<()> {
        let steps = config.phase(phase, params)?;
        info!("phase '{}': {} steps", phase, steps.len());
        Sequencer::new(phase, steps).run(self).await
    }

    /// Execute a single step.
    pub async fn execute(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Goto(s) => {
                self.state = RunState::Navigating;
                info!("goto: {}", s.url);
                self.driver.goto(&s.url).await?;
            }
            Step::WaitForLoad(s) => {
                self.state = RunState::Navigating;
                let timeout = self.timeouts.step(s.timeout_ms);
                debug!("wait_for_load: {}ms", timeout.as_millis());
                self.driver.wait_for_load(timeout).await?;
            }
            Step::WaitFor(s) => {
                self.state = RunState::AwaitingElement;
                debug!("wait_for: {} {}", s.target, s.state);
                wait_for(
                    &self.driver,
                    s.target.locator()?,
                    s.state,
                    self.timeouts.step(s.timeout_ms),
                    self.timeouts.poll(),
                )
                .await?;
            }
            Step::Pause(s) => {
                debug!("pause: {}ms", s.ms);
                tokio::time::sleep(std::time::Duration::from_millis(s.ms)).await;
            }
            Step::Click(s) => self.click(s).await?,
            Step::Fill(s) => self.fill(s).await?,
            Step::Select(s) => self.select(s).await?,
            Step::ExpectPopup(s) => self.expect_popup(s).await?,
            Step::ExpectDownload(s) => self.expect_download(s).await?,
            Step::ClearDownloads(s) => {
                let removed = self.clear_downloads(&s.extensions)?;
                debug!("clear_downloads: removed {} file(s)", removed);
            }
            Step::Report(s) => self.reporter.push(s.message.clone()),
            Step::Checkpoint(s) => self.checkpoint(&s.label).await,
        }
        Ok(())
    }

    async fn interact(&mut self, interaction: &Interaction) -> Result<()> {
        match interaction {
            Interaction::Click(s) => self.click(s).await,
            Interaction::Fill(s) => self.fill(s).await,
            Interaction::Select(s) => self.select(s).await,
        }
    }

    async fn click(&mut self, s: &ClickStep) -> Result<()> {
        self.state = RunState::Interacting;
        info!("{}: {}", if s.double { "dblclick" } else { "click" }, s.target);
        self.driver.click(s.target.locator()?, s.double).await
    }

    async fn fill(&mut self, s: &FillStep) -> Result<()> {
        self.state = RunState::Interacting;
        if s.secret {
            info!("fill: {} = ********", s.target);
        } else {
            info!("fill: {} = '{}'", s.target, s.value);
        }
        self.driver.fill(s.target.locator()?, &s.value).await
    }

    async fn select(&mut self, s: &SelectStep) -> Result<()> {
        self.state = RunState::Interacting;
        let label = self.driver.select(s.target.locator()?, &s.choice).await?;
        info!("select: {} {} -> '{}'", s.target, s.choice, label);
        Ok(())
    }

    /// Hand `label` and, when wanted, a screenshot to the checkpoint hook.
    pub async fn checkpoint(&mut self, label: &str) {
        let Some(hook) = self.hook.clone() else {
            debug!("checkpoint: {}", label);
            return;
        };
        let shot = if hook.wants_screenshot() {
            match self.driver.screenshot().await {
                Ok(png) => Some(png),
                Err(e) => {
                    warn!("checkpoint {}: screenshot failed: {}", label, e);
                    None
                }
            }
        } else {
            None
        };
        hook.reached(label, shot.as_deref());
    }

    /// Release the session. Later calls do nothing.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("closing session");
        let closed = self.driver.close().await;
        let status = if self.reporter.failed() || closed.is_err() {
            Status::Failed
        } else {
            Status::Success
        };
        self.state = RunState::Closed(status);
        closed
    }

    /// Record `result`, close the session and produce the run's outcome.
    pub async fn finish(mut self, result: Result<()>) -> RunOutcome {
        if let Err(e) = result {
            self.reporter.fail(e.to_string());
        }
        if let Err(e) = self.close().await {
            self.reporter.fail(format!("error closing browser: {}", e));
        }
        let outcome = self.reporter.finish();
        info!("run finished: {}", outcome.status);
        outcome
    }
}

/// Executes one phase's steps strictly in order.
///
/// The cursor only moves forward: a step that succeeded is never run again,
/// and running after a failure resumes at the step that failed.
#[derive(Debug)]
pub struct Sequencer {
    phase: String,
    steps: Vec<Step>,
    cursor: usize,
}

impl Sequencer {
    pub fn new(phase: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            phase: phase.into(),
            steps,
            cursor: 0,
        }
    }

    /// Number of steps completed.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    pub async fn run<D: Driver>(&mut self, engine: &mut Engine<D>) -> Result<()> {
        let total = self.steps.len();
        while let Some(step) = self.steps.get(self.cursor) {
            let index = self.cursor + 1;
            if engine.is_cancelled() {
                return Err(Error::Cancelled.in_step(&self.phase, index, step));
            }
            debug!("[{}] step {}/{}: {}", self.phase, index, total, step.describe());
            engine
                .execute(step)
                .await
                .map_err(|e| e.in_step(&self.phase, index, step))?;
            self.cursor += 1;
        }
        Ok(())
    }
}
