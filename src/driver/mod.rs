//! Browser backends.
//!
//! [`Driver`] is the seam between the engine and a live browser. The engine
//! only ever talks to the active page of one session.

mod attached;
pub mod dom;
mod launched;
mod script;

pub use attached::AttachedDriver;
pub use launched::LaunchedDriver;

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{Locator, OptionChoice, SessionConfig, SessionMode, WaitState};
use crate::Result;

/// What a probe saw of an element at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ElementState {
    pub attached: bool,
    pub visible: bool,
    pub enabled: bool,
    /// Options for a `<select>`, element children otherwise.
    pub children: usize,
}

impl ElementState {
    /// An element that is present, shown and usable, with no children.
    pub fn ready() -> Self {
        Self {
            attached: true,
            visible: true,
            enabled: true,
            children: 0,
        }
    }

    pub fn satisfies(&self, state: WaitState) -> bool {
        match state {
            WaitState::Attached => self.attached,
            WaitState::Visible => self.visible,
            WaitState::Hidden => !self.visible,
            WaitState::Enabled => self.visible && self.enabled,
            WaitState::Populated(n) => self.attached && self.children >= n,
        }
    }
}

/// A top-level browsing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub id: String,
    pub url: String,
}

impl PageInfo {
    /// Still on its initial empty document.
    pub fn is_blank(&self) -> bool {
        self.url.is_empty() || self.url == "about:blank"
    }
}

/// A controlled browser session.
#[allow(async_fn_in_trait)]
pub trait Driver {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Evaluate a JS expression on the active page and return its value.
    async fn evaluate(&self, js: &str) -> Result<serde_json::Value>;

    /// All open pages, including the active one.
    async fn pages(&self) -> Result<Vec<PageInfo>>;

    /// Make `page` the target of every later call.
    async fn switch_to(&mut self, page: &PageInfo) -> Result<()>;

    /// Ask the browser to save downloads into `dir`.
    async fn set_download_dir(&self, dir: &Path) -> Result<()>;

    /// PNG of the active page.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Release the session.
    async fn close(&mut self) -> Result<()>;

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        dom::wait_for_load(self, timeout).await
    }

    async fn probe(&self, locator: &Locator) -> Result<ElementState> {
        dom::probe(self, locator).await
    }

    async fn click(&self, locator: &Locator, double: bool) -> Result<()> {
        dom::click(self, locator, double).await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        dom::fill(self, locator, value).await
    }

    /// Returns the label of the option that ended up selected.
    async fn select(&self, locator: &Locator, choice: &OptionChoice) -> Result<String> {
        dom::select(self, locator, choice).await
    }
}

/// Produces a live session for a run.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Driver: Driver;

    async fn connect(&self, session: &SessionConfig) -> Result<Self::Driver>;
}

/// Either backend, picked by the session mode.
pub enum AnyDriver {
    Launched(LaunchedDriver),
    Attached(AttachedDriver),
}

impl Driver for AnyDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        match self {
            Self::Launched(d) => d.goto(url).await,
            Self::Attached(d) => d.goto(url).await,
        }
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value> {
        match self {
            Self::Launched(d) => d.evaluate(js).await,
            Self::Attached(d) => d.evaluate(js).await,
        }
    }

    async fn pages(&self) -> Result<Vec<PageInfo>> {
        match self {
            Self::Launched(d) => d.pages().await,
            Self::Attached(d) => d.pages().await,
        }
    }

    async fn switch_to(&mut self, page: &PageInfo) -> Result<()> {
        match self {
            Self::Launched(d) => d.switch_to(page).await,
            Self::Attached(d) => d.switch_to(page).await,
        }
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        match self {
            Self::Launched(d) => d.set_download_dir(dir).await,
            Self::Attached(d) => d.set_download_dir(dir).await,
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        match self {
            Self::Launched(d) => d.screenshot().await,
            Self::Attached(d) => d.screenshot().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Launched(d) => d.close().await,
            Self::Attached(d) => d.close().await,
        }
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        match self {
            Self::Launched(d) => d.wait_for_load(timeout).await,
            Self::Attached(d) => d.wait_for_load(timeout).await,
        }
    }

    async fn click(&self, locator: &Locator, double: bool) -> Result<()> {
        match self {
            Self::Launched(d) => d.click(locator, double).await,
            Self::Attached(d) => d.click(locator, double).await,
        }
    }
}

/// Launches or attaches to a real browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserConnector;

impl Connector for BrowserConnector {
    type Driver = AnyDriver;

    async fn connect(&self, session: &SessionConfig) -> Result<AnyDriver> {
        match session.mode {
            SessionMode::Launch => {
                info!("launching browser (headless: {})", session.headless);
                Ok(AnyDriver::Launched(LaunchedDriver::launch(session).await?))
            }
            SessionMode::Attach => {
                info!("attaching to browser at {}", session.debug_address);
                Ok(AnyDriver::Attached(AttachedDriver::connect(session).await?))
            }
        }
    }
}
