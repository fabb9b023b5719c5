//! Scripted in-memory browser for engine and workflow tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use taxbot::{
    CheckpointHook, Connector, Driver, ElementState, Error, Locator, OptionChoice, PageInfo,
    Result, SessionConfig,
};

#[derive(Default)]
pub struct State {
    /// Everything the engine asked for, in order.
    pub calls: Vec<String>,
    /// Per-locator probe results. The last one sticks; unknown locators are
    /// visible and enabled.
    pub probes: HashMap<Locator, VecDeque<ElementState>>,
    pub missing: HashSet<Locator>,
    pub popups: HashMap<Locator, String>,
    pub downloads: HashMap<Locator, (String, Vec<u8>)>,
    pub pages: Vec<PageInfo>,
    pub active: usize,
    pub download_dir: Option<PathBuf>,
    pub close_count: usize,
    pub fail_close: bool,
    pub load_never_settles: bool,
}

#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        let state = State {
            pages: vec![PageInfo {
                id: "page-1".into(),
                url: "about:blank".into(),
            }],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn probes(self, locator: &Locator, seen: Vec<ElementState>) -> Self {
        self.state().probes.insert(locator.clone(), seen.into());
        self
    }

    pub fn missing(self, locator: &Locator) -> Self {
        self.state().missing.insert(locator.clone());
        self
    }

    pub fn popup_on(self, locator: &Locator, url: &str) -> Self {
        self.state().popups.insert(locator.clone(), url.to_string());
        self
    }

    pub fn download_on(self, locator: &Locator, name: &str, content: &[u8]) -> Self {
        self.state()
            .downloads
            .insert(locator.clone(), (name.to_string(), content.to_vec()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    pub fn active_url(&self) -> String {
        let state = self.state();
        state.pages[state.active].url.clone()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn interact(&self, locator: &Locator, call: String) -> Result<()> {
        let mut state = self.state();
        if state.missing.contains(locator) {
            return Err(Error::ElementNotFound(locator.to_string()));
        }
        state.calls.push(call);
        if let Some(url) = state.popups.get(locator).cloned() {
            let id = format!("page-{}", state.pages.len() + 1);
            state.pages.push(PageInfo { id, url });
        }
        if let Some((name, content)) = state.downloads.get(locator).cloned() {
            let dir = state
                .download_dir
                .clone()
                .ok_or_else(|| Error::ActionFailed("no download directory set".into()))?;
            std::fs::write(dir.join(name), content)?;
        }
        Ok(())
    }
}

impl Driver for MockDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("goto {}", url));
        let active = state.active;
        state.pages[active].url = url.to_string();
        Ok(())
    }

    async fn evaluate(&self, _js: &str) -> Result<serde_json::Value> {
        self.record("evaluate".into());
        Ok(serde_json::Value::Null)
    }

    async fn pages(&self) -> Result<Vec<PageInfo>> {
        Ok(self.state().pages.clone())
    }

    async fn switch_to(&mut self, page: &PageInfo) -> Result<()> {
        let mut state = self.state();
        let index = state
            .pages
            .iter()
            .position(|p| p.id == page.id)
            .ok_or_else(|| Error::ActionFailed(format!("page {} is gone", page.id)))?;
        state.active = index;
        state.calls.push(format!("switch_to {}", page.url));
        Ok(())
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        self.state().download_dir = Some(dir.to_path_buf());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.close_count += 1;
        state.calls.push("close".into());
        if state.fail_close {
            return Err(Error::ActionFailed("browser went away".into()));
        }
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        let never = {
            let mut state = self.state();
            state.calls.push("wait_for_load".into());
            state.load_never_settles
        };
        if never {
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout(format!(
                "page did not finish loading within {}ms",
                timeout.as_millis()
            )));
        }
        Ok(())
    }

    async fn probe(&self, locator: &Locator) -> Result<ElementState> {
        let mut state = self.state();
        if state.missing.contains(locator) {
            return Ok(ElementState::default());
        }
        let seen = match state.probes.get_mut(locator) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        Ok(seen.unwrap_or_else(ElementState::ready))
    }

    async fn click(&self, locator: &Locator, double: bool) -> Result<()> {
        let verb = if double { "dblclick" } else { "click" };
        self.interact(locator, format!("{} {}", verb, locator))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        self.interact(locator, format!("fill {} = {}", locator, value))
    }

    async fn select(&self, locator: &Locator, choice: &OptionChoice) -> Result<String> {
        self.interact(locator, format!("select {} {}", locator, choice))?;
        Ok("Declaración Jurada Mensual".into())
    }
}

/// Hands out clones of one [`MockDriver`], or fails like an unreachable browser.
#[derive(Clone)]
pub struct MockConnector {
    pub driver: MockDriver,
    pub fail: bool,
    pub connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(driver: MockDriver) -> Self {
        Self {
            driver,
            fail: false,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::new(MockDriver::new())
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Driver = MockDriver;

    async fn connect(&self, session: &SessionConfig) -> Result<MockDriver> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Connection(format!(
                "cannot reach a browser at {}",
                session.debug_address
            )));
        }
        Ok(self.driver.clone())
    }
}

/// Records checkpoint labels instead of writing files.
#[derive(Clone, Default)]
pub struct RecordingHook {
    pub labels: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}

impl CheckpointHook for RecordingHook {
    fn reached(&self, label: &str, _screenshot: Option<&[u8]>) {
        self.labels.lock().unwrap().push(label.to_string());
    }
}

/// Probe result for an element that is shown and usable.
pub fn visible() -> ElementState {
    ElementState::ready()
}

pub fn hidden() -> ElementState {
    ElementState {
        attached: true,
        ..Default::default()
    }
}

/// A visible `<select>` with `n` options.
pub fn with_options(n: usize) -> ElementState {
    ElementState {
        children: n,
        ..ElementState::ready()
    }
}
