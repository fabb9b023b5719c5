use super::locator::Locator;
use super::params::{self, ParamDef, Params};
use super::steps::Step;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which of the two portals a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    /// Municipal self-service portal: monthly sworn declaration.
    Municipal,
    /// Provincial revenue portal: gross-income declaration.
    Revenue,
}

impl Site {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Municipal => "municipal",
            Self::Revenue => "revenue",
        }
    }
}

const MUNICIPAL_YAML: &str = include_str!("../../configs/municipal.yaml");
const REVENUE_YAML: &str = include_str!("../../configs/revenue.yaml");

/// A workflow definition: session setup, locator table and ordered phases.
///
/// Phases are kept as raw YAML and only substituted and deserialized when a
/// run asks for them, so values computed mid-run can feed later phases.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub name: String,
    pub site: Site,
    pub params: HashMap<String, ParamDef>,
    pub session: SessionConfig,
    pub downloads: DownloadsConfig,
    pub timeouts: Timeouts,
    pub locators: HashMap<String, Locator>,
    phases: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Deserialize)]
struct RawConfig {
    name: String,
    site: Site,
    #[serde(default)]
    params: HashMap<String, ParamDef>,
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    downloads: DownloadsConfig,
    #[serde(default)]
    timeouts: Timeouts,
    #[serde(default)]
    locators: HashMap<String, Locator>,
    #[serde(default)]
    phases: BTreeMap<String, serde_yaml::Value>,
}

impl WorkflowConfig {
    /// The workflow shipped with the binary for `site`.
    pub fn builtin(site: Site) -> Result<Self> {
        match site {
            Site::Municipal => Self::parse(MUNICIPAL_YAML),
            Site::Revenue => Self::parse(REVENUE_YAML),
        }
    }

    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse config from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        let config = Self {
            name: raw.name,
            site: raw.site,
            params: raw.params,
            session: raw.session,
            downloads: raw.downloads,
            timeouts: raw.timeouts,
            locators: raw.locators,
            phases: raw.phases,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        if self.phases.is_empty() {
            return Err(Error::Config("at least one phase is required".into()));
        }
        if self.session.mode == SessionMode::Attach && self.session.debug_address.is_empty() {
            return Err(Error::Config(
                "session.debug_address is required in attach mode".into(),
            ));
        }
        if self.timeouts.poll_ms == 0 {
            return Err(Error::Config("timeouts.poll_ms must be at least 1".into()));
        }
        for name in self.phases.keys() {
            self.build_phase(name, None)
                .map_err(|e| Error::Config(format!("phase '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Phase names in this workflow.
    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.phases.keys().map(|k| k.as_str())
    }

    pub fn has_phase(&self, name: &str) -> bool {
        self.phases.contains_key(name)
    }

    /// Substitute `params` into a phase and return its steps with every
    /// locator reference resolved.
    pub fn phase(&self, name: &str, params: &Params) -> Result<Vec<Step>> {
        self.build_phase(name, Some(params))
    }

    fn build_phase(&self, name: &str, params: Option<&Params>) -> Result<Vec<Step>> {
        let mut value = self
            .phases
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown phase '{}'", name)))?;
        if let Some(params) = params {
            params::substitute_value(&mut value, params, &self.params)?;
        }
        let mut steps: Vec<Step> = serde_yaml::from_value(value)?;
        for step in steps.iter_mut() {
            step.resolve(&self.locators)?;
        }
        Ok(steps)
    }

    /// Number of steps in a phase, without substitution.
    pub fn phase_len(&self, name: &str) -> usize {
        match self.phases.get(name) {
            Some(serde_yaml::Value::Sequence(seq)) => seq.len(),
            _ => 0,
        }
    }
}

/// How the Session Establisher obtains a browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Start a new browser and log in.
    #[default]
    Launch,
    /// Reuse a browser a human already logged in, via its debugging endpoint.
    Attach,
}

fn default_debug_address() -> String {
    "http://127.0.0.1:9222".into()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Browser session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub mode: SessionMode,

    /// Run without a window. Off by default so a human can step in.
    #[serde(default)]
    pub headless: bool,

    /// Debugging endpoint used in attach mode.
    #[serde(default = "default_debug_address")]
    pub debug_address: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            headless: false,
            debug_address: default_debug_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("descargas_rentas")
}
fn default_extensions() -> Vec<String> {
    vec!["xlsx".into(), "xls".into()]
}

/// Where downloaded spreadsheets land.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadsConfig {
    /// Final location of renamed downloads. Relative paths resolve against
    /// the working directory.
    #[serde(default = "default_downloads_dir")]
    pub dir: PathBuf,

    /// Directory the browser writes into, if it differs from `dir`.
    pub watch_dir: Option<PathBuf>,

    /// Extensions removed by `clear_downloads`.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: default_downloads_dir(),
            watch_dir: None,
            extensions: default_extensions(),
        }
    }
}

impl DownloadsConfig {
    pub fn watch_dir(&self) -> &Path {
        self.watch_dir.as_deref().unwrap_or(&self.dir)
    }
}

fn default_step_ms() -> u64 {
    30_000
}
fn default_download_ms() -> u64 {
    60_000
}
fn default_poll_ms() -> u64 {
    250
}

/// Bounds for every wait point.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    #[serde(default = "default_download_ms")]
    pub download_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step_ms: default_step_ms(),
            download_ms: default_download_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

impl Timeouts {
    pub fn step(&self, override_ms: Option<u64>) -> Duration {
        Duration::from_millis(override_ms.unwrap_or(self.step_ms))
    }

    pub fn download(&self, override_ms: Option<u64>) -> Duration {
        Duration::from_millis(override_ms.unwrap_or(self.download_ms))
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}
