use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::locator::{Locator, Target};
use crate::Result;

/// One instruction of a workflow phase.
#[derive(Debug, Clone)]
pub enum Step {
    // Navigation
    Goto(GotoStep),
    WaitForLoad(WaitForLoadStep),

    // Waiting
    WaitFor(WaitForStep),
    Pause(PauseStep),

    // Interaction
    Click(ClickStep),
    Fill(FillStep),
    Select(SelectStep),

    // Captures
    ExpectPopup(ExpectPopupStep),
    ExpectDownload(ExpectDownloadStep),
    ClearDownloads(ClearDownloadsStep),

    // Reporting
    Report(ReportStep),
    Checkpoint(CheckpointStep),
}

impl Step {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::WaitForLoad(_) => "wait_for_load",
            Self::WaitFor(_) => "wait_for",
            Self::Pause(_) => "pause",
            Self::Click(_) => "click",
            Self::Fill(_) => "fill",
            Self::Select(_) => "select",
            Self::ExpectPopup(_) => "expect_popup",
            Self::ExpectDownload(_) => "expect_download",
            Self::ClearDownloads(_) => "clear_downloads",
            Self::Report(_) => "report",
            Self::Checkpoint(_) => "checkpoint",
        }
    }

    /// Name plus the step's subject, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Goto(s) => format!("goto {}", s.url),
            Self::WaitFor(s) => format!("wait_for {} {}", s.target, s.state),
            Self::Click(s) => format!("click {}", s.target),
            Self::Fill(s) => format!("fill {}", s.target),
            Self::Select(s) => format!("select {}", s.target),
            Self::ExpectPopup(s) => format!("expect_popup via {}", s.trigger.describe()),
            Self::ExpectDownload(s) => format!("expect_download {}", s.save_as),
            Self::Checkpoint(s) => format!("checkpoint {}", s.label),
            other => other.name().to_string(),
        }
    }

    /// Swap locator-table names for the locators they refer to.
    pub fn resolve(&mut self, table: &HashMap<String, Locator>) -> Result<()> {
        match self {
            Self::WaitFor(s) => s.target.resolve(table),
            Self::Click(s) => s.target.resolve(table),
            Self::Fill(s) => s.target.resolve(table),
            Self::Select(s) => s.target.resolve(table),
            Self::ExpectPopup(s) => s.trigger.resolve(table),
            Self::ExpectDownload(s) => s.trigger.resolve(table),
            _ => Ok(()),
        }
    }
}

const STEP_NAMES: &[&str] = &[
    "goto",
    "wait_for_load",
    "wait_for",
    "pause",
    "click",
    "fill",
    "select",
    "expect_popup",
    "expect_download",
    "clear_downloads",
    "report",
    "checkpoint",
];

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StepVisitor)
    }
}

struct StepVisitor;

impl<'de> Visitor<'de> for StepVisitor {
    type Value = Step;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a step (bare name or map with a single key)")
    }

    fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "wait_for_load" => Ok(Step::WaitForLoad(WaitForLoadStep::default())),
            "clear_downloads" => Ok(Step::ClearDownloads(ClearDownloadsStep::default())),
            other => Err(de::Error::unknown_variant(
                other,
                &["wait_for_load", "clear_downloads"],
            )),
        }
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected step type key"))?;

        let step = match key.as_str() {
            "goto" => Step::Goto(map.next_value()?),
            "wait_for_load" => {
                let v: Option<WaitForLoadStep> = map.next_value()?;
                Step::WaitForLoad(v.unwrap_or_default())
            }
            "wait_for" => Step::WaitFor(map.next_value()?),
            "pause" => Step::Pause(map.next_value()?),
            "click" => Step::Click(map.next_value()?),
            "fill" => Step::Fill(map.next_value()?),
            "select" => Step::Select(map.next_value()?),
            "expect_popup" => Step::ExpectPopup(map.next_value()?),
            "expect_download" => Step::ExpectDownload(map.next_value()?),
            "clear_downloads" => {
                let v: Option<ClearDownloadsStep> = map.next_value()?;
                Step::ClearDownloads(v.unwrap_or_default())
            }
            "report" => Step::Report(map.next_value()?),
            "checkpoint" => Step::Checkpoint(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, STEP_NAMES)),
        };

        Ok(step)
    }
}

// --- Step payloads ---

#[derive(Debug, Clone, Deserialize)]
pub struct GotoStep {
    pub url: String,
}

/// Wait until the page stops loading resources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitForLoadStep {
    pub timeout_ms: Option<u64>,
}

/// Element condition a [`WaitForStep`] blocks on.
///
/// Written as a bare name (`visible`) or, for `populated`, as a map with
/// the minimum count (`populated: 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitState {
    /// Present in the document, possibly hidden.
    Attached,
    #[default]
    Visible,
    /// Absent or not rendered.
    Hidden,
    /// Visible and not disabled.
    Enabled,
    /// At least N options (for selects) or child elements.
    Populated(usize),
}

const WAIT_STATES: &[&str] = &["attached", "visible", "hidden", "enabled", "populated"];

impl<'de> Deserialize<'de> for WaitState {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(WaitStateVisitor)
    }
}

struct WaitStateVisitor;

impl<'de> Visitor<'de> for WaitStateVisitor {
    type Value = WaitState;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an element state name or { populated: N }")
    }

    fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "attached" => Ok(WaitState::Attached),
            "visible" => Ok(WaitState::Visible),
            "hidden" => Ok(WaitState::Hidden),
            "enabled" => Ok(WaitState::Enabled),
            "populated" => Ok(WaitState::Populated(1)),
            other => Err(de::Error::unknown_variant(other, WAIT_STATES)),
        }
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected element state key"))?;
        match key.as_str() {
            "populated" => Ok(WaitState::Populated(map.next_value()?)),
            other => Err(de::Error::unknown_variant(other, &["populated"])),
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attached => f.write_str("attached"),
            Self::Visible => f.write_str("visible"),
            Self::Hidden => f.write_str("hidden"),
            Self::Enabled => f.write_str("enabled"),
            Self::Populated(n) => write!(f, "populated with {}+ children", n),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitForStep {
    pub target: Target,
    #[serde(default)]
    pub state: WaitState,
    pub timeout_ms: Option<u64>,
}

/// Fixed delay. Prefer `wait_for` wherever a condition exists.
#[derive(Debug, Clone, Deserialize)]
pub struct PauseStep {
    pub ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickStep {
    pub target: Target,
    #[serde(default)]
    pub double: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillStep {
    pub target: Target,
    pub value: String,
    /// Keep the value out of logs.
    #[serde(default)]
    pub secret: bool,
}

/// Which option a select step picks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionChoice {
    Index(usize),
    Value(String),
    Label(String),
}

impl fmt::Display for OptionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "index {}", i),
            Self::Value(v) => write!(f, "value '{}'", v),
            Self::Label(l) => write!(f, "label '{}'", l),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawSelectStep")]
pub struct SelectStep {
    pub target: Target,
    pub choice: OptionChoice,
}

#[derive(Deserialize)]
struct RawSelectStep {
    target: Target,
    index: Option<usize>,
    value: Option<String>,
    label: Option<String>,
}

impl TryFrom<RawSelectStep> for SelectStep {
    type Error = String;

    fn try_from(raw: RawSelectStep) -> std::result::Result<Self, Self::Error> {
        let choice = match (raw.index, raw.value, raw.label) {
            (Some(i), None, None) => OptionChoice::Index(i),
            (None, Some(v), None) => OptionChoice::Value(v),
            (None, None, Some(l)) => OptionChoice::Label(l),
            _ => {
                return Err(format!(
                    "select {}: specify exactly one of 'index', 'value' or 'label'",
                    raw.target
                ))
            }
        };
        Ok(Self {
            target: raw.target,
            choice,
        })
    }
}

/// A single interaction used to trigger a popup or a download.
#[derive(Debug, Clone)]
pub enum Interaction {
    Click(ClickStep),
    Fill(FillStep),
    Select(SelectStep),
}

impl<'de> Deserialize<'de> for Interaction {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(InteractionVisitor)
    }
}

struct InteractionVisitor;

impl<'de> Visitor<'de> for InteractionVisitor {
    type Value = Interaction;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a click, fill or select map")
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected trigger type key"))?;
        match key.as_str() {
            "click" => Ok(Interaction::Click(map.next_value()?)),
            "fill" => Ok(Interaction::Fill(map.next_value()?)),
            "select" => Ok(Interaction::Select(map.next_value()?)),
            other => Err(de::Error::unknown_variant(
                other,
                &["click", "fill", "select"],
            )),
        }
    }
}

impl Interaction {
    pub fn describe(&self) -> String {
        match self {
            Self::Click(s) => format!("click {}", s.target),
            Self::Fill(s) => format!("fill {}", s.target),
            Self::Select(s) => format!("select {}", s.target),
        }
    }

    pub fn resolve(&mut self, table: &HashMap<String, Locator>) -> Result<()> {
        match self {
            Self::Click(s) => s.target.resolve(table),
            Self::Fill(s) => s.target.resolve(table),
            Self::Select(s) => s.target.resolve(table),
        }
    }
}

/// Fire `trigger` and make the window it opens the active page.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectPopupStep {
    pub trigger: Interaction,
    pub timeout_ms: Option<u64>,
}

/// Fire `trigger`, wait for the file, store it as `save_as` in the downloads directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectDownloadStep {
    pub trigger: Interaction,
    pub save_as: String,
    pub timeout_ms: Option<u64>,
}

/// Remove earlier downloads with these extensions. Empty means the
/// workflow's configured spreadsheet extensions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearDownloadsStep {
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Append a progress line to the run output.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportStep {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointStep {
    pub label: String,
}
