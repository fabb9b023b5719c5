use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::{Error, Result};

/// How to find an element on the page.
///
/// Serialized as a single-key map (`{ id: username }`, `{ xpath: "//td" }`),
/// which is also the shape the in-page finder script receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// Element id, without `#`.
    Id(String),
    /// CSS selector. The first visible match wins, then the first match.
    Css(String),
    /// XPath expression, same visibility preference as `css`.
    Xpath(String),
    /// Innermost element whose text contains this string (case-insensitive).
    Text(String),
    /// Child at `index` (zero-based) of the element found by `parent`.
    Nth { parent: Box<Locator>, index: usize },
}

const LOCATOR_KINDS: &[&str] = &["id", "css", "xpath", "text", "nth"];

#[derive(Deserialize)]
struct NthSpec {
    parent: Locator,
    index: usize,
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LocatorVisitor)
    }
}

struct LocatorVisitor;

impl<'de> Visitor<'de> for LocatorVisitor {
    type Value = Locator;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a locator map with a single key (id, css, xpath, text or nth)")
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected locator kind key"))?;

        let locator = match key.as_str() {
            "id" => Locator::Id(map.next_value()?),
            "css" => Locator::Css(map.next_value()?),
            "xpath" => Locator::Xpath(map.next_value()?),
            "text" => Locator::Text(map.next_value()?),
            "nth" => {
                let nth: NthSpec = map.next_value()?;
                Locator::Nth {
                    parent: Box::new(nth.parent),
                    index: nth.index,
                }
            }
            other => return Err(de::Error::unknown_variant(other, LOCATOR_KINDS)),
        };

        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "locator has more than one kind ('{}' and '{}')",
                key, extra
            )));
        }
        Ok(locator)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={}", id),
            Self::Css(css) => write!(f, "css={}", css),
            Self::Xpath(xpath) => write!(f, "xpath={}", xpath),
            Self::Text(text) => write!(f, "text='{}'", text),
            Self::Nth { parent, index } => write!(f, "child {} of {}", index, parent),
        }
    }
}

/// A step's element target: a name from the workflow's locator table, or an
/// inline locator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Named(String),
    Inline(Locator),
}

impl Target {
    /// Replace a table reference with the locator it names.
    pub fn resolve(&mut self, table: &HashMap<String, Locator>) -> Result<()> {
        if let Self::Named(name) = self {
            let locator = table
                .get(name.as_str())
                .ok_or_else(|| Error::Config(format!("unknown locator '{}'", name)))?;
            *self = Self::Inline(locator.clone());
        }
        Ok(())
    }

    pub fn locator(&self) -> Result<&Locator> {
        match self {
            Self::Inline(locator) => Ok(locator),
            Self::Named(name) => Err(Error::Config(format!(
                "locator '{}' was not resolved",
                name
            ))),
        }
    }
}

impl From<Locator> for Target {
    fn from(locator: Locator) -> Self {
        Self::Inline(locator)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "@{}", name),
            Self::Inline(locator) => locator.fmt(f),
        }
    }
}
