//! Element probing and interaction built on [`Driver::evaluate`].
//!
//! The trait's provided methods forward here, so a backend that overrides
//! one of them can still fall back to the script version.

use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::script::{self, Outcome};
use super::{Driver, ElementState};
use crate::config::{Locator, OptionChoice};
use crate::{Error, Result};

/// How long the resource count must stay unchanged to count as idle.
const QUIET_PERIOD: Duration = Duration::from_millis(500);
const LOAD_POLL: Duration = Duration::from_millis(100);

pub async fn probe<D: Driver + ?Sized>(driver: &D, locator: &Locator) -> Result<ElementState> {
    let js = script::build(script::PROBE, &json!({ "locator": locator }));
    let value = driver.evaluate(&js).await?;
    Ok(serde_json::from_value(value)?)
}

pub async fn click<D: Driver + ?Sized>(driver: &D, locator: &Locator, double: bool) -> Result<()> {
    let js = script::build(script::CLICK, &json!({ "locator": locator, "double": double }));
    Outcome::check(driver.evaluate(&js).await?, &locator.to_string())?;
    Ok(())
}

/// Viewport coordinates of the element's center, scrolled into view.
pub async fn point<D: Driver + ?Sized>(driver: &D, locator: &Locator) -> Result<(f64, f64)> {
    let js = script::build(script::POINT, &json!({ "locator": locator }));
    let outcome = Outcome::check(driver.evaluate(&js).await?, &locator.to_string())?;
    let [x, y] = outcome
        .point
        .ok_or_else(|| Error::ActionFailed(format!("{}: no position returned", locator)))?;
    Ok((x, y))
}

pub async fn fill<D: Driver + ?Sized>(driver: &D, locator: &Locator, value: &str) -> Result<()> {
    let js = script::build(script::FILL, &json!({ "locator": locator, "value": value }));
    Outcome::check(driver.evaluate(&js).await?, &locator.to_string())?;
    Ok(())
}

/// Select an option and return its visible label.
pub async fn select<D: Driver + ?Sized>(
    driver: &D,
    locator: &Locator,
    choice: &OptionChoice,
) -> Result<String> {
    let js = script::build(script::SELECT, &json!({ "locator": locator, "choice": choice }));
    let outcome = Outcome::check(driver.evaluate(&js).await?, &locator.to_string())?;
    Ok(outcome.label.unwrap_or_default())
}

/// Poll until the document is complete and no new resources have been
/// requested for a short quiet period.
pub async fn wait_for_load<D: Driver + ?Sized>(driver: &D, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut last_count: Option<u64> = None;
    let mut quiet_since = Instant::now();

    loop {
        // Navigation in flight makes evaluate fail; treat that as not ready.
        let state = driver.evaluate(&script::build(script::LOAD_STATE, &json!({}))).await;
        let now = Instant::now();
        match state {
            Ok(value) => {
                let ready = value.get("ready").and_then(|v| v.as_str()) == Some("complete");
                let count = value.get("resources").and_then(|v| v.as_u64());
                if !ready || count != last_count {
                    last_count = count;
                    quiet_since = now;
                } else if now.duration_since(quiet_since) >= QUIET_PERIOD {
                    return Ok(());
                }
            }
            Err(e) => {
                debug!("load state unavailable: {}", e);
                last_count = None;
                quiet_since = now;
            }
        }

        if now >= deadline {
            return Err(Error::Timeout(format!(
                "page did not finish loading within {}ms",
                timeout.as_millis()
            )));
        }
        sleep(LOAD_POLL).await;
    }
}
