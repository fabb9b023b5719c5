use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::config::{Locator, WaitState};
use crate::driver::{Driver, ElementState};
use crate::{Error, Result};

/// Poll `locator` until it reaches `state` or `timeout` elapses.
///
/// Probe errors (a page mid-navigation) count as "not yet" and are retried.
pub async fn wait_for<D: Driver>(
    driver: &D,
    locator: &Locator,
    state: WaitState,
    timeout: Duration,
    poll: Duration,
) -> Result<ElementState> {
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;
    let mut last = None;

    loop {
        polls += 1;
        match driver.probe(locator).await {
            Ok(seen) if seen.satisfies(state) => {
                debug!("{} is {} after {} poll(s)", locator, state, polls);
                return Ok(seen);
            }
            Ok(seen) => {
                trace!("{}: {:?}", locator, seen);
                last = Some(seen);
            }
            Err(e) => trace!("{}: probe failed: {}", locator, e),
        }

        if Instant::now() >= deadline {
            let seen = match last {
                Some(s) if !s.attached => "not in the page".to_string(),
                Some(s) => format!(
                    "visible={} enabled={} children={}",
                    s.visible, s.enabled, s.children
                ),
                None => "never probed".to_string(),
            };
            return Err(Error::Timeout(format!(
                "{} not {} within {}ms (last seen: {})",
                locator,
                state,
                timeout.as_millis(),
                seen
            )));
        }
        sleep(poll).await;
    }
}
