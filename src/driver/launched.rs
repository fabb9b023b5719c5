use eoka::{Browser, Page, StealthConfig};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::{dom, Driver, PageInfo};
use crate::config::{Locator, SessionConfig};
use crate::{Error, Result};

/// Network must stay quiet this long before a load counts as finished.
const IDLE_MS: u64 = 500;

/// A browser started for this run, headful unless configured otherwise.
pub struct LaunchedDriver {
    browser: Option<Browser>,
    page: Page,
}

impl LaunchedDriver {
    pub async fn launch(session: &SessionConfig) -> Result<Self> {
        let stealth = StealthConfig {
            headless: session.headless,
            ..Default::default()
        };
        let browser = tokio::time::timeout(
            session.connect_timeout(),
            Browser::launch_with_config(stealth),
        )
        .await
        .map_err(|_| Error::Connection("browser did not start in time".into()))?
        .map_err(|e| Error::Connection(format!("cannot launch browser: {}", e)))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Connection(format!("cannot open a page: {}", e)))?;
        Ok(Self {
            browser: Some(browser),
            page,
        })
    }

    fn browser(&self) -> Result<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| Error::ActionFailed("browser already closed".into()))
    }
}

impl Driver for LaunchedDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value> {
        Ok(self.page.evaluate::<serde_json::Value>(js).await?)
    }

    async fn pages(&self) -> Result<Vec<PageInfo>> {
        let tabs = self.browser()?.tabs().await?;
        Ok(tabs
            .into_iter()
            .map(|tab| PageInfo {
                id: tab.id,
                url: tab.url,
            })
            .collect())
    }

    // Popups are attached in place, never reopened by URL.
    async fn switch_to(&mut self, page: &PageInfo) -> Result<()> {
        let browser = self.browser()?;
        let attached = browser.attach_page(&page.id).await?;
        if let Err(e) = browser.activate_tab(&page.id).await {
            warn!("could not focus {}: {}", page.id, e);
        }
        debug!("switched to {} ({})", page.url, page.id);
        self.page = attached;
        Ok(())
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        debug!(
            "launched browser keeps its default download directory; watching {}",
            dir.display()
        );
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(browser) = self.browser.take() {
            browser.close().await?;
        }
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        let ms = timeout.as_millis() as u64;
        match tokio::time::timeout(timeout, self.page.wait_for_network_idle(IDLE_MS, ms)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::Timeout(format!(
                "network did not go idle within {}ms: {}",
                ms, e
            ))),
            Err(_) => Err(Error::Timeout(format!(
                "network did not go idle within {}ms",
                ms
            ))),
        }
    }

    async fn click(&self, locator: &Locator, double: bool) -> Result<()> {
        if double {
            return dom::click(self, locator, double).await;
        }
        // Native click at the element the probe script would pick.
        let (x, y) = dom::point(self, locator).await?;
        self.page.click_at(x, y).await?;
        Ok(())
    }
}
