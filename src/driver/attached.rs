use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::handler::Handler;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Driver, PageInfo};
use crate::config::SessionConfig;
use crate::{Error, Result};

/// A browser someone else started and logged in, reached over its
/// debugging endpoint. Closing only drops the connection.
pub struct AttachedDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl AttachedDriver {
    pub async fn connect(session: &SessionConfig) -> Result<Self> {
        let address = session.debug_address.as_str();
        let (mut browser, handler) =
            tokio::time::timeout(session.connect_timeout(), Browser::connect(address))
                .await
                .map_err(|_| Error::Connection(format!("no answer from {}", address)))?
                .map_err(|e| {
                    Error::Connection(format!(
                        "cannot reach a browser at {} (was it started with --remote-debugging-port?): {}",
                        address, e
                    ))
                })?;
        let handler = tokio::spawn(handler_loop(handler));

        // Tabs opened before we connected are only listed after a fetch.
        if let Err(e) = browser.fetch_targets().await {
            debug!("fetch_targets: {}", e);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let existing = browser.pages().await.map_err(|e| {
            handler.abort();
            Error::Connection(format!("cannot list pages: {}", e))
        })?;
        let page = match existing.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await?,
        };
        info!("attached to {}", page.url().await?.unwrap_or_default());

        Ok(Self {
            browser,
            page,
            handler,
        })
    }
}

async fn handler_loop(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if event.is_err() {
            break;
        }
    }
}

impl Driver for AttachedDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(js.to_string()).await?;
        Ok(result.into_value::<serde_json::Value>()?)
    }

    async fn pages(&self) -> Result<Vec<PageInfo>> {
        let mut out = Vec::new();
        for page in self.browser.pages().await? {
            out.push(PageInfo {
                id: page.target_id().inner().clone(),
                url: page.url().await?.unwrap_or_default(),
            });
        }
        Ok(out)
    }

    async fn switch_to(&mut self, target: &PageInfo) -> Result<()> {
        for page in self.browser.pages().await? {
            if page.target_id().inner() == &target.id {
                page.bring_to_front().await?;
                self.page = page;
                return Ok(());
            }
        }
        Err(Error::ActionFailed(format!("page {} is gone", target.id)))
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        let dir = std::path::absolute(dir)?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string())
            .build()
            .map_err(Error::ActionFailed)?;
        self.browser.execute(params).await?;
        debug!("downloads go to {}", dir.display());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self
            .page
            .screenshot(ScreenshotParams::builder().build())
            .await?)
    }

    async fn close(&mut self) -> Result<()> {
        self.handler.abort();
        debug!("detached from browser");
        Ok(())
    }
}
