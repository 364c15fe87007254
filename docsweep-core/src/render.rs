//! Headless-browser print-to-PDF rendering.
//!
//! [`ChromiumRenderer`] drives a headless Chromium instance over CDP and
//! implements the [`PageRenderer`] contract. The browser session is a scoped
//! resource: callers must invoke [`ChromiumRenderer::close`] on every exit
//! path, success or failure.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::contract::{ClientError, PageRenderer};

/// Print-to-PDF options. The defaults match the fixed options the merger
/// has always used: no background graphics, no header/footer, CSS-defined
/// page size preferred, 100% scale.
#[derive(Debug, Clone)]
pub struct PrintOptions {
    pub print_background: bool,
    pub display_header_footer: bool,
    pub prefer_css_page_size: bool,
    pub scale: f64,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            print_background: false,
            display_header_footer: false,
            prefer_css_page_size: true,
            scale: 1.0,
        }
    }
}

impl PrintOptions {
    fn to_cdp(&self) -> PrintToPdfParams {
        PrintToPdfParams {
            print_background: Some(self.print_background),
            display_header_footer: Some(self.display_header_footer),
            prefer_css_page_size: Some(self.prefer_css_page_size),
            scale: Some(self.scale),
            ..Default::default()
        }
    }
}

/// Real [`PageRenderer`] over a headless Chromium session. One browser page
/// is reused for all navigations, mirroring a single driver window.
pub struct ChromiumRenderer {
    browser: Browser,
    page: Page,
    event_loop: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch a headless browser and open a blank page for rendering.
    pub async fn launch() -> Result<Self, ClientError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .build()
            .map_err(|e| -> ClientError { e.into() })?;
        let (browser, mut handler) = Browser::launch(config).await?;
        // The CDP handler must be polled for the lifetime of the connection.
        let event_loop = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let page = browser.new_page("about:blank").await?;
        info!("Launched headless Chromium for PDF rendering");
        Ok(Self {
            browser,
            page,
            event_loop,
        })
    }

    /// Shut the browser session down. Required on success and error paths
    /// alike.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            error!(error = ?e, "Failed to close browser session");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = ?e, "Browser process did not exit cleanly");
        }
        self.event_loop.abort();
        info!("Browser session closed");
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render_pdf(
        &self,
        url: &str,
        options: &PrintOptions,
    ) -> Result<Vec<u8>, ClientError> {
        debug!(url = %url, "Navigating to page");
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        let bytes = self.page.pdf(options.to_cdp()).await?;
        debug!(url = %url, bytes = bytes.len(), "Rendered page to PDF");
        Ok(bytes)
    }
}
