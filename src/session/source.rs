//! Remote page sessions
//!
//! The controller only needs three things from a browser: go to a URL, read
//! the rendered page back, and let go. [`PageSource`] hands out such sessions;
//! the Chromium implementation launches one browser per session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::browser::{
    BrowserConfig, BrowserController, NavigationOptions, PageHandle, PageNavigator,
};
use crate::error::{BrowserError, Result};

/// Factory for remote page sessions
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Open a new session
    async fn acquire(&self) -> Result<Arc<dyn PageSession>>;
}

/// One open remote page
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Load `url` in the page
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current rendered HTML
    async fn page_source(&self) -> Result<String>;

    /// Close the session. Later calls are no-ops.
    async fn release(&self) -> Result<()>;
}

/// Sessions backed by a locally launched Chromium
#[derive(Debug, Clone)]
pub struct ChromiumPageSource {
    config: BrowserConfig,
    navigation: NavigationOptions,
}

impl ChromiumPageSource {
    /// Source launching browsers with `config`
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            navigation: NavigationOptions::default(),
        }
    }

    /// Override the navigation timeout
    pub fn with_navigation_timeout(mut self, timeout_ms: u64) -> Self {
        self.navigation.timeout_ms = timeout_ms;
        self
    }
}

#[async_trait]
impl PageSource for ChromiumPageSource {
    async fn acquire(&self) -> Result<Arc<dyn PageSession>> {
        let browser = BrowserController::with_config(self.config.clone()).await?;
        let page = match browser.new_page().await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "Failed to close browser after page error");
                }
                return Err(e);
            }
        };
        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(Some(browser)),
            page,
            navigation: self.navigation.clone(),
        }))
    }
}

/// A Chromium browser with one page
pub struct ChromiumSession {
    browser: Mutex<Option<BrowserController>>,
    page: PageHandle,
    navigation: NavigationOptions,
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        if self.browser.lock().await.is_none() {
            return Err(BrowserError::AlreadyClosed.into());
        }
        PageNavigator::goto(&self.page, url, &self.navigation).await
    }

    async fn page_source(&self) -> Result<String> {
        if self.browser.lock().await.is_none() {
            return Err(BrowserError::AlreadyClosed.into());
        }
        PageNavigator::page_source(&self.page).await
    }

    async fn release(&self) -> Result<()> {
        let browser = self.browser.lock().await.take();
        match browser {
            Some(browser) => browser.close().await,
            None => {
                debug!("Browser session already released");
                Ok(())
            }
        }
    }
}
