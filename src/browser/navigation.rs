//! Page navigation and source reads
//!
//! Navigation is a single attempt with a timeout. A failed load is reported to
//! the caller; nothing here retries on its own.

use crate::browser::PageHandle;
use crate::error::{Error, NavigationError, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

const WAIT_FOR_LOAD: &str = r#"
    new Promise(resolve => {
        if (document.readyState === 'complete') {
            resolve(true);
        } else {
            window.addEventListener('load', () => resolve(true));
        }
    })
"#;

/// Options for page navigation
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    /// Timeout in milliseconds for the load and for the ready wait (default: 30000)
    pub timeout_ms: u64,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

/// URL validation utilities
pub struct UrlValidator;

impl UrlValidator {
    /// Validate a URL for navigation
    pub fn validate(url: &str) -> std::result::Result<(), String> {
        if url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }

        if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
        {
            return Err(format!(
                "URL must start with http://, https://, or file://: {}",
                url
            ));
        }

        if url.len() > 2048 {
            return Err("URL exceeds maximum length of 2048 characters".to_string());
        }

        Ok(())
    }
}

/// Page navigator
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate to a URL once and wait for the load event
    #[instrument(skip(page, options))]
    pub async fn goto(page: &PageHandle, url: &str, options: &NavigationOptions) -> Result<()> {
        let start = Instant::now();

        UrlValidator::validate(url).map_err(NavigationError::InvalidUrl)?;

        info!("Navigating to: {}", url);

        let timeout = Duration::from_millis(options.timeout_ms);
        tokio::time::timeout(timeout, page.page.goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(options.timeout_ms))?
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        tokio::time::timeout(timeout, page.page.evaluate(WAIT_FOR_LOAD))
            .await
            .map_err(|_| NavigationError::Timeout(options.timeout_ms))?
            .map_err(|e| Error::cdp(e.to_string()))?;

        debug!(duration_ms = start.elapsed().as_millis() as u64, "Navigation complete");
        Ok(())
    }

    /// Current rendered HTML of the page
    pub async fn page_source(page: &PageHandle) -> Result<String> {
        page.page
            .content()
            .await
            .map_err(|e| NavigationError::SourceUnavailable(e.to_string()).into())
    }
}
