//! Browser automation module
//!
//! Chromium control through ChromiumOxide: launch, page creation, navigation
//! and reading back the rendered page.

pub mod controller;
pub mod navigation;

pub use controller::{BrowserConfig, BrowserController, PageHandle};
pub use navigation::{NavigationOptions, PageNavigator, UrlValidator};
