//! Browser capability used by the crawler
//!
//! The crawler only needs a narrow set of operations from a browser: load a
//! page, list its links and form controls, fill and click controls, and
//! flush the recorded traffic at the end of a session. [`Browser`] captures
//! exactly that, so the crawl state machine can be driven by headless
//! Chromium ([`ChromiumBrowser`]), by plain HTTP fetches ([`HttpBrowser`])
//! when no Chromium is available, or by a scripted fake in tests.

mod chromium;
mod http;
mod parser;
mod recorder;

pub use chromium::ChromiumBrowser;
pub use http::{BrowserOptions, HttpBrowser};

use crate::traffic::{TrafficError, TrafficLog};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised by a browser session
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Navigation to {url} timed out after {}ms", timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("No page is loaded")]
    NoPage,

    #[error("Form {form} has no control {control}")]
    NoSuchControl { form: usize, control: usize },

    #[error("Control {control} of form {form} cannot hold a value")]
    NotFillable { form: usize, control: usize },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to launch Chromium: {0}")]
    Launch(String),

    #[error("DevTools error: {0}")]
    DevTools(#[from] chromiumoxide::error::CdpError),

    #[error("Page script returned unexpected data: {0}")]
    Script(String),

    #[error("Failed to write captured traffic: {0}")]
    Capture(#[from] TrafficError),
}

/// One interactive element of a form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormControl {
    /// Position within the form's controls, used to address it
    pub index: usize,

    /// Element name (`input`, `textarea`, `select`, `button`)
    pub tag: String,

    /// Lowercased `type` attribute, if present
    pub input_type: Option<String>,

    /// `name` attribute, if present
    pub name: Option<String>,

    /// Whether the control would be rendered visibly
    pub visible: bool,

    /// Whether clicking the control submits the form
    pub submit_like: bool,
}

/// A form on the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSummary {
    /// Position of the form on the page, used to address it
    pub index: usize,

    /// Uppercased submission method
    pub method: String,

    /// Absolute submission URL
    pub action: String,

    pub controls: Vec<FormControl>,
}

/// A browsing session that records every exchange it makes
#[async_trait]
pub trait Browser: Send {
    /// Loads `url`, waiting at most `timeout` for it to settle
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), BrowserError>;

    /// Absolute hyperlinks on the current page, in document order
    async fn links(&self) -> Result<Vec<Url>, BrowserError>;

    /// Forms on the current page, in document order
    async fn forms(&self) -> Result<Vec<FormSummary>, BrowserError>;

    /// Sets the value of a form control
    async fn fill(&mut self, form: usize, control: usize, value: &str)
        -> Result<(), BrowserError>;

    /// Clicks a form control, waiting at most `timeout` for the result
    async fn click(
        &mut self,
        form: usize,
        control: usize,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    /// Ends the recording session and flushes the traffic log
    async fn finish_capture(&mut self) -> Result<(), BrowserError>;

    /// Where the traffic log is written
    fn capture_path(&self) -> &Path;
}

/// Loads the HAR file a resumed crawl continues, or an empty log if none
pub fn load_existing_capture(path: &Path) -> Result<TrafficLog, BrowserError> {
    if !path.exists() {
        return Ok(TrafficLog::new());
    }
    let log = TrafficLog::load(path)?;
    tracing::info!(
        "Continuing traffic log {} ({} entries)",
        path.display(),
        log.len()
    );
    Ok(log)
}
