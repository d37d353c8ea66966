//! Shared helpers for integration tests
//!
//! `FakeBrowser` serves a scripted site from memory so the crawl state
//! machine can be exercised without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use surface_scout::browser::{Browser, BrowserError, FormControl, FormSummary};
use surface_scout::config::CrawlerConfig;
use surface_scout::traffic::TrafficError;
use tokio::sync::oneshot;
use url::Url;

pub const ORIGIN: &str = "https://app.test";

/// Absolute URL on the scripted site
pub fn page(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

/// Crawler settings with every delay removed
pub fn fast_config(max_depth: u32) -> CrawlerConfig {
    CrawlerConfig {
        max_depth,
        politeness_delay_ms: 0,
        submit_settle_ms: 0,
        ..CrawlerConfig::default()
    }
}

#[derive(Debug, Clone, Default)]
struct FakePage {
    links: Vec<String>,
    forms: Vec<FormSummary>,
}

/// A [`Browser`] over an in-memory site
#[derive(Debug, Default)]
pub struct FakeBrowser {
    pages: HashMap<String, FakePage>,
    broken: HashSet<String>,
    current: Option<String>,
    capture_path: PathBuf,
    fail_finish: bool,
    interrupt_on: Option<(String, oneshot::Sender<()>)>,

    /// Every navigation, in order
    pub navigations: Vec<String>,

    /// `(form, control, value)` for every fill
    pub fills: Vec<(usize, usize, String)>,

    /// `(page, form, control)` for every click
    pub clicks: Vec<(String, usize, usize)>,

    pub finished: bool,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            capture_path: PathBuf::from("fake.har"),
            ..Self::default()
        }
    }

    /// Adds a page linking to `links` (absolute or relative to the origin)
    pub fn with_page(mut self, path: &str, links: &[&str]) -> Self {
        let links = links
            .iter()
            .map(|link| {
                if link.starts_with("http") {
                    link.to_string()
                } else {
                    page(link)
                }
            })
            .collect();
        self.pages.entry(page(path)).or_default().links = links;
        self
    }

    /// Adds a form to an existing page
    pub fn with_form(mut self, path: &str, form: FormSummary) -> Self {
        self.pages.entry(page(path)).or_default().forms.push(form);
        self
    }

    /// Makes navigation to `path` fail
    pub fn with_broken(mut self, path: &str) -> Self {
        self.broken.insert(page(path));
        self
    }

    /// Makes `finish_capture` fail
    pub fn failing_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }

    /// Returns a receiver that fires when `path` is navigated to
    pub fn interrupt_on(&mut self, path: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.interrupt_on = Some((page(path), tx));
        rx
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&mut self, url: &Url, _timeout: Duration) -> Result<(), BrowserError> {
        let url = url.as_str().to_string();
        self.navigations.push(url.clone());
        self.current = None;

        if matches!(&self.interrupt_on, Some((target, _)) if *target == url) {
            if let Some((_, tx)) = self.interrupt_on.take() {
                let _ = tx.send(());
            }
        }
        // Give a racing shutdown future the chance to run
        tokio::task::yield_now().await;

        if self.broken.contains(&url) || !self.pages.contains_key(&url) {
            return Err(BrowserError::Navigation {
                url,
                reason: "404".to_string(),
            });
        }
        self.current = Some(url);
        Ok(())
    }

    async fn links(&self) -> Result<Vec<Url>, BrowserError> {
        let current = self.current.as_ref().ok_or(BrowserError::NoPage)?;
        Ok(self.pages[current]
            .links
            .iter()
            .filter_map(|link| Url::parse(link).ok())
            .collect())
    }

    async fn forms(&self) -> Result<Vec<FormSummary>, BrowserError> {
        let current = self.current.as_ref().ok_or(BrowserError::NoPage)?;
        Ok(self.pages[current].forms.clone())
    }

    async fn fill(&mut self, form: usize, control: usize, value: &str) -> Result<(), BrowserError> {
        self.current.as_ref().ok_or(BrowserError::NoPage)?;
        self.fills.push((form, control, value.to_string()));
        Ok(())
    }

    async fn click(
        &mut self,
        form: usize,
        control: usize,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        let current = self.current.take().ok_or(BrowserError::NoPage)?;
        self.clicks.push((current, form, control));
        Ok(())
    }

    async fn finish_capture(&mut self) -> Result<(), BrowserError> {
        self.finished = true;
        if self.fail_finish {
            return Err(BrowserError::Capture(TrafficError::Write {
                path: self.capture_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            }));
        }
        Ok(())
    }

    fn capture_path(&self) -> &Path {
        &self.capture_path
    }
}

/// A text input control
pub fn input(index: usize, input_type: &str, name: &str) -> FormControl {
    FormControl {
        index,
        tag: "input".to_string(),
        input_type: Some(input_type.to_string()),
        name: Some(name.to_string()),
        visible: input_type != "hidden",
        submit_like: input_type == "submit",
    }
}

/// A `<button>` labelled as a submit control
pub fn submit_button(index: usize) -> FormControl {
    FormControl {
        index,
        tag: "button".to_string(),
        input_type: Some("submit".to_string()),
        name: None,
        visible: true,
        submit_like: true,
    }
}

/// A login form posting to `/login`
pub fn login_form(index: usize) -> FormSummary {
    FormSummary {
        index,
        method: "POST".to_string(),
        action: page("/login"),
        controls: vec![
            input(0, "text", "username"),
            input(1, "password", "password"),
            input(2, "hidden", "csrf"),
            submit_button(3),
        ],
    }
}
