//! Crawler coordinator - the crawl state machine
//!
//! This module owns the frontier and drives a [`Browser`] through it:
//! - Dequeuing URLs breadth-first and skipping visited or too-deep ones
//! - Enqueuing same-origin, non-asset links one level deeper
//! - Filling and submitting forms to provoke write traffic
//! - Checkpointing the frontier after every processed URL
//! - Finalizing the traffic capture on every exit path

use crate::browser::Browser;
use crate::config::CrawlerConfig;
use crate::crawler::forms::canned_value;
use crate::state::{CrawlState, Frontier};
use crate::storage::{CheckpointKey, CheckpointStore};
use crate::url::{is_crawlable, normalize_url};
use crate::{Result, ScoutError};
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Summary of one crawl run
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    /// State the session ended in
    pub state: CrawlState,

    /// URLs processed during this run, in processing order
    pub visited: Vec<String>,

    /// URLs whose navigation failed and were dropped
    pub failed: Vec<String>,

    /// Forms whose submit control was clicked successfully
    pub forms_submitted: usize,

    /// Links added to the frontier
    pub links_enqueued: usize,

    /// URLs still waiting when the run ended
    pub remaining: usize,
}

/// Main crawler structure
pub struct Crawler<B: Browser> {
    browser: B,
    config: CrawlerConfig,
    start: Url,
    key: CheckpointKey,
    frontier: Frontier,
    state: CrawlState,
    checkpoint: Option<Box<dyn CheckpointStore + Send>>,
    visited: Vec<String>,
    failed: Vec<String>,
    forms_submitted: usize,
    links_enqueued: usize,
}

impl<B: Browser> Crawler<B> {
    /// Creates an idle crawler whose frontier holds only the start URL
    ///
    /// # Arguments
    ///
    /// * `browser` - The browsing session to drive
    /// * `start_url` - Where the crawl begins; also fixes the crawl origin
    /// * `config` - Depth limit, timeouts and delays
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Crawler in the `Idle` state
    /// * `Err(ScoutError)` - The start URL is not an absolute http(s) URL
    pub fn new(browser: B, start_url: &str, config: &CrawlerConfig) -> Result<Self> {
        let start = normalize_url(start_url)?;
        let key = CheckpointKey::new(start.as_str(), config.max_depth);

        Ok(Self {
            browser,
            config: config.clone(),
            frontier: Frontier::new(start.as_str()),
            start,
            key,
            state: CrawlState::Idle,
            checkpoint: None,
            visited: Vec::new(),
            failed: Vec::new(),
            forms_submitted: 0,
            links_enqueued: 0,
        })
    }

    /// Persists the frontier to `store` after every processed URL
    pub fn with_checkpoint<S>(mut self, store: S) -> Self
    where
        S: CheckpointStore + Send + 'static,
    {
        self.checkpoint = Some(Box::new(store));
        self
    }

    /// Replaces the fresh frontier with the one saved in the checkpoint
    ///
    /// Without a saved checkpoint the crawler starts fresh. A checkpoint
    /// written for a different start URL or depth limit is refused.
    pub fn resume(mut self) -> Result<Self> {
        let Some(store) = self.checkpoint.as_mut() else {
            tracing::warn!("Resume requested without a checkpoint store; starting fresh");
            return Ok(self);
        };

        match store.load()? {
            None => {
                tracing::info!("No checkpoint found, starting fresh crawl");
            }
            Some(saved) if saved.key.fingerprint != self.key.fingerprint => {
                return Err(ScoutError::CheckpointMismatch {
                    start_url: saved.key.start_url,
                });
            }
            Some(saved) => {
                tracing::info!(
                    "Resuming crawl: {} visited, {} queued",
                    saved.frontier.visited_len(),
                    saved.frontier.queue_len()
                );
                self.frontier = saved.frontier;
                self.state = CrawlState::Interrupted;
            }
        }
        Ok(self)
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn into_browser(self) -> B {
        self.browser
    }

    /// Runs the crawl until the frontier is exhausted
    pub async fn run(&mut self) -> Result<CrawlReport> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs the crawl until the frontier is exhausted or `shutdown` resolves
    ///
    /// The traffic capture is finalized on both paths. A finalization
    /// failure is returned as [`ScoutError::CaptureFinalize`]. The checkpoint
    /// is deleted only when the frontier was exhausted.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<CrawlReport>
    where
        F: Future<Output = ()>,
    {
        self.transition(CrawlState::Running)?;
        tracing::info!(
            "Starting crawl of {} (max depth {}, {} queued)",
            self.start,
            self.config.max_depth,
            self.frontier.queue_len()
        );

        let completed = tokio::select! {
            () = self.crawl_loop() => true,
            () = shutdown => {
                tracing::warn!("Interrupt received, stopping crawl");
                false
            }
        };

        let finalized = self.browser.finish_capture().await;

        if completed {
            self.transition(CrawlState::Completed)?;
        } else {
            self.transition(CrawlState::Interrupted)?;
        }

        if let Err(source) = finalized {
            tracing::error!("Failed to finalize traffic capture: {}", source);
            return Err(ScoutError::CaptureFinalize {
                path: self.browser.capture_path().to_path_buf(),
                source,
            });
        }

        if completed {
            if let Some(store) = self.checkpoint.as_mut() {
                if let Err(e) = store.clear() {
                    tracing::warn!("Failed to remove checkpoint: {}", e);
                }
            }
            tracing::info!("Crawl complete: {} pages visited", self.visited.len());
        } else {
            tracing::info!(
                "Crawl interrupted with {} URLs queued; checkpoint kept for resume",
                self.frontier.queue_len()
            );
        }

        Ok(self.report())
    }

    fn report(&self) -> CrawlReport {
        CrawlReport {
            state: self.state,
            visited: self.visited.clone(),
            failed: self.failed.clone(),
            forms_submitted: self.forms_submitted,
            links_enqueued: self.links_enqueued,
            remaining: self.frontier.queue_len(),
        }
    }

    fn transition(&mut self, next: CrawlState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ScoutError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Crawl state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    async fn crawl_loop(&mut self) {
        let delay = Duration::from_millis(self.config.politeness_delay_ms);

        while let Some((url, depth)) = self.frontier.pop() {
            if self.frontier.is_visited(&url) {
                tracing::trace!("Skipping already visited {}", url);
                continue;
            }
            if depth > self.config.max_depth {
                tracing::trace!("Skipping {} beyond max depth ({})", url, depth);
                continue;
            }

            self.frontier.mark_visited(url.clone());
            self.process_url(&url, depth).await;
            self.save_checkpoint();

            if !self.frontier.is_exhausted() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!("Frontier is empty");
    }

    /// Navigates to one URL, then harvests its links and forms
    ///
    /// Every failure here is confined to this URL.
    async fn process_url(&mut self, url: &str, depth: u32) {
        tracing::info!("Crawling {} (depth {})", url, depth);
        self.visited.push(url.to_string());

        let target = match Url::parse(url) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("Dropping unparseable URL {}: {}", url, e);
                self.failed.push(url.to_string());
                return;
            }
        };

        let timeout = Duration::from_millis(self.config.navigation_timeout_ms);
        if let Err(e) = self.browser.navigate(&target, timeout).await {
            tracing::warn!("Failed to load {}: {}", url, e);
            self.failed.push(url.to_string());
            return;
        }

        if depth < self.config.max_depth {
            self.enqueue_links(depth).await;
        }

        self.submit_forms(&target).await;
    }

    async fn enqueue_links(&mut self, depth: u32) {
        let links = match self.browser.links().await {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!("Failed to list links: {}", e);
                return;
            }
        };

        for link in links {
            let canonical = match normalize_url(link.as_str()) {
                Ok(canonical) => canonical,
                Err(e) => {
                    tracing::trace!("Ignoring link {}: {}", link, e);
                    continue;
                }
            };

            if !is_crawlable(&canonical, &self.start) {
                tracing::trace!("Not crawlable: {}", canonical);
                continue;
            }

            if self.frontier.enqueue(canonical.as_str(), depth + 1) {
                tracing::debug!("Enqueued {} at depth {}", canonical, depth + 1);
                self.links_enqueued += 1;
            }
        }
    }

    async fn submit_forms(&mut self, page: &Url) {
        let forms = match self.browser.forms().await {
            Ok(forms) => forms,
            Err(e) => {
                tracing::warn!("Failed to list forms on {}: {}", page, e);
                return;
            }
        };

        if forms.is_empty() {
            return;
        }
        tracing::debug!("Found {} forms on {}", forms.len(), page);

        let nav_timeout = Duration::from_millis(self.config.navigation_timeout_ms);
        let submit_timeout = Duration::from_millis(self.config.submit_timeout_ms);
        let settle = Duration::from_millis(self.config.submit_settle_ms);
        let mut page_replaced = false;

        for form in forms {
            // A submission navigates away; reload before touching the next form
            if page_replaced {
                if let Err(e) = self.browser.navigate(page, nav_timeout).await {
                    tracing::warn!("Failed to reload {} for the next form: {}", page, e);
                    return;
                }
                page_replaced = false;
            }

            let mut filled = 0;
            for control in &form.controls {
                let Some(value) = canned_value(control) else {
                    continue;
                };
                match self.browser.fill(form.index, control.index, value).await {
                    Ok(()) => filled += 1,
                    Err(e) => tracing::debug!(
                        "Could not fill control {} of form {}: {}",
                        control.index,
                        form.index,
                        e
                    ),
                }
            }

            // Forms with nothing to type into (logout, delete) are left alone
            if filled == 0 {
                tracing::debug!("Nothing filled in form {} on {}; not submitting", form.index, page);
                continue;
            }

            let Some(submit) = form.controls.iter().find(|c| c.submit_like) else {
                tracing::debug!("Form {} on {} has no submit control", form.index, page);
                continue;
            };
            if !submit.visible {
                tracing::debug!("Submit control of form {} on {} is hidden", form.index, page);
                continue;
            }

            match self
                .browser
                .click(form.index, submit.index, submit_timeout)
                .await
            {
                Ok(()) => {
                    tracing::info!("Submitted form {} on {} to {}", form.index, page, form.action);
                    self.forms_submitted += 1;
                    page_replaced = true;
                    if !settle.is_zero() {
                        tokio::time::sleep(settle).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to submit form {} on {}: {}", form.index, page, e);
                    page_replaced = true;
                }
            }
        }
    }

    fn save_checkpoint(&mut self) {
        if let Some(store) = self.checkpoint.as_mut() {
            if let Err(e) = store.save(&self.key, &self.frontier) {
                tracing::warn!("Failed to write checkpoint: {}", e);
            }
        }
    }
}
