//! End-to-end discovery pipeline
//!
//! 1. Crawl the target, recording traffic into the HAR file
//! 2. Infer the API prefix from that traffic
//! 3. Synthesize a preliminary spec from the HAR file
//! 4. Probe every endpoint of the preliminary spec through the capturing proxy
//! 5. Synthesize the final spec from the proxy dump
//!
//! An unavailable synthesizer ends the run early but is not fatal: the
//! traffic log and checkpoint remain usable. Failing to start the proxy is.

use crate::analyzer::{infer_prefix, InferredPrefix};
use crate::browser::{
    load_existing_capture, Browser, BrowserOptions, ChromiumBrowser, HttpBrowser,
};
use crate::config::{BrowserEngine, Config};
use crate::crawler::{CrawlReport, Crawler};
use crate::prober::{ProbeReport, Prober};
use crate::proxy::CapturingProxy;
use crate::state::CrawlState;
use crate::storage::SqliteCheckpoint;
use crate::synth::{InputFormat, SpecSynthesizer};
use crate::traffic::TrafficLog;
use crate::url::{netloc, normalize_url};
use crate::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use url::Url;

/// Outcome of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub crawl: CrawlReport,

    /// Entries in the traffic log after the crawl
    pub traffic_entries: usize,

    /// Prefix inferred from the crawl traffic, if any
    pub prefix: Option<InferredPrefix>,

    /// Base URL handed to the synthesizer and prober
    pub api_base: Option<String>,

    pub initial_spec: Option<PathBuf>,
    pub probe: Option<ProbeReport>,
    pub final_spec: Option<PathBuf>,

    /// Why spec synthesis stopped the run early
    pub synth_error: Option<String>,

    /// Whether an interrupt cut the run short
    pub interrupted: bool,
}

impl PipelineReport {
    fn new(crawl: CrawlReport) -> Self {
        Self {
            interrupted: crawl.state == CrawlState::Interrupted,
            crawl,
            traffic_entries: 0,
            prefix: None,
            api_base: None,
            initial_spec: None,
            probe: None,
            final_spec: None,
            synth_error: None,
        }
    }
}

/// Drives the whole discovery run for one start URL
pub struct Pipeline {
    config: Config,
    start_url: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    resume: bool,
}

impl Pipeline {
    pub fn new(config: Config, start_url: impl Into<String>) -> Self {
        Self {
            config,
            start_url: start_url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            resume: false,
        }
    }

    /// Headers sent by both the crawler and the prober
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Cookies seeded into the crawl session and sent with every probe
    pub fn with_cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Continue from the checkpoint instead of starting fresh
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs every step, stopping early if `shutdown` resolves
    ///
    /// An interrupt during the crawl finalizes the capture and keeps the
    /// checkpoint. An interrupt during probing still stops the proxy.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<PipelineReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let output = &self.config.output;

        tracing::info!("[1/5] Crawling {}", self.start_url);
        let crawl = self.crawl_until(&mut shutdown).await?;
        let mut report = PipelineReport::new(crawl);
        if report.interrupted {
            return Ok(report);
        }

        tracing::info!("[2/5] Inferring API prefix");
        let traffic_path = Path::new(&output.traffic_path);
        let log = TrafficLog::load(traffic_path)?;
        report.traffic_entries = log.len();

        let start = normalize_url(&self.start_url)?;
        let hint = netloc(&start);
        report.prefix = infer_prefix(&log, hint.as_deref());
        let api_base = match &report.prefix {
            Some(prefix) => {
                tracing::info!("Detected API prefix: {}", prefix);
                prefix.to_string()
            }
            None => {
                let origin = start.origin().ascii_serialization();
                tracing::warn!(
                    "Could not detect an API prefix; falling back to {}",
                    origin
                );
                origin
            }
        };
        report.api_base = Some(api_base.clone());

        tracing::info!("[3/5] Generating initial spec");
        let synth = SpecSynthesizer::new(&self.config.synth);
        let initial_spec = PathBuf::from(&output.initial_spec_path);
        if let Err(e) = synth
            .synthesize(traffic_path, &initial_spec, &api_base, InputFormat::Har, true)
            .await
        {
            tracing::error!("Spec generation failed: {}", e);
            tracing::info!(
                "Traffic log {} is intact; stopping before probing",
                traffic_path.display()
            );
            report.synth_error = Some(e.to_string());
            return Ok(report);
        }
        report.initial_spec = Some(initial_spec.clone());

        tracing::info!("[4/5] Probing endpoints through the capturing proxy");
        let dump_path = PathBuf::from(&output.proxy_dump_path);
        let proxy = CapturingProxy::start(&self.config.proxy, &dump_path).await?;

        let probed = tokio::select! {
            probed = self.probe(&proxy, &api_base, &initial_spec) => probed,
            () = &mut shutdown => {
                tracing::warn!("Interrupt received, stopping probes");
                report.interrupted = true;
                Ok(None)
            }
        };

        if let Err(e) = proxy.stop().await {
            tracing::warn!("Failed to stop capturing proxy cleanly: {}", e);
        }
        report.probe = probed?;
        if report.interrupted {
            return Ok(report);
        }

        tracing::info!("[5/5] Generating final spec from {}", dump_path.display());
        let final_spec = PathBuf::from(&output.final_spec_path);
        match synth
            .synthesize(&dump_path, &final_spec, &api_base, InputFormat::Flow, true)
            .await
        {
            Ok(()) => report.final_spec = Some(final_spec),
            Err(e) => {
                tracing::error!("Final spec generation failed: {}", e);
                report.synth_error = Some(e.to_string());
            }
        }

        Ok(report)
    }

    /// Runs only the crawl step
    ///
    /// The crawl is driven by Chromium unless the configured engine says
    /// otherwise; with the `auto` engine a Chromium that cannot be launched
    /// falls back to plain HTTP fetches. With `resume` set, the checkpoint's
    /// frontier is restored and new traffic is appended to the existing HAR
    /// file.
    pub async fn crawl_until<F>(&self, shutdown: F) -> Result<CrawlReport>
    where
        F: Future<Output = ()>,
    {
        let output = &self.config.output;
        let settings = &self.config.browser;
        let start = normalize_url(&self.start_url)?;

        let options = BrowserOptions {
            capture_path: PathBuf::from(&output.traffic_path),
            user_agent: self.config.crawler.user_agent.clone(),
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
        };
        let earlier = if self.resume {
            load_existing_capture(&options.capture_path)?
        } else {
            TrafficLog::new()
        };

        match settings.engine {
            BrowserEngine::Http => {
                let browser = HttpBrowser::new(&start, options)?.continue_capture(earlier);
                self.crawl_with(browser, &start, shutdown).await
            }
            BrowserEngine::Chromium => {
                let browser = ChromiumBrowser::launch(&start, &options, settings)
                    .await?
                    .continue_capture(earlier);
                self.crawl_with(browser, &start, shutdown).await
            }
            BrowserEngine::Auto => {
                let launched = ChromiumBrowser::launch(&start, &options, settings).await;
                match launched {
                    Ok(browser) => {
                        let browser = browser.continue_capture(earlier);
                        self.crawl_with(browser, &start, shutdown).await
                    }
                    Err(e) => {
                        tracing::warn!(
                            "{}; crawling with plain HTTP, script-initiated requests will be missed",
                            e
                        );
                        let browser =
                            HttpBrowser::new(&start, options)?.continue_capture(earlier);
                        self.crawl_with(browser, &start, shutdown).await
                    }
                }
            }
        }
    }

    async fn crawl_with<B, F>(&self, browser: B, start: &Url, shutdown: F) -> Result<CrawlReport>
    where
        B: Browser,
        F: Future<Output = ()>,
    {
        let mut crawler = Crawler::new(browser, start.as_str(), &self.config.crawler)?
            .with_checkpoint(SqliteCheckpoint::new(&self.config.output.checkpoint_path));
        if self.resume {
            crawler = crawler.resume()?;
        }

        crawler.run_until(shutdown).await
    }

    async fn probe(
        &self,
        proxy: &CapturingProxy,
        api_base: &str,
        spec: &Path,
    ) -> Result<Option<ProbeReport>> {
        let proxy_url = proxy.url();
        let prober = Prober::new(
            api_base,
            Some(&proxy_url),
            &self.config.prober,
            &self.headers,
            &self.cookies,
        )?;
        Ok(Some(prober.probe_document(spec).await?))
    }
}
