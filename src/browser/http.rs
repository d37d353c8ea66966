//! HTTP-only browser
//!
//! Fetches pages with reqwest, keeps cookies between requests, submits forms
//! the way a browser would encode them and records every exchange, redirect
//! hops included. Scripts are not executed, so requests a page would only
//! make from JavaScript are never seen; this is the fallback when Chromium
//! cannot be launched.

use crate::browser::parser::{parse_page, ParsedPage};
use crate::browser::{Browser, BrowserError, FormSummary};
use crate::config::build_header_map;
use crate::traffic::{TrafficEntry, TrafficLog};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, Method, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Redirect hops followed before a navigation is abandoned
const MAX_REDIRECTS: usize = 10;

/// Settings for an [`HttpBrowser`]
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Where `finish_capture` writes the HAR file
    pub capture_path: PathBuf,

    pub user_agent: String,

    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,

    /// Cookies seeded for the start URL's origin
    pub cookies: Vec<(String, String)>,
}

/// Page currently loaded in the session
struct LoadedPage {
    url: Url,
    parsed: ParsedPage,
}

/// Result of one recorded request chain
struct Fetched {
    url: Url,
    status: StatusCode,
    content_type: String,
    body: String,
}

/// A [`Browser`] backed by a plain HTTP client
pub struct HttpBrowser {
    client: Client,
    capture_path: PathBuf,
    log: TrafficLog,
    page: Option<LoadedPage>,
}

impl HttpBrowser {
    /// Creates a session whose cookies are seeded for `start_url`
    ///
    /// # Arguments
    ///
    /// * `start_url` - Origin the seeded cookies belong to
    /// * `options` - Capture path, user agent and header/cookie overrides
    ///
    /// # Returns
    ///
    /// * `Ok(HttpBrowser)` - Ready session with an empty traffic log
    /// * `Err(BrowserError)` - The HTTP client could not be built
    pub fn new(start_url: &Url, options: BrowserOptions) -> Result<Self, BrowserError> {
        let jar = Arc::new(Jar::default());
        for (name, value) in &options.cookies {
            jar.add_cookie_str(&format!("{}={}; Path=/", name, value), start_url);
        }

        let client = Client::builder()
            .user_agent(options.user_agent)
            .default_headers(build_header_map(&options.headers))
            .cookie_provider(jar)
            .redirect(Policy::none()) // Hops are followed and recorded manually
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            capture_path: options.capture_path,
            log: TrafficLog::new(),
            page: None,
        })
    }

    /// Traffic recorded so far
    pub fn traffic(&self) -> &TrafficLog {
        &self.log
    }

    /// Records after `earlier`, so the finished capture covers both sessions
    pub fn continue_capture(mut self, earlier: TrafficLog) -> Self {
        self.log = earlier;
        self
    }

    /// Issues a request, following and recording redirects
    async fn fetch(
        &mut self,
        mut method: Method,
        mut url: Url,
        mut form: Option<Vec<(String, String)>>,
    ) -> Result<Fetched, BrowserError> {
        for _ in 0..=MAX_REDIRECTS {
            let started_at = Utc::now();
            let clock = Instant::now();

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(fields) = &form {
                request = request.form(fields);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    self.log.push(
                        TrafficEntry::failed(url.as_str(), method.as_str())
                            .with_timing(started_at, elapsed_ms(clock)),
                    );
                    return Err(BrowserError::Navigation {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .trim()
                .to_string();

            let next = status
                .is_redirection()
                .then(|| response.headers().get(LOCATION))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .and_then(|location| url.join(location).ok());

            if let Some(next) = next {
                self.log.push(
                    TrafficEntry::new(url.as_str(), method.as_str(), content_type, status.as_u16())
                        .with_timing(started_at, elapsed_ms(clock)),
                );
                tracing::debug!("{} {} redirected to {}", method, url, next);

                if status != StatusCode::TEMPORARY_REDIRECT
                    && status != StatusCode::PERMANENT_REDIRECT
                    && method != Method::HEAD
                {
                    method = Method::GET;
                    form = None;
                }
                url = next;
                continue;
            }

            let body = response.text().await.unwrap_or_else(|e| {
                tracing::debug!("Failed to read body of {}: {}", url, e);
                String::new()
            });

            self.log.push(
                TrafficEntry::new(
                    url.as_str(),
                    method.as_str(),
                    content_type.clone(),
                    status.as_u16(),
                )
                .with_timing(started_at, elapsed_ms(clock)),
            );

            return Ok(Fetched {
                url,
                status,
                content_type,
                body,
            });
        }

        Err(BrowserError::Navigation {
            url: url.to_string(),
            reason: format!("more than {} redirects", MAX_REDIRECTS),
        })
    }

    /// Fetches under a deadline and loads the result as the current page
    async fn load(
        &mut self,
        method: Method,
        url: Url,
        form: Option<Vec<(String, String)>>,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let requested = url.clone();
        let outcome = tokio::time::timeout(timeout, self.fetch(method.clone(), url, form)).await;
        let fetched = match outcome {
            Ok(result) => result?,
            Err(_) => {
                self.log
                    .push(TrafficEntry::failed(requested.as_str(), method.as_str()));
                return Err(BrowserError::Timeout {
                    url: requested.to_string(),
                    timeout,
                });
            }
        };

        tracing::debug!(
            "Loaded {} ({}, {})",
            fetched.url,
            fetched.status,
            fetched.content_type
        );

        let parsed = if fetched.content_type.is_empty() || fetched.content_type.contains("html") {
            parse_page(&fetched.body, &fetched.url)
        } else {
            ParsedPage::default()
        };

        self.page = Some(LoadedPage {
            url: fetched.url,
            parsed,
        });
        Ok(())
    }

    fn current(&self) -> Result<&LoadedPage, BrowserError> {
        self.page.as_ref().ok_or(BrowserError::NoPage)
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), BrowserError> {
        self.load(Method::GET, url.clone(), None, timeout).await
    }

    async fn links(&self) -> Result<Vec<Url>, BrowserError> {
        Ok(self.current()?.parsed.links.clone())
    }

    async fn forms(&self) -> Result<Vec<FormSummary>, BrowserError> {
        Ok(self
            .current()?
            .parsed
            .forms
            .iter()
            .enumerate()
            .map(|(index, form)| form.summary(index))
            .collect())
    }

    async fn fill(
        &mut self,
        form: usize,
        control: usize,
        value: &str,
    ) -> Result<(), BrowserError> {
        let page = self.page.as_mut().ok_or(BrowserError::NoPage)?;
        let target = page
            .parsed
            .forms
            .get_mut(form)
            .and_then(|f| f.controls.get_mut(control))
            .ok_or(BrowserError::NoSuchControl { form, control })?;

        if !target.is_fillable() || target.disabled {
            return Err(BrowserError::NotFillable { form, control });
        }
        target.value = value.to_string();
        Ok(())
    }

    async fn click(
        &mut self,
        form: usize,
        control: usize,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let page = self.current()?;
        let target = page
            .parsed
            .forms
            .get(form)
            .filter(|f| control < f.controls.len())
            .ok_or(BrowserError::NoSuchControl { form, control })?;

        if !target.controls[control].summary.submit_like {
            tracing::debug!("Control {} of form {} does not submit; ignoring click", control, form);
            return Ok(());
        }

        let fields = target.submission(control);
        let mut action = target.action.clone();
        let method = if target.method == "POST" {
            Method::POST
        } else {
            Method::GET
        };

        tracing::debug!("Submitting form {} on {} to {} {}", form, page.url, method, action);

        if method == Method::GET {
            action.set_query(None);
            if !fields.is_empty() {
                action.query_pairs_mut().extend_pairs(fields.iter());
            }
            self.load(method, action, None, timeout).await
        } else {
            self.load(method, action, Some(fields), timeout).await
        }
    }

    async fn finish_capture(&mut self) -> Result<(), BrowserError> {
        self.log.save(&self.capture_path)?;
        tracing::info!(
            "Saved {} traffic entries to {}",
            self.log.len(),
            self.capture_path.display()
        );
        Ok(())
    }

    fn capture_path(&self) -> &Path {
        &self.capture_path
    }
}

fn elapsed_ms(clock: Instant) -> f64 {
    clock.elapsed().as_secs_f64() * 1000.0
}
