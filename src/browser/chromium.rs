//! Chromium-driven browser
//!
//! Launches headless Chromium over the DevTools protocol and records every
//! network exchange a page makes, XHR and fetch calls issued by its scripts
//! included. A page counts as loaded once no request has been in flight for
//! the configured idle window.

use crate::browser::parser::{form_action, form_method, is_submit_like, resolve_link};
use crate::browser::recorder::{NetworkRecorder, ObservedResponse};
use crate::browser::{Browser, BrowserError, BrowserOptions, FormControl, FormSummary};
use crate::config::BrowserConfig;
use crate::traffic::TrafficLog;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as Chromium, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, Headers, Response, SetExtraHttpHeadersParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use url::Url;

/// How often the network is checked while waiting for it to settle
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Form controls in the order both browsers address them
const CONTROL_SELECTOR: &str = "input, textarea, select, button";

const LINKS_SCRIPT: &str = r#"({
    base: document.baseURI,
    hrefs: Array.from(document.querySelectorAll('a[href]'), a => a.getAttribute('href')),
})"#;

const FORMS_SCRIPT: &str = r#"({
    base: document.baseURI,
    forms: Array.from(document.querySelectorAll('form'), form => ({
        method: form.getAttribute('method'),
        action: form.getAttribute('action'),
        controls: Array.from(form.querySelectorAll('input, textarea, select, button'), el => {
            const style = getComputedStyle(el);
            const kind = el.getAttribute('type');
            return {
                tag: el.tagName.toLowerCase(),
                type: kind,
                name: el.getAttribute('name'),
                label: el.textContent || '',
                visible: (kind || '').trim().toLowerCase() !== 'hidden'
                    && style.display !== 'none'
                    && style.visibility !== 'hidden'
                    && el.getClientRects().length > 0,
            };
        }),
    })),
})"#;

#[derive(Debug, Deserialize)]
struct PageLinks {
    base: String,
    hrefs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PageForms {
    base: String,
    forms: Vec<RawForm>,
}

#[derive(Debug, Deserialize)]
struct RawForm {
    method: Option<String>,
    action: Option<String>,
    controls: Vec<RawControl>,
}

#[derive(Debug, Deserialize)]
struct RawControl {
    tag: String,
    #[serde(rename = "type")]
    input_type: Option<String>,
    name: Option<String>,
    label: String,
    visible: bool,
}

impl RawForm {
    fn summarize(self, index: usize, base: &Url) -> FormSummary {
        FormSummary {
            index,
            method: form_method(self.method.as_deref()),
            action: form_action(self.action.as_deref(), base).to_string(),
            controls: self
                .controls
                .into_iter()
                .enumerate()
                .map(|(index, raw)| {
                    let input_type = raw.input_type.map(|t| t.trim().to_ascii_lowercase());
                    FormControl {
                        index,
                        submit_like: is_submit_like(&raw.tag, input_type.as_deref(), &raw.label),
                        tag: raw.tag,
                        input_type,
                        name: raw.name.filter(|n| !n.is_empty()),
                        visible: raw.visible,
                    }
                })
                .collect(),
        }
    }
}

/// Script that types `value` into a control, reporting `ok`, `missing` or
/// `unfillable`
fn fill_script(form: usize, control: usize, value: &str) -> String {
    format!(
        r#"(() => {{
    const form = document.querySelectorAll('form')[{form}];
    const el = form && form.querySelectorAll('{selector}')[{control}];
    if (!el) return 'missing';
    const kind = (el.getAttribute('type') || 'text').trim().toLowerCase();
    const blocked = ['checkbox', 'radio', 'file', 'submit', 'button', 'reset', 'image'];
    const fillable = el.tagName === 'TEXTAREA' || (el.tagName === 'INPUT' && !blocked.includes(kind));
    if (!fillable || el.disabled) return 'unfillable';
    el.focus();
    el.value = {value};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return 'ok';
}})()"#,
        form = form,
        control = control,
        selector = CONTROL_SELECTOR,
        value = Value::from(value),
    )
}

fn observed(response: &Response) -> ObservedResponse {
    ObservedResponse {
        url: response.url.clone(),
        status: response.status,
        mime_type: response.mime_type.clone(),
    }
}

enum NetworkEvent {
    Sent(Arc<EventRequestWillBeSent>),
    Received(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
}

/// A [`Browser`] backed by headless Chromium
pub struct ChromiumBrowser {
    browser: Chromium,
    page: Page,
    recorder: Arc<Mutex<NetworkRecorder>>,
    handler: JoinHandle<()>,
    listener: JoinHandle<()>,
    capture_path: PathBuf,
    idle_window: Duration,
    loaded: bool,
}

impl ChromiumBrowser {
    /// Launches Chromium with one tab whose traffic is recorded
    ///
    /// # Arguments
    ///
    /// * `start_url` - Origin the seeded cookies belong to
    /// * `options` - Capture path, user agent and header/cookie overrides
    /// * `settings` - Executable, headless mode and network idle window
    ///
    /// # Returns
    ///
    /// * `Ok(ChromiumBrowser)` - Session on `about:blank`, recording
    /// * `Err(BrowserError::Launch)` - No usable Chromium was found or it
    ///   failed to start
    pub async fn launch(
        start_url: &Url,
        options: &BrowserOptions,
        settings: &BrowserConfig,
    ) -> Result<Self, BrowserError> {
        let mut builder = LaunchConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut events) = Chromium::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    tracing::trace!("DevTools handler: {}", e);
                }
            }
        });

        let recorder = Arc::new(Mutex::new(NetworkRecorder::new()));
        let (page, listener) =
            match open_page(&browser, start_url, options, Arc::clone(&recorder)).await {
                Ok(opened) => opened,
                Err(e) => {
                    handler.abort();
                    return Err(e);
                }
            };

        tracing::info!("Launched Chromium for {}", start_url);

        Ok(Self {
            browser,
            page,
            recorder,
            handler,
            listener,
            capture_path: options.capture_path.clone(),
            idle_window: Duration::from_millis(settings.network_idle_ms),
            loaded: false,
        })
    }

    /// Records after `earlier`, so the finished capture covers both sessions
    pub fn continue_capture(self, earlier: TrafficLog) -> Self {
        self.recorder().carry_over(earlier);
        self
    }

    /// Traffic recorded so far
    pub fn traffic(&self) -> TrafficLog {
        self.recorder().snapshot()
    }

    fn recorder(&self) -> MutexGuard<'_, NetworkRecorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_loaded(&self) -> Result<(), BrowserError> {
        if self.loaded {
            Ok(())
        } else {
            Err(BrowserError::NoPage)
        }
    }

    async fn evaluate<T: DeserializeOwned>(&self, expression: &str) -> Result<T, BrowserError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(BrowserError::Script)?;
        self.page
            .evaluate_expression(params)
            .await?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    /// Waits until nothing has been in flight for the idle window
    ///
    /// `since` is when the triggering action finished; events it caused may
    /// still be on their way, so the window is also measured from there.
    async fn settle(
        &self,
        url: &str,
        since: Instant,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        loop {
            let idle = self.recorder().is_idle(self.idle_window);
            if idle && since.elapsed() >= self.idle_window {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let in_flight = self.recorder().in_flight();
                tracing::debug!("{} still has {} requests in flight", url, in_flight);
                return Err(BrowserError::Timeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn control(&self, form: usize, control: usize) -> Result<Element, BrowserError> {
        let missing = BrowserError::NoSuchControl { form, control };
        let mut forms = self.page.find_elements("form").await?;
        if form >= forms.len() {
            return Err(missing);
        }
        let mut controls = forms.swap_remove(form).find_elements(CONTROL_SELECTOR).await?;
        if control >= controls.len() {
            return Err(missing);
        }
        Ok(controls.swap_remove(control))
    }
}

/// Opens the recorded tab and applies the session overrides
async fn open_page(
    browser: &Chromium,
    start_url: &Url,
    options: &BrowserOptions,
    recorder: Arc<Mutex<NetworkRecorder>>,
) -> Result<(Page, JoinHandle<()>), BrowserError> {
    let page = browser.new_page("about:blank").await?;

    // Subscribe before anything is loaded so no exchange is missed
    let streams: Vec<BoxStream<'static, NetworkEvent>> = vec![
        page.event_listener::<EventRequestWillBeSent>()
            .await?
            .map(NetworkEvent::Sent)
            .boxed(),
        page.event_listener::<EventResponseReceived>()
            .await?
            .map(NetworkEvent::Received)
            .boxed(),
        page.event_listener::<EventLoadingFinished>()
            .await?
            .map(NetworkEvent::Finished)
            .boxed(),
        page.event_listener::<EventLoadingFailed>()
            .await?
            .map(NetworkEvent::Failed)
            .boxed(),
    ];
    let mut events = stream::select_all(streams);

    let listener = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let mut rec = recorder.lock().unwrap_or_else(PoisonError::into_inner);
            match event {
                NetworkEvent::Sent(e) => {
                    let redirect = e.redirect_response.as_ref().map(observed);
                    rec.request_sent(
                        e.request_id.inner(),
                        &e.request.url,
                        &e.request.method,
                        redirect.as_ref(),
                    );
                }
                NetworkEvent::Received(e) => {
                    rec.response_received(e.request_id.inner(), &observed(&e.response));
                }
                NetworkEvent::Finished(e) => rec.finished(e.request_id.inner()),
                NetworkEvent::Failed(e) => {
                    tracing::debug!("Request {} failed: {}", e.request_id.inner(), e.error_text);
                    rec.failed(e.request_id.inner());
                }
            }
        }
    });

    let configured = async {
        page.execute(EnableParams::default()).await?;
        page.execute(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await?;

        if !options.headers.is_empty() {
            let headers: Map<String, Value> = options
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect();
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(
                Value::Object(headers),
            )))
            .await?;
        }

        if !options.cookies.is_empty() {
            let cookies = options
                .cookies
                .iter()
                .map(|(name, value)| {
                    CookieParam::builder()
                        .name(name.clone())
                        .value(value.clone())
                        .url(start_url.as_str())
                        .build()
                        .map_err(BrowserError::Launch)
                })
                .collect::<Result<Vec<_>, _>>()?;
            page.set_cookies(cookies).await?;
        }
        Ok::<(), BrowserError>(())
    }
    .await;

    match configured {
        Ok(()) => Ok((page, listener)),
        Err(e) => {
            listener.abort();
            Err(e)
        }
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), BrowserError> {
        self.loaded = false;
        let deadline = Instant::now() + timeout;

        match tokio::time::timeout(timeout, self.page.goto(url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BrowserError::Timeout {
                    url: url.to_string(),
                    timeout,
                })
            }
        }

        self.loaded = true;
        self.settle(url.as_str(), Instant::now(), deadline, timeout)
            .await
    }

    async fn links(&self) -> Result<Vec<Url>, BrowserError> {
        self.ensure_loaded()?;
        let found: PageLinks = self.evaluate(LINKS_SCRIPT).await?;
        let base = Url::parse(&found.base)
            .map_err(|e| BrowserError::Script(format!("base URI {}: {}", found.base, e)))?;
        Ok(found
            .hrefs
            .iter()
            .filter_map(|href| resolve_link(href, &base))
            .collect())
    }

    async fn forms(&self) -> Result<Vec<FormSummary>, BrowserError> {
        self.ensure_loaded()?;
        let found: PageForms = self.evaluate(FORMS_SCRIPT).await?;
        let base = Url::parse(&found.base)
            .map_err(|e| BrowserError::Script(format!("base URI {}: {}", found.base, e)))?;
        Ok(found
            .forms
            .into_iter()
            .enumerate()
            .map(|(index, form)| form.summarize(index, &base))
            .collect())
    }

    async fn fill(
        &mut self,
        form: usize,
        control: usize,
        value: &str,
    ) -> Result<(), BrowserError> {
        self.ensure_loaded()?;
        let outcome: String = self.evaluate(&fill_script(form, control, value)).await?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "unfillable" => Err(BrowserError::NotFillable { form, control }),
            _ => Err(BrowserError::NoSuchControl { form, control }),
        }
    }

    async fn click(
        &mut self,
        form: usize,
        control: usize,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.ensure_loaded()?;
        let element = self.control(form, control).await?;
        let current = self.page.url().await?.unwrap_or_default();
        let deadline = Instant::now() + timeout;

        tracing::debug!("Clicking control {} of form {} on {}", control, form, current);
        element.click().await?;
        self.settle(&current, Instant::now(), deadline, timeout)
            .await
    }

    async fn finish_capture(&mut self) -> Result<(), BrowserError> {
        let log = self.recorder().snapshot();
        self.loaded = false;
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Chromium did not close cleanly: {}", e);
        }

        log.save(&self.capture_path)?;
        tracing::info!(
            "Saved {} traffic entries to {}",
            log.len(),
            self.capture_path.display()
        );
        Ok(())
    }

    fn capture_path(&self) -> &Path {
        &self.capture_path
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.listener.abort();
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn raw_control(tag: &str, input_type: Option<&str>, label: &str, visible: bool) -> RawControl {
        RawControl {
            tag: tag.to_string(),
            input_type: input_type.map(str::to_string),
            name: Some(String::new()),
            label: label.to_string(),
            visible,
        }
    }

    #[test]
    fn test_form_summary_from_page_data() {
        let base = Url::parse("https://app.test/account/").unwrap();
        let form = RawForm {
            method: Some("post".to_string()),
            action: Some("../session".to_string()),
            controls: vec![
                raw_control("input", Some(" Email "), "", true),
                raw_control("button", None, " Sign in ", false),
            ],
        };

        let summary = form.summarize(2, &base);
        assert_eq!(summary.index, 2);
        assert_eq!(summary.method, "POST");
        assert_eq!(summary.action, "https://app.test/session");

        let email = &summary.controls[0];
        assert_eq!(email.input_type.as_deref(), Some("email"));
        assert_eq!(email.name, None);
        assert!(!email.submit_like);

        let button = &summary.controls[1];
        assert_eq!(button.index, 1);
        assert!(button.submit_like);
        assert!(!button.visible);
    }

    #[test]
    fn test_form_without_method_or_action() {
        let base = Url::parse("https://app.test/search").unwrap();
        let form = RawForm {
            method: None,
            action: Some("  ".to_string()),
            controls: Vec::new(),
        };

        let summary = form.summarize(0, &base);
        assert_eq!(summary.method, "GET");
        assert_eq!(summary.action, "https://app.test/search");
    }

    #[test]
    fn test_fill_script_escapes_value() {
        let script = fill_script(1, 3, "it's \"quoted\"\n");
        assert!(script.contains("document.querySelectorAll('form')[1]"));
        assert!(script.contains("querySelectorAll('input, textarea, select, button')[3]"));
        assert!(script.contains(r#"el.value = "it's \"quoted\"\n";"#));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_script_initiated_requests_are_recorded() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<html><body>
                    <a href="/about">About</a>
                    <form><input name="q"><button type="submit">Search</button></form>
                    <script>fetch('/api/v1/users')</script>
                </body></html>"#,
                "text/html",
            ))
            .mount(&server)
            .await;
        Mock::given(path("/api/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("[]", "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let capture = dir.path().join("traffic.har");
        let start = Url::parse(&format!("{}/", server.uri())).unwrap();
        let options = BrowserOptions {
            capture_path: capture.clone(),
            user_agent: "test-agent".to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
        };
        let settings = BrowserConfig {
            network_idle_ms: 200,
            ..BrowserConfig::default()
        };

        let mut browser = ChromiumBrowser::launch(&start, &options, &settings)
            .await
            .unwrap();
        browser.navigate(&start, Duration::from_secs(10)).await.unwrap();

        let links = browser.links().await.unwrap();
        assert_eq!(links[0].path(), "/about");

        let forms = browser.forms().await.unwrap();
        assert_eq!(forms.len(), 1);
        assert!(forms[0].controls[1].submit_like);
        browser.fill(0, 0, "testuser").await.unwrap();
        assert!(matches!(
            browser.fill(0, 1, "x").await,
            Err(BrowserError::NotFillable { .. })
        ));

        browser.finish_capture().await.unwrap();
        let log = TrafficLog::load(&capture).unwrap();
        let api = log
            .entries()
            .iter()
            .find(|e| e.url.ends_with("/api/v1/users"))
            .unwrap();
        assert_eq!(api.status, Some(200));
        assert_eq!(api.content_type, "application/json");
    }
}
