//! Endpoint prober
//!
//! Replays requests against endpoints listed in a preliminary API document
//! so that a capturing proxy records targeted traffic. Probing generates
//! traffic; it does not verify responses, so failed requests are counted
//! and skipped.

mod template;

pub use template::{
    fill_placeholders, load_templates, EndpointTemplate, TemplateError, PLACEHOLDER_VALUE,
};

use crate::config::{build_header_map, ProberConfig};
use rand::Rng;
use reqwest::header::{HeaderValue, COOKIE};
use reqwest::{Client, Proxy};
use std::path::Path;
use std::time::Duration;

/// Counts of probe requests issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub endpoints: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Issues sampled requests against endpoint templates
pub struct Prober {
    client: Client,
    base_url: String,
    samples: u32,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl Prober {
    /// Creates a prober for endpoints under `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - API base the template paths are appended to
    /// * `proxy` - Optional proxy URL every request is routed through
    /// * `config` - Sample count, delays, timeout and user agent
    /// * `headers` - Extra headers sent with every request
    /// * `cookies` - Cookies sent with every request
    ///
    /// # Returns
    ///
    /// * `Ok(Prober)` - Ready prober
    /// * `Err(reqwest::Error)` - Invalid proxy URL or client configuration
    pub fn new(
        base_url: &str,
        proxy: Option<&str>,
        config: &ProberConfig,
        headers: &[(String, String)],
        cookies: &[(String, String)],
    ) -> Result<Self, reqwest::Error> {
        let mut default_headers = build_header_map(headers);
        if !cookies.is_empty() {
            let cookie = cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    default_headers.insert(COOKIE, value);
                }
                Err(_) => tracing::warn!("Ignoring cookies that are not valid header text"),
            }
        }

        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .danger_accept_invalid_certs(true); // The capturing proxy re-signs TLS

        match proxy {
            Some(proxy) => builder = builder.proxy(Proxy::all(proxy)?),
            None => tracing::warn!(
                "No proxy specified; probe traffic will not be captured unless another mechanism records it"
            ),
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            samples: config.samples,
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
        })
    }

    /// Absolute URL probed for `template`
    pub fn endpoint_url(&self, template: &EndpointTemplate) -> String {
        let path = template.concrete_path();
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Loads templates from an API document and probes them
    pub async fn probe_document(&self, path: &Path) -> Result<ProbeReport, TemplateError> {
        let templates = load_templates(path)?;
        Ok(self.probe(&templates).await)
    }

    /// Issues `samples` requests per template, sequentially
    ///
    /// Each request is preceded by a random delay. Network errors, timeouts
    /// and non-2xx responses are logged and counted as failures.
    pub async fn probe(&self, templates: &[EndpointTemplate]) -> ProbeReport {
        let mut report = ProbeReport {
            endpoints: templates.len(),
            ..ProbeReport::default()
        };

        tracing::info!(
            "Probing {} endpoints on {} ({} samples each)",
            templates.len(),
            self.base_url,
            self.samples
        );

        for template in templates {
            let url = self.endpoint_url(template);
            tracing::info!("Probing {} {}", template.method, template.path);

            for sample in 1..=self.samples {
                tokio::time::sleep(self.jitter()).await;
                report.attempted += 1;

                match self
                    .client
                    .request(template.method.clone(), url.as_str())
                    .send()
                    .await
                {
                    Ok(response) if response.status().is_success() => {
                        tracing::debug!(
                            "  [{}/{}] {} {}",
                            sample,
                            self.samples,
                            url,
                            response.status()
                        );
                        report.succeeded += 1;
                    }
                    Ok(response) => {
                        tracing::warn!(
                            "  [{}/{}] {} {} returned {}",
                            sample,
                            self.samples,
                            template.method,
                            url,
                            response.status()
                        );
                        report.failed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "  [{}/{}] {} {} failed: {}",
                            sample,
                            self.samples,
                            template.method,
                            url,
                            e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Probing finished: {} requests, {} succeeded, {} failed",
            report.attempted,
            report.succeeded,
            report.failed
        );
        report
    }

    fn jitter(&self) -> Duration {
        let ms = if self.max_delay_ms > self.min_delay_ms {
            rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms)
        } else {
            self.min_delay_ms
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(samples: u32) -> ProberConfig {
        ProberConfig {
            samples,
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..ProberConfig::default()
        }
    }

    fn templates() -> Vec<EndpointTemplate> {
        vec![
            EndpointTemplate::new("/users/{id}", Method::GET),
            EndpointTemplate::new("/login", Method::POST),
        ]
    }

    #[tokio::test]
    async fn test_probe_issues_samples_per_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/login"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let base = format!("{}/v1/", server.uri());
        let prober = Prober::new(&base, None, &config(2), &[], &[]).unwrap();
        let report = prober.probe(&templates()).await;

        assert_eq!(
            report,
            ProbeReport {
                endpoints: 2,
                attempted: 4,
                succeeded: 4,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_probing() {
        let server = MockServer::start().await;
        Mock::given(path("/users/1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(path("/login"))
            .respond_with(ResponseTemplate::new(201))
            .expect(3)
            .mount(&server)
            .await;

        let prober = Prober::new(&server.uri(), None, &config(3), &[], &[]).unwrap();
        let report = prober.probe(&templates()).await;

        assert_eq!(report.attempted, 6);
        assert_eq!(report.failed, 3);
        assert_eq!(report.succeeded, 3);
    }

    #[tokio::test]
    async fn test_unreachable_target_counts_failures() {
        let prober = Prober::new("http://127.0.0.1:1", None, &config(2), &[], &[]).unwrap();
        let report = prober.probe(&templates()).await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.failed, 4);
    }

    #[tokio::test]
    async fn test_headers_and_cookies_sent() {
        let server = MockServer::start().await;
        Mock::given(path("/login"))
            .and(header("user-agent", "surface-scout/prober"))
            .and(header("authorization", "Bearer X"))
            .and(header("cookie", "session=123; theme=dark"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let headers = vec![("Authorization".to_string(), "Bearer X".to_string())];
        let cookies = vec![
            ("session".to_string(), "123".to_string()),
            ("theme".to_string(), "dark".to_string()),
        ];
        let prober = Prober::new(&server.uri(), None, &config(1), &headers, &cookies).unwrap();
        let report = prober
            .probe(&[EndpointTemplate::new("/login", Method::POST)])
            .await;
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_requests_routed_through_proxy() {
        let proxy = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&proxy)
            .await;

        let prober = Prober::new(
            "http://target.invalid/api",
            Some(&proxy.uri()),
            &config(1),
            &[],
            &[],
        )
        .unwrap();
        let report = prober
            .probe(&[EndpointTemplate::new("/users/{id}", Method::GET)])
            .await;
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_endpoint_url_joins_base_and_path() {
        let prober = Prober::new("http://api.test.com/v1/", None, &config(1), &[], &[]).unwrap();
        let url = prober.endpoint_url(&EndpointTemplate::new("/items/{itemId}/details", Method::GET));
        assert_eq!(url, "http://api.test.com/v1/items/1/details");
        let url = prober.endpoint_url(&EndpointTemplate::new("health", Method::GET));
        assert_eq!(url, "http://api.test.com/v1/health");
    }

    #[tokio::test]
    async fn test_invalid_proxy_rejected() {
        assert!(Prober::new("http://a.test", Some("not a url"), &config(1), &[], &[]).is_err());
    }
}
