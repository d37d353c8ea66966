use serde::Deserialize;

/// Main configuration structure for Surface-Scout
///
/// Every section is optional in the TOML file; missing values fall back to
/// the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub browser: BrowserConfig,
    pub prober: ProberConfig,
    pub proxy: ProxyConfig,
    pub synth: SynthConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth to crawl from the start URL
    pub max_depth: u32,

    /// Delay between processed URLs (milliseconds)
    pub politeness_delay_ms: u64,

    /// Upper bound on a single page navigation (milliseconds)
    pub navigation_timeout_ms: u64,

    /// Upper bound on a single form submission (milliseconds)
    pub submit_timeout_ms: u64,

    /// Time to let follow-up requests fire after a form submission (milliseconds)
    pub submit_settle_ms: u64,

    /// User agent sent by the crawling browser
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            politeness_delay_ms: 500,
            navigation_timeout_ms: 10_000,
            submit_timeout_ms: 3_000,
            submit_settle_ms: 2_000,
            user_agent: format!("surface-scout/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Which browser drives the crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    /// Headless Chromium when one can be launched, plain HTTP otherwise
    #[default]
    Auto,

    /// Headless Chromium; failing to launch it is an error
    Chromium,

    /// Plain HTTP fetches without script execution
    Http,
}

/// Crawling browser configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    pub engine: BrowserEngine,

    /// Chromium executable; looked up in the usual install locations when unset
    pub executable: Option<String>,

    /// Run Chromium without a window
    pub headless: bool,

    /// Quiet period with no requests in flight after which a page counts as
    /// settled (milliseconds)
    pub network_idle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::Auto,
            executable: None,
            headless: true,
            network_idle_ms: 500,
        }
    }
}

/// Endpoint prober configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProberConfig {
    /// Requests issued per endpoint
    pub samples: u32,

    /// Lower bound of the randomized delay before each request (milliseconds)
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay before each request (milliseconds)
    pub max_delay_ms: u64,

    /// Timeout for a single probe request (milliseconds)
    pub request_timeout_ms: u64,

    /// User agent sent with every probe
    pub user_agent: String,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            min_delay_ms: 100,
            max_delay_ms: 500,
            request_timeout_ms: 10_000,
            user_agent: "surface-scout/prober".to_string(),
        }
    }
}

/// Capturing proxy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Proxy executable (invoked as `<program> [args] -w <dump> -p <port>`)
    pub program: String,

    /// Extra arguments placed before the generated ones
    pub args: Vec<String>,

    /// Listen port on 127.0.0.1
    pub port: u16,

    /// How long to wait for the proxy to accept connections (milliseconds)
    pub startup_timeout_ms: u64,

    /// Grace period between SIGTERM and a forceful kill (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            program: "mitmdump".to_string(),
            args: Vec::new(),
            port: 8080,
            startup_timeout_ms: 3_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Spec synthesis transform configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SynthConfig {
    /// Transform executable
    pub program: String,

    /// Extra arguments placed before the generated ones, e.g.
    /// `["-m", "mitmproxy2swagger"]` with `program = "python3"`
    pub args: Vec<String>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            program: "mitmproxy2swagger".to_string(),
            args: Vec::new(),
        }
    }
}

/// Output artifact paths
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// HAR file written by the crawl session
    pub traffic_path: String,

    /// SQLite checkpoint used to resume an interrupted crawl
    pub checkpoint_path: String,

    /// Spec synthesized from crawl traffic
    pub initial_spec_path: String,

    /// Flow dump written by the capturing proxy while probing
    pub proxy_dump_path: String,

    /// Spec synthesized from probe traffic
    pub final_spec_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            traffic_path: "traffic.har".to_string(),
            checkpoint_path: "crawler_state.db".to_string(),
            initial_spec_path: "initial_spec.yaml".to_string(),
            proxy_dump_path: "fuzzing.mitm".to_string(),
            final_spec_path: "final_spec.yaml".to_string(),
        }
    }
}
