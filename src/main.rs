//! Surface-Scout main entry point
//!
//! This is the command-line interface for the Surface-Scout API discovery
//! pipeline.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use surface_scout::analyzer::detect_api_prefix;
use surface_scout::config::{
    load_config_with_hash, parse_cookie, parse_header, parse_overrides, validate, BrowserEngine,
    Config,
};
use surface_scout::output::{format_probe_report, print_crawl_report, print_report};
use surface_scout::pipeline::Pipeline;
use surface_scout::prober::Prober;
use surface_scout::url::{netloc, normalize_url};
use tracing_subscriber::EnvFilter;

/// Surface-Scout: active API surface discovery
///
/// Crawls a web application while recording its traffic, infers where its
/// API lives, probes the discovered endpoints through a capturing proxy and
/// turns the captured traffic into an OpenAPI document.
#[derive(Parser, Debug)]
#[command(name = "surface-scout")]
#[command(version)]
#[command(about = "Active API surface discovery", long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: crawl, infer, synthesize, probe, synthesize
    Scan {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Preliminary spec generated from crawl traffic
        #[arg(long, value_name = "PATH")]
        initial_spec: Option<String>,

        /// Final spec generated from probe traffic
        #[arg(short, long, value_name = "PATH")]
        spec: Option<String>,

        /// Flow dump written by the capturing proxy
        #[arg(long, value_name = "PATH")]
        proxy_dump: Option<String>,

        /// Port the capturing proxy listens on
        #[arg(long, value_name = "PORT")]
        proxy_port: Option<u16>,

        /// Requests issued per endpoint
        #[arg(long, value_name = "N")]
        samples: Option<u32>,
    },

    /// Crawl only, recording traffic to a HAR file
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Infer the API prefix from an existing HAR file
    Infer {
        /// Traffic log to analyze
        #[arg(value_name = "HAR")]
        har: PathBuf,

        /// Host (or URL) of the intended target
        #[arg(long, value_name = "HOST")]
        target: Option<String>,
    },

    /// Probe the endpoints of an existing OpenAPI document
    Probe {
        /// OpenAPI document listing the endpoints
        #[arg(value_name = "SPEC")]
        spec: PathBuf,

        /// Base URL the endpoint paths are appended to
        #[arg(long, value_name = "URL")]
        url: String,

        /// Proxy to route requests through
        #[arg(long, value_name = "URL")]
        proxy: Option<String>,

        /// Requests issued per endpoint
        #[arg(long, value_name = "N")]
        samples: Option<u32>,

        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// URL to start crawling from
    #[arg(value_name = "URL")]
    url: String,

    /// Maximum link depth
    #[arg(short, long, value_name = "N")]
    depth: Option<u32>,

    /// HAR file the crawl traffic is written to
    #[arg(short, long, value_name = "PATH")]
    traffic: Option<String>,

    /// Resume from the checkpoint of an interrupted crawl
    #[arg(long)]
    resume: bool,

    /// Crawl checkpoint database
    #[arg(long, value_name = "PATH")]
    checkpoint: Option<String>,

    /// Browser that drives the crawl
    #[arg(long, value_enum, value_name = "ENGINE")]
    browser: Option<BrowserEngine>,

    #[command(flatten)]
    auth: AuthArgs,
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Extra request header, 'Name: value' (repeatable)
    #[arg(long = "header", short = 'H', value_name = "HEADER")]
    headers: Vec<String>,

    /// Cookie, 'name=value' (repeatable)
    #[arg(long = "cookie", short = 'b', value_name = "COOKIE")]
    cookies: Vec<String>,
}

impl AuthArgs {
    fn parse(&self) -> (Vec<(String, String)>, Vec<(String, String)>) {
        (
            parse_overrides(&self.headers, "header", parse_header),
            parse_overrides(&self.cookies, "cookie", parse_cookie),
        )
    }
}

impl CrawlArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(depth) = self.depth {
            config.crawler.max_depth = depth;
        }
        if let Some(path) = &self.traffic {
            config.output.traffic_path = path.clone();
        }
        if let Some(path) = &self.checkpoint {
            config.output.checkpoint_path = path.clone();
        }
        if let Some(engine) = self.browser {
            config.browser.engine = engine;
        }
    }

    fn pipeline(&self, config: Config) -> Pipeline {
        let (headers, cookies) = self.auth.parse();
        Pipeline::new(config, self.url.clone())
            .with_headers(headers)
            .with_cookies(cookies)
            .resume(self.resume)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((cfg, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    cfg
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Scan {
            crawl,
            initial_spec,
            spec,
            proxy_dump,
            proxy_port,
            samples,
        } => {
            crawl.apply(&mut config);
            if let Some(path) = initial_spec {
                config.output.initial_spec_path = path;
            }
            if let Some(path) = spec {
                config.output.final_spec_path = path;
            }
            if let Some(path) = proxy_dump {
                config.output.proxy_dump_path = path;
            }
            if let Some(port) = proxy_port {
                config.proxy.port = port;
            }
            if let Some(samples) = samples {
                config.prober.samples = samples;
            }
            validate(&config)?;
            handle_scan(&crawl, config).await?;
        }
        Command::Crawl { crawl } => {
            crawl.apply(&mut config);
            validate(&config)?;
            handle_crawl(&crawl, config).await?;
        }
        Command::Infer { har, target } => {
            handle_infer(&har, target.as_deref())?;
        }
        Command::Probe {
            spec,
            url,
            proxy,
            samples,
            auth,
        } => {
            if let Some(samples) = samples {
                config.prober.samples = samples;
            }
            validate(&config)?;
            handle_probe(&spec, &url, proxy.as_deref(), &auth, &config).await?;
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("surface_scout=info,warn"),
            1 => EnvFilter::new("surface_scout=debug,info"),
            2 => EnvFilter::new("surface_scout=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Handles `scan`: runs the whole pipeline
async fn handle_scan(args: &CrawlArgs, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let report = args.pipeline(config).run_until(shutdown_signal()).await?;
    print_report(&report);
    Ok(())
}

/// Handles `crawl`: records traffic and reports the inferred prefix
async fn handle_crawl(args: &CrawlArgs, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let traffic_path = PathBuf::from(&config.output.traffic_path);
    let report = args.pipeline(config).crawl_until(shutdown_signal()).await?;

    println!("=== Surface-Scout Crawl ===\n");
    print_crawl_report(&report);

    let start = normalize_url(&args.url)?;
    match detect_api_prefix(&traffic_path, netloc(&start).as_deref())? {
        Some(prefix) => println!("\nAPI prefix: {}", prefix),
        None => println!("\nAPI prefix: none detected"),
    }
    println!("Traffic log: {}", traffic_path.display());
    Ok(())
}

/// Handles `infer`: prints the prefix detected in a HAR file
fn handle_infer(
    har: &std::path::Path,
    target: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    match detect_api_prefix(har, target)? {
        Some(prefix) => println!("{}", prefix),
        None => {
            tracing::warn!("No API-like traffic found in {}", har.display());
            println!("No API prefix detected");
        }
    }
    Ok(())
}

/// Handles `probe`: replays requests against an existing spec
async fn handle_probe(
    spec: &std::path::Path,
    base_url: &str,
    proxy: Option<&str>,
    auth: &AuthArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let (headers, cookies) = auth.parse();
    let prober = Prober::new(base_url, proxy, &config.prober, &headers, &cookies)?;

    let report = tokio::select! {
        report = prober.probe_document(spec) => report?,
        () = shutdown_signal() => {
            tracing::warn!("Interrupt received, stopping probes");
            return Ok(());
        }
    };

    print!("{}", format_probe_report(&report));
    Ok(())
}
