//! Domain Intel CLI Application
//!
//! Serves the `POST /analyze` endpoint, or, when given URLs on the command
//! line, analyzes them directly and prints the results.

mod server;
mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use domain_intel_lib::{
    is_whois_available, load_env_config, parse_duration_string, validate_bind, AnalysisError,
    AnalysisResponse, AnalyzerConfig, ConfigManager, DomainAnalyzer, FileConfig, DEFAULT_BIND,
};
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for domain-intel
#[derive(Parser, Debug)]
#[command(name = "domain-intel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Sai Dutt G.V <gvs46@protonmail.com>")]
#[command(about = "Aggregate WHOIS registration data and website metadata for domains")]
#[command(
    long_about = "Aggregate WHOIS registration data and website metadata for domains.\n\nWith no URLs, serves POST /analyze over HTTP. With URLs, analyzes them and prints the results."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// URLs or domains to analyze (omit to start the HTTP server)
    #[arg(value_name = "URLS", help_heading = "Input")]
    pub urls: Vec<String>,

    /// Address for the HTTP server (default: 0.0.0.0:3000)
    #[arg(long = "bind", value_name = "ADDR", help_heading = "Server")]
    pub bind: Option<String>,

    /// How long results stay cached, e.g. "1h", "30m"
    #[arg(long = "cache-ttl", value_name = "DURATION", help_heading = "Lookups")]
    pub cache_ttl: Option<String>,

    /// WHOIS lookup timeout (default: 10s)
    #[arg(long = "whois-timeout", value_name = "DURATION", help_heading = "Lookups")]
    pub whois_timeout: Option<String>,

    /// Website fetch timeout (default: 5s)
    #[arg(long = "website-timeout", value_name = "DURATION", help_heading = "Lookups")]
    pub website_timeout: Option<String>,

    /// Query this WHOIS server instead of following referrals
    #[arg(long = "whois-server", value_name = "HOST", help_heading = "Lookups")]
    pub whois_server: Option<String>,

    /// User agent for website fetches
    #[arg(long = "user-agent", value_name = "UA", help_heading = "Lookups")]
    pub user_agent: Option<String>,

    /// Max concurrent analyses for multiple URLs (default: 10, max: 100)
    #[arg(short = 'c', long = "concurrency", help_heading = "Lookups")]
    pub concurrency: Option<usize>,

    /// Output results in JSON format
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Show debug logs and full error details
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// Fully resolved runtime settings.
#[derive(Debug)]
struct RunConfig {
    analyzer: AnalyzerConfig,
    bind: SocketAddr,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_tracing(&args);

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > 100 {
            return Err("Concurrency must be between 1 and 100".to_string());
        }
    }

    if args.json && args.urls.is_empty() {
        return Err("--json only applies when URLs are given".to_string());
    }

    if let Some(bind) = &args.bind {
        validate_bind(bind).map_err(|e| e.to_string())?;
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(args: &Args) {
    let default_filter = if args.debug {
        "domain_intel=debug,domain_intel_lib=debug,info"
    } else if args.verbose || args.urls.is_empty() {
        "info"
    } else {
        // Keep batch output readable
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        cache_ttl = ?config.analyzer.cache_ttl,
        whois_timeout = ?config.analyzer.whois_timeout,
        website_timeout = ?config.analyzer.website_timeout,
        "domain-intel starting"
    );

    if !is_whois_available().await {
        warn!("'whois' command not found; WHOIS results will be error markers");
    }

    let analyzer = Arc::new(DomainAnalyzer::with_config(config.analyzer)?);

    if args.urls.is_empty() {
        server::serve(config.bind, analyzer).await
    } else {
        run_batch(&analyzer, &args).await
    }
}

/// Analyze the command-line URLs and print the results.
async fn run_batch(
    analyzer: &DomainAnalyzer,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let total = args.urls.len();
    if !args.json && total > 1 {
        ui::print_header(total, analyzer.config().concurrency);
    }

    let spinner = if !args.json {
        ui::Spinner::start(format!(
            "Analyzing {} domain{}...",
            total,
            if total == 1 { "" } else { "s" }
        ))
    } else {
        None
    };

    let start_time = std::time::Instant::now();
    let results = analyzer.analyze_many(&args.urls).await;
    let duration = start_time.elapsed();

    if let Some(s) = spinner {
        s.stop().await;
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json_output(&results))?);
    } else {
        for (input, outcome) in &results {
            match outcome {
                Ok(response) => ui::print_analysis(response, args.debug),
                Err(e) => ui::print_failure(input, e),
            }
        }
        if total > 1 {
            ui::print_summary(total, failed, duration);
        }
    }

    if failed == total {
        return Err(format!(
            "{} input{} could not be analyzed",
            failed,
            if failed == 1 { "" } else { "s" }
        )
        .into());
    }
    Ok(())
}

/// One JSON value for a single input, an array for several.
fn json_output(
    results: &[(String, Result<AnalysisResponse, AnalysisError>)],
) -> serde_json::Value {
    let values: Vec<serde_json::Value> = results
        .iter()
        .map(|(input, outcome)| match outcome {
            Ok(response) => serde_json::to_value(response)
                .unwrap_or_else(|e| serde_json::json!({ "input": input, "error": e.to_string() })),
            Err(e) => serde_json::json!({ "input": input, "error": e.to_string() }),
        })
        .collect();

    match <[serde_json::Value; 1]>::try_from(values) {
        Ok([single]) => single,
        Err(values) => serde_json::Value::Array(values),
    }
}

/// Build runtime settings from CLI arguments with config file integration.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments (explicit user input)
/// 2. Environment variables (DI_*, PORT)
/// 3. Config file (--config, DI_CONFIG, or discovered)
/// 4. Built-in defaults
fn build_config(args: &Args) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let env_config = load_env_config(args.verbose);
    let config_manager = ConfigManager::new(args.verbose);

    // Step 1: Config files
    let file_config = match args.config.as_ref().or(env_config.config.as_ref()) {
        Some(path) => {
            info!(path = %path, "using explicit config file");
            config_manager
                .load_file(path)
                .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?
        }
        None => config_manager.discover_and_load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "config discovery failed, using defaults");
            FileConfig::default()
        }),
    };

    let mut analyzer = file_config.apply_to(AnalyzerConfig::default());
    let mut bind = file_config.bind().map(str::to_string);

    // Step 2: Environment variables
    analyzer = env_config.apply_to(analyzer);
    if env_config.bind.is_some() {
        bind = env_config.bind.clone();
    }

    // Step 3: CLI arguments
    analyzer = apply_cli_args_to_config(analyzer, args)?;
    if let Some(cli_bind) = &args.bind {
        bind = Some(cli_bind.clone());
    }

    let bind = bind.as_deref().unwrap_or(DEFAULT_BIND);
    let bind: SocketAddr = bind
        .parse()
        .map_err(|_| format!("Invalid bind address '{}'", bind))?;

    Ok(RunConfig { analyzer, bind })
}

/// Apply CLI arguments to config (highest precedence).
///
/// Only flags the user actually passed override file and environment values.
fn apply_cli_args_to_config(
    mut config: AnalyzerConfig,
    args: &Args,
) -> Result<AnalyzerConfig, String> {
    let duration = |flag: &str, value: &str| {
        parse_duration_string(value).ok_or_else(|| {
            format!(
                "Invalid {} '{}'. Use format like '5s', '2m', '1h'",
                flag, value
            )
        })
    };

    if let Some(ttl) = &args.cache_ttl {
        config = config.with_cache_ttl(duration("--cache-ttl", ttl)?);
    }
    if let Some(timeout) = &args.whois_timeout {
        config = config.with_whois_timeout(duration("--whois-timeout", timeout)?);
    }
    if let Some(timeout) = &args.website_timeout {
        config = config.with_website_timeout(duration("--website-timeout", timeout)?);
    }
    if let Some(server) = &args.whois_server {
        config = config.with_whois_server(server.clone());
    }
    if let Some(agent) = &args.user_agent {
        config = config.with_user_agent(agent.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }

    Ok(config)
}
