//! # Domain Intel Library
//!
//! Aggregates what is publicly known about a domain: its WHOIS registration
//! summary and metadata scraped from its home page.
//!
//! Input is normalized to a bare host, results are cached in memory for a
//! fixed TTL, and on a miss the WHOIS lookup and the website fetch run
//! concurrently. Either may fail without failing the analysis.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use domain_intel_lib::{AnalyzerConfig, DomainAnalyzer};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalyzerConfig::default().with_cache_ttl(Duration::from_secs(600));
//!     let analyzer = DomainAnalyzer::with_config(config)?;
//!
//!     let response = analyzer.analyze("https://www.example.com").await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **URL Normalization**: scheme, `www.`, path, port and case are ignored
//! - **TTL Cache**: one hour by default, with lazy and swept expiry
//! - **WHOIS**: system `whois` client with bounded runtime
//! - **Website Metadata**: title, description, company name, address, socials
//! - **Partial Failure**: failed lookups become error markers, not errors

// Re-export main public API types and functions
// This makes them available as domain_intel_lib::TypeName
pub use analyzer::{DomainAnalyzer, WEBSITE_FAILED, WHOIS_FAILED};
pub use cache::ResultCache;
pub use config::{
    load_env_config, parse_duration_string, validate_bind, ConfigManager, EnvConfig, FileConfig,
    DEFAULT_BIND,
};
pub use error::AnalysisError;
pub use protocols::{
    extract_metadata, is_whois_available, WebsiteClient, WebsiteLookup, WhoisClient,
    WhoisLookup, WhoisRecord,
};
pub use types::{
    AnalysisResponse, AnalysisResult, AnalyzerConfig, ContactInfo, ErrorMarker, Lookup,
    RegistrantInfo, RegistrarInfo, RegistrationDates, SocialLinks, TechnicalContact,
    WebsiteInfo, WhoisInfo, DEFAULT_USER_AGENT, NOT_AVAILABLE, NOT_DETECTED, NOT_FOUND, UNKNOWN,
};
pub use utils::normalize_domain;

// Page URLs passed to `extract_metadata`
pub use url::Url;

// Internal modules - these are not part of the public API
mod analyzer;
mod cache;
mod config;
mod error;
mod protocols;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AnalysisError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
