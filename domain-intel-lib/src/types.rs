//! Core data types for domain analysis.
//!
//! This module defines the structures produced by an analysis: the WHOIS
//! summary, the website metadata, the error markers that stand in for failed
//! lookups, and the runtime configuration of the analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Sentinel used for WHOIS text fields the provider did not return.
pub const NOT_AVAILABLE: &str = "Not available";

/// Sentinel used for WHOIS dates the provider did not return.
pub const UNKNOWN: &str = "Unknown";

/// Sentinel used for page attributes that were not present.
pub const NOT_DETECTED: &str = "Not detected";

/// Sentinel used for scraped company details that could not be located.
pub const NOT_FOUND: &str = "Not found";

/// Default browser-like user agent for website fetches.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; CompanyFinder/1.0)";

/// Placeholder substituted for a sub-result whose lookup failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorMarker {
    /// Short human summary, e.g. "WHOIS lookup failed"
    pub error: String,

    /// The underlying error message
    pub details: String,
}

impl ErrorMarker {
    pub fn new<E: Into<String>, D: Into<String>>(error: E, details: D) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

/// Outcome of one collaborator lookup: either data or an error marker.
///
/// Serialized untagged, so JSON consumers see either the data object or
/// `{ "error": ..., "details": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Lookup<T> {
    Failed(ErrorMarker),
    Found(T),
}

impl<T> Lookup<T> {
    /// Returns the data if the lookup succeeded.
    pub fn found(&self) -> Option<&T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Failed(_) => None,
        }
    }

    /// Returns the error marker if the lookup failed.
    pub fn marker(&self) -> Option<&ErrorMarker> {
        match self {
            Lookup::Found(_) => None,
            Lookup::Failed(marker) => Some(marker),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Lookup::Failed(_))
    }
}

/// Aggregated intelligence for one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Normalized domain key (e.g., "example.com")
    pub domain: String,

    /// WHOIS registration summary or an error marker
    pub whois: Lookup<WhoisInfo>,

    /// Website metadata or an error marker
    pub website: Lookup<WebsiteInfo>,

    /// When the result was assembled
    pub researched_at: DateTime<Utc>,
}

/// What the analyzer hands back to callers: the result plus whether it came
/// from the cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub result: AnalysisResult,

    /// `true` when served from the cache without any outbound calls
    pub cached: bool,
}

/// Registrant contact details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrantInfo {
    pub name: String,
    pub email: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub address: String,
    pub phone: String,
    pub fax: String,
}

/// Registration lifecycle dates, verbatim as the registry reports them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationDates {
    pub created: String,
    pub updated: String,
    pub expires: String,
}

/// Technical contact details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TechnicalContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Sponsoring registrar details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrarInfo {
    pub name: String,
    pub iana_id: String,
    pub url: String,
}

/// Normalized WHOIS summary.
///
/// Every scalar field is populated; fields missing from the registry response
/// hold [`NOT_AVAILABLE`] (or [`UNKNOWN`] for dates).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WhoisInfo {
    pub registrant: RegistrantInfo,
    pub dates: RegistrationDates,
    pub technical: TechnicalContact,
    pub nameservers: Vec<String>,
    pub registrar: RegistrarInfo,
    pub domain_status: Vec<String>,
    pub dnssec: String,
}

/// Social profile links found on the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SocialLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
}

/// Contact details taken from `mailto:`/`tel:` anchors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Metadata scraped from the site's home page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    /// `<html lang>`, or [`NOT_DETECTED`]
    pub language: String,

    /// `<meta charset>`, or [`NOT_DETECTED`]
    pub charset: String,

    /// `<meta name="viewport">`, or [`NOT_DETECTED`]
    pub viewport: String,

    /// Canonical link, resolved against the page URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,

    /// Favicon, resolved against the page URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// HTTP status of the page response
    pub status: u16,

    /// Response headers, keyed by lowercase name
    pub headers: BTreeMap<String, String>,

    /// Generator and server software hints
    pub technologies: Vec<String>,

    /// Best-effort company name, or [`NOT_FOUND`]
    pub company_name: String,

    /// Best-effort postal address, or [`NOT_FOUND`]
    pub address: String,

    pub social_media: SocialLinks,

    pub contact: ContactInfo,
}

/// Configuration options for the analyzer and its collaborators.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// How long an analysis stays cached
    /// Default: 1 hour
    pub cache_ttl: Duration,

    /// How often the server sweeps expired cache entries
    /// Default: 5 minutes
    pub sweep_interval: Duration,

    /// Timeout for the WHOIS lookup
    /// Default: 10 seconds
    pub whois_timeout: Duration,

    /// Timeout for the website fetch
    /// Default: 5 seconds
    pub website_timeout: Duration,

    /// Fixed WHOIS server to query instead of the client's default referral
    pub whois_server: Option<String>,

    /// User agent sent with website fetches
    pub user_agent: String,

    /// Upper bound on the page body read for parsing
    /// Default: 5 MiB
    pub max_body_bytes: usize,

    /// Maximum number of concurrent analyses in batch mode
    /// Default: 10, Range: 1-100
    pub concurrency: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            whois_timeout: Duration::from_secs(10),
            website_timeout: Duration::from_secs(5),
            whois_server: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: 5 * 1024 * 1024,
            concurrency: 10,
        }
    }
}

impl AnalyzerConfig {
    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the expired-entry sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the WHOIS lookup timeout.
    pub fn with_whois_timeout(mut self, timeout: Duration) -> Self {
        self.whois_timeout = timeout;
        self
    }

    /// Set the website fetch timeout.
    pub fn with_website_timeout(mut self, timeout: Duration) -> Self {
        self.website_timeout = timeout;
        self
    }

    /// Query a specific WHOIS server.
    pub fn with_whois_server<S: Into<String>>(mut self, server: S) -> Self {
        self.whois_server = Some(server.into());
        self
    }

    /// Override the website user agent.
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the page body size cap.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Set batch concurrency, capped to 1-100.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 100);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_serializes_untagged() {
        let failed: Lookup<WhoisInfo> =
            Lookup::Failed(ErrorMarker::new("WHOIS lookup failed", "timed out"));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "WHOIS lookup failed");
        assert_eq!(json["details"], "timed out");

        let back: Lookup<WhoisInfo> = serde_json::from_value(json).unwrap();
        assert!(back.is_failed());
    }

    #[test]
    fn test_response_flattens_result() {
        let response = AnalysisResponse {
            result: AnalysisResult {
                domain: "example.com".to_string(),
                whois: Lookup::Failed(ErrorMarker::new("WHOIS lookup failed", "x")),
                website: Lookup::Failed(ErrorMarker::new("Could not fetch website", "y")),
                researched_at: Utc::now(),
            },
            cached: true,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["domain"], "example.com");
        assert_eq!(json["cached"], true);
        assert!(json.get("researchedAt").is_some());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.website_timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);

        let config = config.with_concurrency(0).with_cache_ttl(Duration::from_secs(1));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.cache_ttl, Duration::from_secs(1));
        assert_eq!(AnalyzerConfig::default().with_concurrency(500).concurrency, 100);
    }
}
