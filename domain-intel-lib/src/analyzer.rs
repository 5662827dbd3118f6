//! Domain analysis orchestration.
//!
//! This module provides the `DomainAnalyzer`, which normalizes input, consults
//! the result cache, and on a miss runs the WHOIS lookup and the website fetch
//! side by side. A failed lookup never fails the analysis; it is replaced by
//! an error marker in the result.

use crate::cache::ResultCache;
use crate::error::AnalysisError;
use crate::protocols::{WebsiteClient, WebsiteLookup, WhoisClient, WhoisLookup};
use crate::types::{AnalysisResponse, AnalysisResult, AnalyzerConfig, ErrorMarker, Lookup};
use crate::utils::normalize_domain;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Marker summary for a failed WHOIS lookup.
pub const WHOIS_FAILED: &str = "WHOIS lookup failed";

/// Marker summary for a failed website fetch.
pub const WEBSITE_FAILED: &str = "Could not fetch website";

/// Aggregates WHOIS and website intelligence for domains, with caching.
///
/// # Example
///
/// ```rust,no_run
/// use domain_intel_lib::DomainAnalyzer;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let analyzer = DomainAnalyzer::new()?;
///     let response = analyzer.analyze("https://www.example.com/about").await?;
///     println!("{} (cached: {})", response.result.domain, response.cached);
///     Ok(())
/// }
/// ```
pub struct DomainAnalyzer {
    /// Configuration settings for this analyzer instance
    config: AnalyzerConfig,
    /// Registration data source
    whois: Arc<dyn WhoisLookup>,
    /// Home page metadata source
    website: Arc<dyn WebsiteLookup>,
    /// Results keyed by normalized domain
    cache: ResultCache,
}

impl DomainAnalyzer {
    /// Create a new analyzer with default configuration.
    ///
    /// Default settings:
    /// - Cache TTL: 1 hour
    /// - WHOIS timeout: 10 seconds
    /// - Website timeout: 5 seconds
    /// - Batch concurrency: 10
    pub fn new() -> Result<Self, AnalysisError> {
        Self::with_config(AnalyzerConfig::default())
    }

    /// Create an analyzer backed by the system WHOIS client and the HTTP
    /// website client, both built from `config`.
    pub fn with_config(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        let mut whois = WhoisClient::with_timeout(config.whois_timeout);
        if let Some(server) = &config.whois_server {
            whois = whois.server(server.clone());
        }
        let website = WebsiteClient::with_config(
            config.website_timeout,
            &config.user_agent,
            config.max_body_bytes,
        )?;

        Ok(Self::with_collaborators(
            config,
            Arc::new(whois),
            Arc::new(website),
        ))
    }

    /// Create an analyzer around arbitrary lookup implementations.
    pub fn with_collaborators(
        config: AnalyzerConfig,
        whois: Arc<dyn WhoisLookup>,
        website: Arc<dyn WebsiteLookup>,
    ) -> Self {
        let cache = ResultCache::new(config.cache_ttl);
        Self {
            config,
            whois,
            website,
            cache,
        }
    }

    /// Analyze one domain, URL, or host-like string.
    ///
    /// A cached result younger than the TTL is returned with `cached = true`
    /// and no outbound calls. Otherwise both lookups run concurrently, the
    /// assembled result is cached, and it is returned with `cached = false`.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` if the input is empty or does not
    /// contain a host. Lookup failures are reported inside the result.
    pub async fn analyze(&self, input: &str) -> Result<AnalysisResponse, AnalysisError> {
        let domain = normalize_domain(input)?;

        if let Some(result) = self.cache.get(&domain) {
            info!(%domain, "cache hit");
            return Ok(AnalysisResponse {
                result,
                cached: true,
            });
        }

        info!(%domain, "cache miss, running lookups");
        let (whois, website) = tokio::join!(
            self.whois.lookup(&domain),
            self.website.fetch(&domain)
        );

        let whois = match whois {
            Ok(info) => Lookup::Found(info),
            Err(e) => {
                warn!(%domain, error = %e, "whois lookup failed");
                Lookup::Failed(ErrorMarker::new(WHOIS_FAILED, e.to_string()))
            }
        };
        let website = match website {
            Ok(info) => Lookup::Found(info),
            Err(e) => {
                warn!(%domain, error = %e, "website fetch failed");
                Lookup::Failed(ErrorMarker::new(WEBSITE_FAILED, e.to_string()))
            }
        };

        let result = AnalysisResult {
            domain: domain.clone(),
            whois,
            website,
            researched_at: Utc::now(),
        };
        self.cache.insert(&domain, result.clone());

        Ok(AnalysisResponse {
            result,
            cached: false,
        })
    }

    /// Analyze several inputs with bounded concurrency.
    ///
    /// Results come back in input order, each paired with the input it was
    /// produced from.
    pub async fn analyze_many(
        &self,
        inputs: &[String],
    ) -> Vec<(String, Result<AnalysisResponse, AnalysisError>)> {
        stream::iter(inputs.iter().cloned())
            .map(|input| async move {
                let outcome = self.analyze(&input).await;
                (input, outcome)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    /// The result cache shared by every analysis on this instance.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Get the current configuration for this analyzer.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::{extract_metadata, WhoisRecord};
    use crate::types::{WebsiteInfo, WhoisInfo};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    #[derive(Default)]
    struct MockWhois {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl WhoisLookup for MockWhois {
        async fn lookup(&self, domain: &str) -> Result<WhoisInfo, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(AnalysisError::whois(domain, "connection refused"));
            }
            Ok(WhoisRecord::parse("Registrar: Test Registrar, Inc.\nName Server: NS1.TEST.NET")
                .into_info())
        }
    }

    #[derive(Default)]
    struct MockWebsite {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl WebsiteLookup for MockWebsite {
        async fn fetch(&self, domain: &str) -> Result<WebsiteInfo, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(AnalysisError::fetch_with_status(domain, "Request failed", 503));
            }
            let url = Url::parse(&format!("https://{}/", domain)).unwrap();
            Ok(extract_metadata(
                "<html><head><title>Test Site</title></head></html>",
                &url,
                200,
                BTreeMap::new(),
            ))
        }
    }

    fn analyzer(whois: Arc<MockWhois>, website: Arc<MockWebsite>) -> DomainAnalyzer {
        DomainAnalyzer::with_collaborators(AnalyzerConfig::default(), whois, website)
    }

    #[tokio::test]
    async fn test_analyze_populates_both_lookups() {
        let whois = Arc::new(MockWhois::default());
        let website = Arc::new(MockWebsite::default());
        let analyzer = analyzer(whois.clone(), website.clone());

        let response = analyzer.analyze("https://www.Example.com/path").await.unwrap();

        assert!(!response.cached);
        assert_eq!(response.result.domain, "example.com");
        assert_eq!(
            response.result.whois.found().unwrap().registrar.name,
            "Test Registrar, Inc."
        );
        assert_eq!(
            response.result.website.found().unwrap().title.as_deref(),
            Some("Test Site")
        );
        assert_eq!(whois.calls.load(Ordering::SeqCst), 1);
        assert_eq!(website.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_equivalent_inputs_share_cache_entry() {
        let whois = Arc::new(MockWhois::default());
        let website = Arc::new(MockWebsite::default());
        let analyzer = analyzer(whois.clone(), website.clone());

        let first = analyzer.analyze("https://www.example.com/path").await.unwrap();
        let second = analyzer.analyze("example.com").await.unwrap();
        let third = analyzer.analyze("www.example.com").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert!(third.cached);
        assert_eq!(first.result, second.result);
        assert_eq!(whois.calls.load(Ordering::SeqCst), 1);
        assert_eq!(website.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_triggers_fresh_lookups() {
        let whois = Arc::new(MockWhois::default());
        let website = Arc::new(MockWebsite::default());
        let analyzer = analyzer(whois.clone(), website.clone());

        analyzer.analyze("example.com").await.unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        let response = analyzer.analyze("example.com").await.unwrap();

        assert!(!response.cached);
        assert_eq!(whois.calls.load(Ordering::SeqCst), 2);
        assert_eq!(website.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_whois_failure_yields_marker() {
        let whois = Arc::new(MockWhois {
            fail: true,
            ..Default::default()
        });
        let website = Arc::new(MockWebsite::default());
        let analyzer = analyzer(whois, website);

        let response = analyzer.analyze("example.com").await.unwrap();

        let marker = response.result.whois.marker().unwrap();
        assert_eq!(marker.error, WHOIS_FAILED);
        assert!(marker.details.contains("connection refused"));
        assert!(response.result.website.found().is_some());
    }

    #[tokio::test]
    async fn test_both_failures_yield_markers_and_are_cached() {
        let whois = Arc::new(MockWhois {
            fail: true,
            ..Default::default()
        });
        let website = Arc::new(MockWebsite {
            fail: true,
            ..Default::default()
        });
        let analyzer = analyzer(whois.clone(), website.clone());

        let response = analyzer.analyze("example.com").await.unwrap();
        assert_eq!(response.result.whois.marker().unwrap().error, WHOIS_FAILED);
        assert_eq!(
            response.result.website.marker().unwrap().error,
            WEBSITE_FAILED
        );

        let again = analyzer.analyze("example.com").await.unwrap();
        assert!(again.cached);
        assert_eq!(whois.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let whois = Arc::new(MockWhois::default());
        let website = Arc::new(MockWebsite::default());
        let analyzer = analyzer(whois.clone(), website.clone());

        let err = analyzer.analyze("   ").await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(whois.calls.load(Ordering::SeqCst), 0);
        assert_eq!(website.calls.load(Ordering::SeqCst), 0);
        assert!(analyzer.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_run_concurrently() {
        let whois = Arc::new(MockWhois {
            delay: Some(Duration::from_secs(2)),
            ..Default::default()
        });
        let website = Arc::new(MockWebsite {
            delay: Some(Duration::from_secs(2)),
            ..Default::default()
        });
        let analyzer = analyzer(whois, website);

        let started = tokio::time::Instant::now();
        analyzer.analyze("example.com").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_analyze_many_preserves_order() {
        let whois = Arc::new(MockWhois::default());
        let website = Arc::new(MockWebsite::default());
        let analyzer = analyzer(whois, website);

        let inputs = vec![
            "b.com".to_string(),
            "".to_string(),
            "https://a.org/x".to_string(),
        ];
        let results = analyzer.analyze_many(&inputs).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "b.com");
        assert_eq!(results[0].1.as_ref().unwrap().result.domain, "b.com");
        assert!(results[1].1.is_err());
        assert_eq!(results[2].1.as_ref().unwrap().result.domain, "a.org");
    }
}
