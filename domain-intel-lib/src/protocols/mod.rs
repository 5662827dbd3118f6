//! Upstream collaborators used by the analyzer.
//!
//! Each collaborator sits behind a trait so the analyzer can be driven by
//! test doubles; the production implementations are the system WHOIS client
//! and the HTTP website client.

use crate::error::AnalysisError;
use crate::types::{WebsiteInfo, WhoisInfo};
use async_trait::async_trait;

/// WHOIS protocol implementation
pub mod whois;

/// Website fetch and HTML metadata extraction
pub mod website;

pub use website::{extract_metadata, WebsiteClient};
pub use whois::{is_whois_available, WhoisClient, WhoisRecord};

/// Source of registration data for a domain.
#[async_trait]
pub trait WhoisLookup: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<WhoisInfo, AnalysisError>;
}

/// Source of home-page metadata for a domain.
#[async_trait]
pub trait WebsiteLookup: Send + Sync {
    async fn fetch(&self, domain: &str) -> Result<WebsiteInfo, AnalysisError>;
}
