//! Website metadata fetching.
//!
//! One GET of `https://{domain}` with a fixed timeout and a browser-like user
//! agent, then a sequence of independent lookups over a tolerant HTML parse.
//! Every field is optional on its own; a failed fetch yields an error and no
//! partial metadata.

use crate::error::AnalysisError;
use crate::protocols::WebsiteLookup;
use crate::types::{
    ContactInfo, SocialLinks, WebsiteInfo, DEFAULT_USER_AGENT, NOT_DETECTED, NOT_FOUND,
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, ACCEPT};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

lazy_static! {
    static ref TITLE: Selector = selector("title");
    static ref META_DESCRIPTION: Selector = selector(r#"meta[name="description"]"#);
    static ref META_KEYWORDS: Selector = selector(r#"meta[name="keywords"]"#);
    static ref META_VIEWPORT: Selector = selector(r#"meta[name="viewport"]"#);
    static ref META_GENERATOR: Selector = selector(r#"meta[name="generator"]"#);
    static ref META_CHARSET: Selector = selector("meta[charset]");
    static ref OG_SITE_NAME: Selector = selector(r#"meta[property="og:site_name"]"#);
    static ref HTML_LANG: Selector = selector("html[lang]");
    static ref LINK_REL: Selector = selector("link[rel][href]");
    static ref ANCHOR: Selector = selector("a[href]");
    static ref FOOTER: Selector = selector("footer");
    static ref H1: Selector = selector("h1");
    static ref ADDRESS_TAG: Selector = selector("address");
    static ref SCHEMA_ADDRESS: Selector = selector(
        r#"[itemtype="http://schema.org/PostalAddress"], [itemtype="https://schema.org/PostalAddress"]"#
    );
    static ref ADDRESS_CLASS: Selector = selector(".address, .footer-address");
    static ref COPYRIGHT: Regex = Regex::new(r"©\s*(.*?\d{4})").expect("valid copyright pattern");
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

/// HTTP client that fetches a domain's home page and extracts its metadata.
#[derive(Clone, Debug)]
pub struct WebsiteClient {
    /// HTTP client with timeout and user agent applied
    http_client: reqwest::Client,
    /// Timeout for the whole request, body included
    timeout: Duration,
    /// Bytes of body read before the rest is discarded
    max_body_bytes: usize,
    /// Scheme of the fetched page URL
    scheme: &'static str,
}

impl WebsiteClient {
    /// Create a new website client with default settings.
    pub fn new() -> Result<Self, AnalysisError> {
        Self::with_config(Duration::from_secs(5), DEFAULT_USER_AGENT, 5 * 1024 * 1024)
    }

    /// Create a new website client with custom settings.
    pub fn with_config(
        timeout: Duration,
        user_agent: &str,
        max_body_bytes: usize,
    ) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            http_client,
            timeout,
            max_body_bytes,
            scheme: "https",
        })
    }

    /// Fetch over plain HTTP, for local test servers.
    #[cfg(test)]
    pub(crate) fn with_scheme(mut self, scheme: &'static str) -> Self {
        self.scheme = scheme;
        self
    }

    /// Fetch `https://{domain}` and extract its metadata.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError` on connection failure, timeout, or a non-2xx
    /// response.
    pub async fn fetch_metadata(&self, domain: &str) -> Result<WebsiteInfo, AnalysisError> {
        let url = format!("{}://{}", self.scheme, domain);
        debug!(domain, %url, "fetching website");

        let response = self
            .http_client
            .get(&url)
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| self.request_error(domain, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::fetch_with_status(
                domain,
                format!("Request failed with status {}", status),
                status.as_u16(),
            ));
        }

        let page_url = response.url().clone();
        let headers = collect_headers(response.headers());
        let body = self.read_body(domain, response).await?;

        debug!(domain, status = status.as_u16(), bytes = body.len(), "parsing website");
        Ok(extract_metadata(&body, &page_url, status.as_u16(), headers))
    }

    /// Read the body up to `max_body_bytes`, dropping the remainder.
    async fn read_body(
        &self,
        domain: &str,
        mut response: reqwest::Response,
    ) -> Result<String, AnalysisError> {
        let mut body: Vec<u8> = Vec::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(domain, e))?
        {
            let remaining = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!(domain, limit = self.max_body_bytes, "website body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn request_error(&self, domain: &str, err: reqwest::Error) -> AnalysisError {
        if err.is_timeout() {
            AnalysisError::timeout(format!("website fetch for {}", domain), self.timeout)
        } else if err.is_connect() {
            err.into()
        } else {
            AnalysisError::fetch(domain, format!("Request failed: {}", err))
        }
    }
}

#[async_trait]
impl WebsiteLookup for WebsiteClient {
    async fn fetch(&self, domain: &str) -> Result<WebsiteInfo, AnalysisError> {
        self.fetch_metadata(domain).await
    }
}

/// Flatten response headers into a sorted map, joining repeated names.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    collected
}

/// Extract metadata from a fetched page.
///
/// `page_url` is the final URL after redirects and is used to resolve relative
/// icon and canonical links. Malformed markup is tolerated.
pub fn extract_metadata(
    html: &str,
    page_url: &Url,
    status: u16,
    headers: BTreeMap<String, String>,
) -> WebsiteInfo {
    let document = Html::parse_document(html);

    let title = first_text(&document, &TITLE);
    let technologies = detect_technologies(&document, &headers);

    WebsiteInfo {
        description: first_attr(&document, &META_DESCRIPTION, "content"),
        keywords: first_attr(&document, &META_KEYWORDS, "content"),
        language: first_attr(&document, &HTML_LANG, "lang")
            .unwrap_or_else(|| NOT_DETECTED.to_string()),
        charset: first_attr(&document, &META_CHARSET, "charset")
            .unwrap_or_else(|| NOT_DETECTED.to_string()),
        viewport: first_attr(&document, &META_VIEWPORT, "content")
            .unwrap_or_else(|| NOT_DETECTED.to_string()),
        canonical: link_href(&document, "canonical").map(|href| resolve(page_url, &href)),
        icon: link_href(&document, "icon")
            .or_else(|| link_href(&document, "shortcut icon"))
            .map(|href| resolve(page_url, &href)),
        status,
        headers,
        technologies,
        company_name: company_name(&document, title.as_deref())
            .unwrap_or_else(|| NOT_FOUND.to_string()),
        address: postal_address(&document).unwrap_or_else(|| NOT_FOUND.to_string()),
        social_media: SocialLinks {
            facebook: href_containing(&document, "facebook.com"),
            twitter: href_containing(&document, "twitter.com"),
            linkedin: href_containing(&document, "linkedin.com"),
            instagram: href_containing(&document, "instagram.com"),
        },
        contact: ContactInfo {
            email: href_with_scheme(&document, "mailto:"),
            phone: href_with_scheme(&document, "tel:"),
        },
        title,
    }
}

/// og:site_name, then the title up to the first `|`, then the footer
/// copyright holder, then the first heading.
fn company_name(document: &Html, title: Option<&str>) -> Option<String> {
    first_attr(document, &OG_SITE_NAME, "content")
        .or_else(|| {
            title
                .and_then(|t| t.split('|').next())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
        .or_else(|| {
            let footer = joined_text(document, &FOOTER)?;
            COPYRIGHT
                .captures(&footer)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|name| !name.is_empty())
        })
        .or_else(|| first_text(document, &H1))
}

/// `<address>`, then a schema.org PostalAddress block, then `.address` classes.
fn postal_address(document: &Html) -> Option<String> {
    joined_text(document, &ADDRESS_TAG)
        .or_else(|| joined_text(document, &SCHEMA_ADDRESS))
        .or_else(|| joined_text(document, &ADDRESS_CLASS))
}

fn detect_technologies(document: &Html, headers: &BTreeMap<String, String>) -> Vec<String> {
    let candidates = [
        first_attr(document, &META_GENERATOR, "content"),
        headers.get("x-powered-by").cloned(),
        headers.get("server").cloned(),
    ];

    let mut technologies: Vec<String> = Vec::new();
    for tech in candidates.into_iter().flatten() {
        let tech = tech.trim().to_string();
        if !tech.is_empty() && !technologies.contains(&tech) {
            technologies.push(tech);
        }
    }
    technologies
}

/// First matching element with a non-empty attribute value.
fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// First matching element with non-empty text.
fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Text of every matching element, joined.
fn joined_text(document: &Html, selector: &Selector) -> Option<String> {
    let text = document
        .select(selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Element text with runs of whitespace collapsed.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Href of the first `<link>` whose rel equals `rel` (case-insensitive).
fn link_href(document: &Html, rel: &str) -> Option<String> {
    document
        .select(&LINK_REL)
        .filter(|el| {
            el.value()
                .attr("rel")
                .map(|value| value.trim().eq_ignore_ascii_case(rel))
                .unwrap_or(false)
        })
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

fn href_containing(document: &Html, needle: &str) -> Option<String> {
    document
        .select(&ANCHOR)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| href.to_ascii_lowercase().contains(needle))
        .map(str::to_string)
}

/// Value of the first `mailto:`/`tel:` anchor, scheme and query removed.
fn href_with_scheme(document: &Html, scheme: &str) -> Option<String> {
    document
        .select(&ANCHOR)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter_map(|href| {
            let prefix = href.get(..scheme.len())?;
            if !prefix.eq_ignore_ascii_case(scheme) {
                return None;
            }
            let value = href[scheme.len()..]
                .split('?')
                .next()
                .unwrap_or_default()
                .trim();
            (!value.is_empty()).then(|| value.to_string())
        })
        .next()
}

fn resolve(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FULL_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Acme Widgets | Home</title>
  <meta name="description" content="We make widgets.">
  <meta name="keywords" content="widgets, gadgets">
  <meta name="generator" content="WordPress 6.5">
  <link rel="canonical" href="/home">
  <link rel="icon" href="/favicon.png">
  <link rel="shortcut icon" href="/legacy.ico">
</head>
<body>
  <h1>Welcome</h1>
  <a href="https://www.facebook.com/acme">fb</a>
  <a href="https://twitter.com/acme">tw</a>
  <a href="https://www.linkedin.com/company/acme">in</a>
  <a href="mailto:hello@acme.test?subject=Hi">mail</a>
  <a href="tel:+1-555-0100">call</a>
  <address>1 Main St,
      Springfield</address>
  <footer>© Acme Widgets Inc. 2024</footer>
</body>
</html>"#;

    fn page_url() -> Url {
        Url::parse("https://acme.test/").unwrap()
    }

    #[test]
    fn test_extract_full_page() {
        let mut headers = BTreeMap::new();
        headers.insert("server".to_string(), "nginx".to_string());
        headers.insert("x-powered-by".to_string(), "PHP/8.2".to_string());

        let info = extract_metadata(FULL_PAGE, &page_url(), 200, headers);

        assert_eq!(info.title.as_deref(), Some("Acme Widgets | Home"));
        assert_eq!(info.description.as_deref(), Some("We make widgets."));
        assert_eq!(info.keywords.as_deref(), Some("widgets, gadgets"));
        assert_eq!(info.language, "en");
        assert_eq!(info.charset, "utf-8");
        assert_eq!(info.viewport, "width=device-width, initial-scale=1");
        assert_eq!(info.canonical.as_deref(), Some("https://acme.test/home"));
        assert_eq!(info.icon.as_deref(), Some("https://acme.test/favicon.png"));
        assert_eq!(info.status, 200);
        assert_eq!(info.technologies, vec!["WordPress 6.5", "PHP/8.2", "nginx"]);
        assert_eq!(info.company_name, "Acme Widgets");
        assert_eq!(info.address, "1 Main St, Springfield");
        assert_eq!(
            info.social_media.facebook.as_deref(),
            Some("https://www.facebook.com/acme")
        );
        assert_eq!(info.social_media.twitter.as_deref(), Some("https://twitter.com/acme"));
        assert!(info.social_media.instagram.is_none());
        assert_eq!(info.contact.email.as_deref(), Some("hello@acme.test"));
        assert_eq!(info.contact.phone.as_deref(), Some("+1-555-0100"));
    }

    #[test]
    fn test_empty_page_uses_sentinels() {
        let info = extract_metadata("", &page_url(), 200, BTreeMap::new());

        assert!(info.title.is_none());
        assert!(info.description.is_none());
        assert!(info.icon.is_none());
        assert_eq!(info.language, NOT_DETECTED);
        assert_eq!(info.charset, NOT_DETECTED);
        assert_eq!(info.company_name, NOT_FOUND);
        assert_eq!(info.address, NOT_FOUND);
        assert!(info.technologies.is_empty());
        assert_eq!(info.social_media, SocialLinks::default());
        assert_eq!(info.contact, ContactInfo::default());
    }

    #[test]
    fn test_malformed_markup_is_tolerated() {
        let html = "<html><head><title>Broken<body><p>unclosed <div><h1>Still here";
        let info = extract_metadata(html, &page_url(), 200, BTreeMap::new());
        // Nothing panics; whatever the parser recovers is used
        assert_eq!(info.status, 200);
        assert_eq!(info.language, NOT_DETECTED);
    }

    #[test]
    fn test_shortcut_icon_used_when_no_icon() {
        let html = r#"<head><link rel="Shortcut Icon" href="https://cdn.acme.test/s.ico"></head>"#;
        let info = extract_metadata(html, &page_url(), 200, BTreeMap::new());
        assert_eq!(info.icon.as_deref(), Some("https://cdn.acme.test/s.ico"));
    }

    #[test]
    fn test_company_name_priority() {
        let og = r#"<head><meta property="og:site_name" content="Acme OG"><title>Title Co | x</title></head>"#;
        assert_eq!(company_name(&Html::parse_document(og), Some("Title Co | x")).unwrap(), "Acme OG");

        let footer = "<body><footer><p>Copyright © Footer Corp 2019-2023</p></footer><h1>Heading</h1></body>";
        assert_eq!(
            company_name(&Html::parse_document(footer), None).unwrap(),
            "Footer Corp 2019"
        );

        let heading = "<body><h1>  </h1><h1>Heading   Co</h1></body>";
        assert_eq!(company_name(&Html::parse_document(heading), None).unwrap(), "Heading Co");

        assert!(company_name(&Html::parse_document("<p>nothing</p>"), None).is_none());
    }

    #[test]
    fn test_address_fallbacks() {
        let schema = r#"<div itemscope itemtype="https://schema.org/PostalAddress"><span>42 Side Rd</span></div>"#;
        assert_eq!(postal_address(&Html::parse_document(schema)).unwrap(), "42 Side Rd");

        let class = r#"<div class="footer-address">7 Dock Ln</div>"#;
        assert_eq!(postal_address(&Html::parse_document(class)).unwrap(), "7 Dock Ln");
    }

    #[test]
    fn test_collect_headers_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1".parse().unwrap());
        headers.append("set-cookie", "b=2".parse().unwrap());
        headers.insert("server", "nginx".parse().unwrap());

        let collected = collect_headers(&headers);
        assert_eq!(collected.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(collected.get("server").map(String::as_str), Some("nginx"));
    }

    #[test]
    fn test_website_client_creation() {
        let client = WebsiteClient::with_config(Duration::from_secs(2), "test-agent", 1024).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(2));
        assert_eq!(client.max_body_bytes, 1024);
        assert_eq!(client.scheme, "https");
    }

    /// Accept one connection on a local port and answer it with `response`.
    /// `hold` keeps the socket open without answering.
    async fn serve_once(response: Vec<u8>, hold: Option<Duration>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            if let Some(hold) = hold {
                tokio::time::sleep(hold).await;
            }
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });

        addr.to_string()
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
            status,
            body.len(),
            extra_headers,
            body
        )
        .into_bytes()
    }

    fn local_client(timeout: Duration, max_body_bytes: usize) -> WebsiteClient {
        WebsiteClient::with_config(timeout, DEFAULT_USER_AGENT, max_body_bytes)
            .unwrap()
            .with_scheme("http")
    }

    #[tokio::test]
    async fn test_fetch_parses_page_and_headers() {
        let host = serve_once(
            http_response("200 OK", "X-Powered-By: Express\r\n", FULL_PAGE),
            None,
        )
        .await;

        let info = local_client(Duration::from_secs(5), 1024 * 1024)
            .fetch_metadata(&host)
            .await
            .unwrap();

        assert_eq!(info.status, 200);
        assert_eq!(info.title.as_deref(), Some("Acme Widgets | Home"));
        assert!(info.technologies.contains(&"Express".to_string()));
        assert_eq!(
            info.headers.get("x-powered-by").map(String::as_str),
            Some("Express")
        );
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let host = serve_once(http_response("404 Not Found", "", "missing"), None).await;

        let err = local_client(Duration::from_secs(5), 1024)
            .fetch_metadata(&host)
            .await
            .unwrap_err();

        match err {
            AnalysisError::FetchError { status_code, .. } => assert_eq!(status_code, Some(404)),
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_truncates_oversized_body() {
        let page = format!(
            "<html><head><title>Big Page</title></head><body>{}</body></html>",
            "x".repeat(64 * 1024)
        );
        let host = serve_once(http_response("200 OK", "", &page), None).await;

        let info = local_client(Duration::from_secs(5), 100)
            .fetch_metadata(&host)
            .await
            .unwrap();

        assert_eq!(info.title.as_deref(), Some("Big Page"));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let host = serve_once(
            http_response("200 OK", "", "<title>late</title>"),
            Some(Duration::from_secs(5)),
        )
        .await;

        let err = local_client(Duration::from_millis(200), 1024)
            .fetch_metadata(&host)
            .await
            .unwrap_err();

        assert!(
            matches!(err, AnalysisError::Timeout { duration, .. } if duration == Duration::from_millis(200)),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = local_client(Duration::from_secs(5), 1024)
            .fetch_metadata(&host)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NetworkError { .. }), "got {:?}", err);
    }
}
