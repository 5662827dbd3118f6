//! WHOIS lookups for domain registration data.
//!
//! The lookup shells out to the system's `whois` command and parses its
//! `Key: value` output. Registries disagree on key names, so values are
//! collected under a normalized key (lowercase, alphanumerics only) and the
//! summary fields are filled from ordered fallback chains.

use crate::error::AnalysisError;
use crate::protocols::WhoisLookup;
use crate::types::{
    RegistrantInfo, RegistrarInfo, RegistrationDates, TechnicalContact, WhoisInfo, NOT_AVAILABLE,
    UNKNOWN,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// WHOIS client backed by the system `whois` command.
#[derive(Clone, Debug)]
pub struct WhoisClient {
    /// Upper bound on a single lookup
    timeout: Duration,
    /// Server passed with `-h`, when set
    server: Option<String>,
}

impl WhoisClient {
    /// Create a new WHOIS client with default settings.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            server: None,
        }
    }

    /// Create a new WHOIS client with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            server: None,
        }
    }

    /// Query a specific WHOIS server instead of the command's own referral logic.
    pub fn server<S: Into<String>>(mut self, server: S) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Look up registration data for a domain.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError` if:
    /// - The `whois` command is not available on the system
    /// - The lookup exceeds the configured timeout
    /// - The registry reports rate limiting
    /// - The domain is not registered or the output has no recognizable fields
    pub async fn lookup_domain(&self, domain: &str) -> Result<WhoisInfo, AnalysisError> {
        debug!(domain, server = ?self.server, "running whois lookup");

        let output = tokio::time::timeout(self.timeout, self.execute_whois_command(domain))
            .await
            .map_err(|_| AnalysisError::timeout("WHOIS query", self.timeout))??;

        let record = interpret_whois_output(domain, &output)?;
        debug!(domain, keys = record.len(), "parsed whois record");

        Ok(record.into_info())
    }

    /// Build the `whois` invocation. The domain always follows `--` so it is
    /// never read as an option.
    fn build_command(&self, domain: &str) -> Command {
        let mut command = Command::new("whois");
        if let Some(server) = &self.server {
            command.arg("-h").arg(server);
        }
        command.arg("--").arg(domain).kill_on_drop(true);
        command
    }

    /// Execute the system whois command and return its stdout.
    async fn execute_whois_command(&self, domain: &str) -> Result<String, AnalysisError> {
        let output = self.build_command(domain).output().await.map_err(|e| {
            AnalysisError::whois(
                domain,
                format!(
                    "Failed to execute whois command: {}. Make sure 'whois' is installed.",
                    e
                ),
            )
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim();
            return Err(AnalysisError::whois(
                domain,
                if reason.is_empty() {
                    "Empty WHOIS response".to_string()
                } else {
                    reason.to_string()
                },
            ));
        }

        Ok(stdout)
    }
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WhoisLookup for WhoisClient {
    async fn lookup(&self, domain: &str) -> Result<WhoisInfo, AnalysisError> {
        self.lookup_domain(domain).await
    }
}

/// Raw WHOIS fields keyed by normalized name, in order of appearance.
#[derive(Debug, Default, Clone)]
pub struct WhoisRecord {
    fields: HashMap<String, Vec<String>>,
}

impl WhoisRecord {
    /// Parse `Key: value` lines from raw WHOIS output.
    ///
    /// Comment lines, banners and lines without a value are skipped.
    pub fn parse(output: &str) -> Self {
        let mut record = Self::default();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || is_noise_line(line) {
                continue;
            }

            let Some((raw_key, raw_value)) = line.split_once(':') else {
                continue;
            };

            let key = normalize_key(raw_key);
            let value = raw_value.trim();
            if key.is_empty() || key.len() > 48 || value.is_empty() {
                continue;
            }

            let values = record.fields.entry(key).or_default();
            if !values.iter().any(|v| v == value) {
                values.push(value.to_string());
            }
        }

        record
    }

    /// First value for the first key in `keys` that has one.
    pub fn first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .flat_map(|values| values.iter())
            .map(String::as_str)
            .next()
    }

    /// All values across `keys`, in key order.
    pub fn all(&self, keys: &[&str]) -> Vec<&str> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .flat_map(|values| values.iter().map(String::as_str))
            .collect()
    }

    /// Number of distinct keys parsed.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any field that identifies a registration was found.
    pub fn has_registration_data(&self) -> bool {
        self.first(REGISTRAR_KEYS).is_some()
            || self.first(CREATED_KEYS).is_some()
            || self.first(EXPIRES_KEYS).is_some()
            || self.first(NAMESERVER_KEYS).is_some()
            || self.first(REGISTRANT_NAME_KEYS).is_some()
    }

    /// Build the normalized summary, defaulting missing fields.
    pub fn into_info(self) -> WhoisInfo {
        let text = |keys: &[&str]| self.first(keys).unwrap_or(NOT_AVAILABLE).to_string();
        let date = |keys: &[&str]| self.first(keys).unwrap_or(UNKNOWN).to_string();

        let mut nameservers: Vec<String> = Vec::new();
        for value in self.all(NAMESERVER_KEYS) {
            for ns in value.split_whitespace() {
                let ns = ns.trim_end_matches('.').to_lowercase();
                if !ns.is_empty() && !nameservers.contains(&ns) {
                    nameservers.push(ns);
                }
            }
        }

        let mut domain_status: Vec<String> = Vec::new();
        for value in self.all(STATUS_KEYS) {
            // Registries append the ICANN explanation URL after the code
            let code = value.split_whitespace().next().unwrap_or_default();
            if !code.is_empty() && !domain_status.iter().any(|s| s == code) {
                domain_status.push(code.to_string());
            }
        }

        WhoisInfo {
            registrant: RegistrantInfo {
                name: text(REGISTRANT_NAME_KEYS),
                email: text(&["registrantemail", "email", "emailaddress"]),
                country: text(&["registrantcountry", "country"]),
                state: text(&["registrantstateprovince", "registrantstate", "state"]),
                city: text(&["registrantcity", "city"]),
                address: text(&["registrantstreet", "registrantaddress", "address", "street"]),
                phone: text(&["registrantphone", "phone"]),
                fax: text(&["registrantfax", "fax", "faxno"]),
            },
            dates: RegistrationDates {
                created: date(CREATED_KEYS),
                updated: date(&["updateddate", "lastupdated", "lastmodified", "changed", "modified"]),
                expires: date(EXPIRES_KEYS),
            },
            technical: TechnicalContact {
                name: text(&["techname", "technicalname", "technicalcontactname"]),
                email: text(&["techemail", "technicalemail", "technicalcontactemail"]),
                phone: text(&["techphone", "technicalphone", "technicalcontactphone"]),
            },
            nameservers,
            registrar: RegistrarInfo {
                name: text(REGISTRAR_KEYS),
                iana_id: text(&["registrarianaid", "sponsoringregistrarianaid"]),
                url: text(&["registrarurl", "referralurl"]),
            },
            domain_status,
            dnssec: text(&["dnssec"]),
        }
    }
}

const REGISTRAR_KEYS: &[&str] = &["registrar", "sponsoringregistrar", "registrarname"];

const REGISTRANT_NAME_KEYS: &[&str] = &[
    "registrantorganization",
    "registrantorganisation",
    "organization",
    "organisation",
    "org",
    "registrar",
];

const CREATED_KEYS: &[&str] = &[
    "creationdate",
    "createddate",
    "created",
    "registeredon",
    "registrationtime",
    "domainregistrationdate",
];

const EXPIRES_KEYS: &[&str] = &[
    "registryexpirydate",
    "registrarregistrationexpirationdate",
    "expirationdate",
    "expirydate",
    "expireson",
    "expires",
    "paidtill",
];

const NAMESERVER_KEYS: &[&str] = &["nameserver", "nameservers", "nserver"];

const STATUS_KEYS: &[&str] = &["domainstatus", "status"];

/// Lowercase and keep only ASCII alphanumerics ("Registrant State/Province" -> "registrantstateprovince").
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Comment, banner and legal-notice lines that never carry fields.
fn is_noise_line(line: &str) -> bool {
    let noise_prefixes = ["%", "#", ">>>", "--", "NOTICE", "TERMS OF USE", "URL of the ICANN"];
    noise_prefixes.iter().any(|prefix| line.starts_with(prefix))
}

/// Turn raw `whois` output into a record, or the error it represents.
fn interpret_whois_output(domain: &str, output: &str) -> Result<WhoisRecord, AnalysisError> {
    if is_rate_limited(output) {
        return Err(AnalysisError::rate_limited(
            "whois",
            "WHOIS server rejected the query due to rate limiting",
        ));
    }

    let record = WhoisRecord::parse(output);

    if !record.has_registration_data() {
        let message = if indicates_unregistered(output) {
            "Domain is not registered"
        } else {
            "No registration data found in WHOIS response"
        };
        return Err(AnalysisError::whois(domain, message));
    }

    Ok(record)
}

/// Check if the WHOIS output indicates the domain has no registration.
fn indicates_unregistered(output: &str) -> bool {
    let output_lower = output.to_lowercase();
    let unregistered_patterns = [
        "no match",
        "not found",
        "no data found",
        "no entries found",
        "domain not found",
        "status: available",
        "status: free",
        "not registered",
        "no matching record",
        "no object found",
        "object does not exist",
        "this domain name has not been registered",
    ];

    unregistered_patterns
        .iter()
        .any(|pattern| output_lower.contains(pattern))
}

/// Check if the WHOIS output indicates rate limiting.
fn is_rate_limited(output: &str) -> bool {
    let output_lower = output.to_lowercase();
    let rate_limit_patterns = [
        "rate limit exceeded",
        "too many requests",
        "try again later",
        "quota exceeded",
        "limit exceeded",
        "throttled",
        "rate-limited",
        "too many requests from your ip",
    ];

    rate_limit_patterns
        .iter()
        .any(|pattern| output_lower.contains(pattern))
}

/// Check if the system has a `whois` command that can be spawned.
pub async fn is_whois_available() -> bool {
    command_available("whois").await
}

/// Some `whois` builds exit non-zero on `--version`, so only spawning counts.
async fn command_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERISIGN_SAMPLE: &str = "   Domain Name: EXAMPLE.COM
   Registry Domain ID: 2336799_DOMAIN_COM-VRSN
   Registrar WHOIS Server: whois.iana.org
   Registrar URL: http://res-dom.iana.org
   Updated Date: 2024-08-14T07:01:34Z
   Creation Date: 1995-08-14T04:00:00Z
   Registry Expiry Date: 2025-08-13T04:00:00Z
   Registrar: RESERVED-Internet Assigned Numbers Authority
   Registrar IANA ID: 376
   Domain Status: clientDeleteProhibited https://icann.org/epp#clientDeleteProhibited
   Domain Status: clientTransferProhibited https://icann.org/epp#clientTransferProhibited
   Name Server: A.IANA-SERVERS.NET
   Name Server: B.IANA-SERVERS.NET
   DNSSEC: signedDelegation
   URL of the ICANN Whois Inaccuracy Complaint Form: https://www.icann.org/wicf/
>>> Last update of whois database: 2024-09-01T00:00:00Z <<<

Domain Name: example.com
Registrant Organization: Internet Assigned Numbers Authority
Registrant State/Province: CA
Registrant Country: US
Registrant Email: Select Request Email Form at https://example.net
Tech Name: REDACTED FOR PRIVACY
";

    #[test]
    fn test_parse_registry_and_registrar_sections() {
        let record = WhoisRecord::parse(VERISIGN_SAMPLE);
        assert!(record.has_registration_data());

        let info = record.into_info();
        assert_eq!(info.registrar.name, "RESERVED-Internet Assigned Numbers Authority");
        assert_eq!(info.registrar.iana_id, "376");
        assert_eq!(info.registrar.url, "http://res-dom.iana.org");
        assert_eq!(info.dates.created, "1995-08-14T04:00:00Z");
        assert_eq!(info.dates.updated, "2024-08-14T07:01:34Z");
        assert_eq!(info.dates.expires, "2025-08-13T04:00:00Z");
        assert_eq!(info.registrant.name, "Internet Assigned Numbers Authority");
        assert_eq!(info.registrant.state, "CA");
        assert_eq!(info.registrant.country, "US");
        assert_eq!(info.technical.name, "REDACTED FOR PRIVACY");
        assert_eq!(info.dnssec, "signedDelegation");
        assert_eq!(info.nameservers, vec!["a.iana-servers.net", "b.iana-servers.net"]);
        assert_eq!(
            info.domain_status,
            vec!["clientDeleteProhibited", "clientTransferProhibited"]
        );
    }

    #[test]
    fn test_missing_fields_default_to_sentinels() {
        let info = WhoisRecord::parse("Registrar: Example Registrar, Inc.\n").into_info();

        assert_eq!(info.registrar.name, "Example Registrar, Inc.");
        // Registrant name falls back to the registrar when no organization is listed
        assert_eq!(info.registrant.name, "Example Registrar, Inc.");
        assert_eq!(info.registrant.email, NOT_AVAILABLE);
        assert_eq!(info.registrant.country, NOT_AVAILABLE);
        assert_eq!(info.dates.created, UNKNOWN);
        assert_eq!(info.dates.expires, UNKNOWN);
        assert_eq!(info.dnssec, NOT_AVAILABLE);
        assert!(info.nameservers.is_empty());
        assert!(info.domain_status.is_empty());
    }

    #[test]
    fn test_ripe_style_keys() {
        let output = "% This is the RIPE Database query service.\n\
                      domain:   example.de\n\
                      nserver:  ns1.example.net\n\
                      nserver:  ns2.example.net\n\
                      status:   connect\n\
                      changed:  2020-01-01T00:00:00+01:00\n\
                      org:      Example GmbH\n\
                      country:  DE\n";

        let info = WhoisRecord::parse(output).into_info();
        assert_eq!(info.registrant.name, "Example GmbH");
        assert_eq!(info.registrant.country, "DE");
        assert_eq!(info.dates.updated, "2020-01-01T00:00:00+01:00");
        assert_eq!(info.nameservers, vec!["ns1.example.net", "ns2.example.net"]);
        assert_eq!(info.domain_status, vec!["connect"]);
    }

    #[test]
    fn test_unregistered_domain_is_an_error() {
        let output = "No match for \"NOPE-NOT-REGISTERED-123.COM\".\n>>> Last update of whois database <<<\n";
        let err = interpret_whois_output("nope-not-registered-123.com", output).unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_unrecognized_output_is_an_error() {
        let err = interpret_whois_output("example.com", "some banner text\nwithout fields\n")
            .unwrap_err();
        assert!(matches!(err, AnalysisError::WhoisError { .. }));
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited("Rate limit exceeded. Try again later."));
        assert!(is_rate_limited("Too many requests from your IP."));
        assert!(!is_rate_limited("Normal whois response"));

        let err = interpret_whois_output("example.com", "Query rate limit exceeded\n").unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited { .. }));
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Registrant State/Province"), "registrantstateprovince");
        assert_eq!(normalize_key("Registrar IANA ID"), "registrarianaid");
        assert_eq!(normalize_key("  DNSSEC "), "dnssec");
    }

    #[test]
    fn test_whois_client_creation() {
        let client = WhoisClient::new();
        assert_eq!(client.timeout, Duration::from_secs(10));
        assert!(client.server.is_none());

        let custom = WhoisClient::with_timeout(Duration::from_secs(3)).server("whois.verisign-grs.com");
        assert_eq!(custom.timeout, Duration::from_secs(3));
        assert_eq!(custom.server.as_deref(), Some("whois.verisign-grs.com"));
    }

    #[test]
    fn test_domain_follows_option_terminator() {
        let client = WhoisClient::new().server("whois.verisign-grs.com");
        let command = client.build_command("-hwhois.attacker.example");
        let args: Vec<_> = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            ["-h", "whois.verisign-grs.com", "--", "-hwhois.attacker.example"]
        );

        let plain = WhoisClient::new().build_command("example.com");
        let args: Vec<_> = plain.as_std().get_args().collect();
        assert_eq!(args, ["--", "example.com"]);
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        assert!(!command_available("domain-intel-no-such-command").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawnable_command_is_available() {
        assert!(command_available("sh").await);
    }

    #[tokio::test]
    #[ignore]
    async fn test_whois_lookup_live() {
        if is_whois_available().await {
            let client = WhoisClient::new();
            let info = client.lookup_domain("google.com").await.unwrap();
            assert_ne!(info.registrar.name, NOT_AVAILABLE);
        }
    }
}
