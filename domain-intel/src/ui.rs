//! Pretty-mode display logic for the domain-intel CLI.
//!
//! This module handles the human-readable batch output: the spinner shown
//! while analyses run, one block per analyzed domain, and a closing summary.
//! Uses only the `console` crate.

use console::{pad_str, style, Alignment, Term};
use domain_intel_lib::{
    AnalysisError, AnalysisResponse, Lookup, WebsiteInfo, WhoisInfo, NOT_AVAILABLE, NOT_FOUND,
    UNKNOWN,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner, or return `None` when stderr is not a terminal.
    pub fn start(message: String) -> Option<Self> {
        if !Term::stderr().is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a multi-domain run.
pub fn print_header(domain_count: usize, concurrency: usize) {
    println!(
        "{} {} {}",
        style("domain-intel").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- Analyzing {} domain{} | Concurrency: {}",
            domain_count,
            if domain_count == 1 { "" } else { "s" },
            concurrency
        ))
        .dim(),
    );
    println!();
}

// ── Analysis block ───────────────────────────────────────────────────────────

/// Print one analyzed domain as a titled block of labeled lines.
pub fn print_analysis(response: &AnalysisResponse, debug: bool) {
    let result = &response.result;
    let cached = if response.cached {
        format!(" {}", style("(cached)").dim())
    } else {
        String::new()
    };
    println!("{}{}", style(&result.domain).bold().underlined(), cached);

    println!("  {}", style("WHOIS").cyan().bold());
    match &result.whois {
        Lookup::Found(info) => print_rows(&whois_rows(info)),
        Lookup::Failed(marker) => print_marker(&marker.error, &marker.details, debug),
    }

    println!("  {}", style("Website").cyan().bold());
    match &result.website {
        Lookup::Found(info) => print_rows(&website_rows(info)),
        Lookup::Failed(marker) => print_marker(&marker.error, &marker.details, debug),
    }

    println!(
        "  {}",
        style(format!("Researched at {}", result.researched_at.to_rfc3339())).dim()
    );
    println!();
}

/// Print an input that could not be analyzed at all.
pub fn print_failure(input: &str, error: &AnalysisError) {
    println!(
        "{}  {}  {}",
        style(if input.is_empty() { "<empty>" } else { input }).bold(),
        style("ERROR").red().bold(),
        style(error).dim()
    );
    println!();
}

/// Print the closing line of a multi-domain run.
pub fn print_summary(total: usize, failed: usize, duration: Duration) {
    let analyzed = total - failed;
    let mut line = format!(
        "{} analyzed in {:.1}s",
        style(analyzed).green().bold(),
        duration.as_secs_f64()
    );
    if failed > 0 {
        line.push_str(&format!(", {} failed", style(failed).red().bold()));
    }
    println!("{}", line);
}

fn print_rows(rows: &[(&'static str, String)]) {
    for (label, value) in rows {
        let padded = pad_str(label, 14, Alignment::Left, None);
        println!("    {} {}", style(padded).dim(), value);
    }
}

fn print_marker(error: &str, details: &str, debug: bool) {
    if debug {
        println!("    {} {}", style(error).yellow(), style(details).dim());
    } else {
        println!("    {}", style(error).yellow());
    }
}

/// Labeled WHOIS lines, omitting fields the registry did not report.
pub fn whois_rows(info: &WhoisInfo) -> Vec<(&'static str, String)> {
    let mut rows: Vec<(&'static str, String)> = Vec::new();
    let mut push = |label: &'static str, value: &str| {
        if value != NOT_AVAILABLE && value != UNKNOWN && !value.is_empty() {
            rows.push((label, value.to_string()));
        }
    };

    push("Registrar", &info.registrar.name);
    push("Registrant", &info.registrant.name);
    push("Country", &info.registrant.country);
    push("Created", &info.dates.created);
    push("Updated", &info.dates.updated);
    push("Expires", &info.dates.expires);
    push("Nameservers", &info.nameservers.join(", "));
    push("Status", &info.domain_status.join(", "));
    push("DNSSEC", &info.dnssec);
    rows
}

/// Labeled website lines, omitting fields that were not found on the page.
pub fn website_rows(info: &WebsiteInfo) -> Vec<(&'static str, String)> {
    let mut rows: Vec<(&'static str, String)> = vec![("HTTP status", info.status.to_string())];

    let optional = [
        ("Title", info.title.as_deref()),
        ("Description", info.description.as_deref()),
        ("Canonical", info.canonical.as_deref()),
        ("Email", info.contact.email.as_deref()),
        ("Phone", info.contact.phone.as_deref()),
    ];
    rows.extend(
        optional
            .into_iter()
            .filter_map(|(label, value)| value.map(|v| (label, v.to_string()))),
    );

    if info.company_name != NOT_FOUND {
        rows.push(("Company", info.company_name.clone()));
    }
    if info.address != NOT_FOUND {
        rows.push(("Address", info.address.clone()));
    }
    if !info.technologies.is_empty() {
        rows.push(("Technologies", info.technologies.join(", ")));
    }

    let social = &info.social_media;
    let profiles: Vec<&str> = [
        social.facebook.as_deref(),
        social.twitter.as_deref(),
        social.linkedin.as_deref(),
        social.instagram.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !profiles.is_empty() {
        rows.push(("Social", profiles.join(" ")));
    }

    rows
}
