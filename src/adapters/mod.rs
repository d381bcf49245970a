pub mod apollo;
pub mod google_maps;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;

pub use apollo::ApolloAdapter;
pub use google_maps::GoogleMapsAdapter;
pub use instagram::InstagramAdapter;
pub use linkedin::LinkedinAdapter;
pub use tiktok::TiktokAdapter;

use async_trait::async_trait;
use failsafe::backoff::Exponential;
use failsafe::failure_policy::ConsecutiveFailures;
use failsafe::{backoff, failure_policy, StateMachine};
use phonenumber::Mode;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::LeadError;
use crate::models::{FetchRequest, LeadSource, NewLead};
use crate::usage::UsageSink;

/// Common fetch contract implemented once per provider.
///
/// Implementations must return `Ok(vec![])` for empty upstream results and
/// reserve errors for failed calls or malformed payloads. Every successful
/// fetch reports its credit consumption to the usage sink, even when the
/// caller discards the results.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> LeadSource;

    async fn fetch_leads(&self, request: &FetchRequest) -> Result<Vec<NewLead>, LeadError>;
}

// ---------------------------------------------------------------------------
// Provider call plumbing
// ---------------------------------------------------------------------------

pub(crate) type ProviderBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Circuit breaker applied to every provider client: five consecutive
/// failures open the circuit, recovery probes back off from 10s to 60s.
pub(crate) fn provider_circuit_breaker() -> ProviderBreaker {
    let backoff_strategy =
        backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let policy = failure_policy::consecutive_failures(5, backoff_strategy);
    failsafe::Config::new().failure_policy(policy).build()
}

pub(crate) fn provider_http_client(timeout_secs: u64) -> Result<reqwest::Client, LeadError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LeadError::Internal(format!("Failed to build provider client: {}", e)))
}

/// Sends a prepared provider request through the circuit breaker and returns
/// the parsed JSON body. Non-2xx responses and unparseable bodies both map
/// to a provider error.
pub(crate) async fn send_provider_request(
    breaker: &ProviderBreaker,
    source: LeadSource,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, LeadError> {
    use failsafe::futures::CircuitBreaker;

    let call = async {
        let response = request
            .send()
            .await
            .map_err(|e| LeadError::provider(source, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LeadError::provider(
                source,
                format!("returned status {}: {}", status, error_text),
            ));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| LeadError::provider(source, format!("malformed payload: {}", e)))
    };

    match breaker.call(call).await {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(e)) => Err(e),
        Err(failsafe::Error::Rejected) => Err(LeadError::provider(
            source,
            "circuit open after repeated failures, failing fast",
        )),
    }
}

/// Reports consumed credits, logging and swallowing tracking failures so a
/// ledger hiccup never fails a fetch that already succeeded upstream.
pub(crate) async fn report_usage(
    usage: &Arc<dyn UsageSink>,
    source: LeadSource,
    credits: i64,
    credential_ref: &str,
) {
    if let Err(e) = usage.track(source, credits, credential_ref).await {
        tracing::warn!("Failed to track {} credits for {}: {}", credits, source, e);
    }
}

/// A successful provider call costs at least one credit even when it
/// returned no usable leads.
pub(crate) fn credits_for(lead_count: usize) -> i64 {
    (lead_count as i64).max(1)
}

// ---------------------------------------------------------------------------
// Scoring helpers shared by the adapters
// ---------------------------------------------------------------------------

/// Conversion potential is capped strictly below 1.0: even a perfect set of
/// signals leaves an uncertainty margin.
pub const MAX_CONVERSION_POTENTIAL: f64 = 0.95;

pub fn clamp_potential(potential: f64) -> f64 {
    potential.clamp(0.0, MAX_CONVERSION_POTENTIAL)
}

/// Maps conversion potential to the 0..=100 score scale using per-provider
/// base/range reflecting that channel's typical lead quality.
pub fn derive_score(base: f64, range: f64, potential: f64) -> i32 {
    ((base + potential * range).round() as i32).clamp(0, 100)
}

/// Linear recency bonus: full at zero days since activity, zero at 90 days
/// or unknown.
pub fn recency_boost(days_since_active: Option<i64>, max_bonus: f64) -> f64 {
    match days_since_active {
        Some(days) if days < 0 => max_bonus,
        Some(days) if days <= 90 => max_bonus * (1.0 - days as f64 / 90.0),
        _ => 0.0,
    }
}

/// Token-overlap relevance of free text against the requested niche or
/// industry. Returns a fraction of `max_bonus`.
pub fn relevance_boost(haystack: &str, needle: Option<&str>, max_bonus: f64) -> f64 {
    let Some(needle) = needle else {
        return 0.0;
    };
    let haystack = haystack.to_lowercase();
    let tokens: Vec<&str> = needle
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens
        .iter()
        .filter(|t| haystack.contains(&t.to_lowercase()))
        .count();
    max_bonus * hits as f64 / tokens.len() as f64
}

// ---------------------------------------------------------------------------
// Contact normalization
// ---------------------------------------------------------------------------

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Simplified RFC 5322: local@domain.tld
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email regex is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }
    // Obvious placeholder addresses providers sometimes return
    if email.contains("999999") || email.contains("111111") || email.starts_with("test@") {
        return false;
    }
    email_regex().is_match(email)
}

/// Best-effort E.164 normalization; unparseable numbers pass through with
/// non-digits stripped.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = phonenumber::parse(None, trimmed) {
        if phonenumber::is_valid(&parsed) {
            return Some(parsed.format().mode(Mode::E164).to_string());
        }
    }
    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if digits.chars().filter(|c| c.is_ascii_digit()).count() >= 7 {
        Some(digits)
    } else {
        None
    }
}

/// Splits a display name into first/last. Single-token names keep an empty
/// last name.
pub fn split_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or("").to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}
