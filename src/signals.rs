//! Lexical signal extraction from incident text.
//!
//! Four token families are pulled out of free text:
//!
//! | Family | Example | Rule |
//! |--------|---------|------|
//! | endpoints | `/api/v1/payments` | `/api/` followed by URL-safe characters |
//! | exceptions | `SQLTransientConnectionException` | capitalized identifier ending in `Exception` or `Error` |
//! | frames | `com.acme.PaymentService.charge` | dotted name after `at`, directly followed by `(...)` |
//! | keywords | `timeout`, `p99` | fixed infra vocabulary, case-insensitive, lowercased |

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::IncidentSignals;

static ENDPOINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(/api/[a-zA-Z0-9/_\-.]+)").expect("valid endpoint regex"));

static EXCEPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z0-9_]+(?:Exception|Error))\b").expect("valid exception regex")
});

static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat\s+([a-zA-Z_][\w$]*(?:\.[a-zA-Z_][\w$]*)+)\(([^)]*)\)")
        .expect("valid stack frame regex")
});

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(HikariPool|Hikari|Timeout|timed out|Connection is not available|PSQLException|deadlock|lock|retry|retries|circuit|throttle|rate limit|OOM|OutOfMemory|GC|pause|latency|p99|p95)\b",
    )
    .expect("valid keyword regex")
});

fn captures(re: &Regex, text: &str) -> BTreeSet<String> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extract deduplicated signals from `text`. Pure and deterministic.
pub fn extract_signals(text: &str) -> IncidentSignals {
    IncidentSignals {
        endpoints: captures(&ENDPOINT_RE, text),
        exceptions: captures(&EXCEPTION_RE, text),
        frames: captures(&FRAME_RE, text),
        keywords: KEYWORD_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .collect(),
    }
}
