//! Deterministic lexical reranking.
//!
//! A chunk's rerank delta is [`score_chunk_text`] plus [`path_adjustment`];
//! the orchestrator adds it to the raw vector similarity.
//!
//! | Signal | Weight |
//! |--------|--------|
//! | keyword | +1.0 |
//! | exception name | +1.5 |
//! | stack frame (last dotted segment) | +0.75 |
//! | endpoint | +1.25 |
//!
//! | Path | Adjustment |
//! |------|------------|
//! | test code | −3.0, nothing else applies |
//! | `model/` or `dto/` segment | −1.0 |
//! | `config/` segment | +0.5 |
//! | `service/`, `repository/` or `client/` segment | +0.3 |
//! | `application.yml`, `application.yaml`, `application.properties` | +0.8 |

use crate::models::IncidentSignals;
use crate::scanner::is_test_path;

pub const KEYWORD_WEIGHT: f64 = 1.0;
pub const EXCEPTION_WEIGHT: f64 = 1.5;
pub const FRAME_WEIGHT: f64 = 0.75;
pub const ENDPOINT_WEIGHT: f64 = 1.25;

pub const TEST_PENALTY: f64 = -3.0;
pub const MODEL_PENALTY: f64 = -1.0;
pub const CONFIG_DIR_BONUS: f64 = 0.5;
pub const LAYER_BONUS: f64 = 0.3;
pub const APP_CONFIG_BONUS: f64 = 0.8;

const APP_CONFIG_FILES: &[&str] = &[
    "application.yml",
    "application.yaml",
    "application.properties",
];

/// Signal score for one chunk. Each signal counts at most once, however
/// often it occurs in the text; matching is case-insensitive containment.
pub fn score_chunk_text(text: &str, signals: &IncidentSignals) -> f64 {
    let text = text.to_lowercase();
    let contains = |needle: &str| !needle.is_empty() && text.contains(&needle.to_lowercase());
    let mut score = 0.0;

    for kw in &signals.keywords {
        if contains(kw) {
            score += KEYWORD_WEIGHT;
        }
    }
    for exc in &signals.exceptions {
        if contains(exc) {
            score += EXCEPTION_WEIGHT;
        }
    }
    for frame in &signals.frames {
        // imports and formatting vary, the method or class name does not
        let last = frame.rsplit('.').next().unwrap_or(frame);
        if contains(last) {
            score += FRAME_WEIGHT;
        }
    }
    for ep in &signals.endpoints {
        if contains(ep) {
            score += ENDPOINT_WEIGHT;
        }
    }

    score
}

/// Signal-independent adjustment for a repository path.
pub fn path_adjustment(path: &str) -> f64 {
    if is_test_path(path) {
        return TEST_PENALTY;
    }

    let lower = path.replace('\\', "/").to_lowercase();
    let segments: Vec<&str> = lower.split('/').collect();
    let file_name = segments.last().copied().unwrap_or("");
    let dirs = &segments[..segments.len().saturating_sub(1)];
    let has_dir = |names: &[&str]| dirs.iter().any(|d| names.contains(d));

    let mut adjustment = 0.0;
    if has_dir(&["model", "dto"]) {
        adjustment += MODEL_PENALTY;
    }
    if has_dir(&["config"]) {
        adjustment += CONFIG_DIR_BONUS;
    }
    if has_dir(&["service", "repository", "client"]) {
        adjustment += LAYER_BONUS;
    }
    if APP_CONFIG_FILES.contains(&file_name) {
        adjustment += APP_CONFIG_BONUS;
    }
    adjustment
}

/// Combined rerank delta for a chunk.
pub fn rerank_score(path: &str, text: &str, signals: &IncidentSignals) -> f64 {
    score_chunk_text(text, signals) + path_adjustment(path)
}
