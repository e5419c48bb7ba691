//! Tolerant parsing of model output.

use regex::Regex;
use serde::Deserialize;

use crate::error::ProviderError;

/// A model's verdict on one (task, slot) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairVerdict {
    pub confidence: f64,
    pub rationale: String,
}

/// Parse and validate a pair-scoring answer.
///
/// The confidence must be a finite number in [0, 1] and the rationale must
/// not be blank.
pub fn parse_pair_verdict(raw: &str) -> Result<PairVerdict, ProviderError> {
    #[derive(Deserialize)]
    struct RawVerdict {
        confidence: Option<serde_json::Value>,
        rationale: Option<String>,
    }

    let json = extract_json(raw)
        .ok_or_else(|| ProviderError::Malformed("no JSON object in response".to_string()))?;
    let verdict: RawVerdict =
        serde_json::from_str(&json).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let confidence = verdict
        .confidence
        .as_ref()
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ProviderError::Malformed("confidence is not a number".to_string()))?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(ProviderError::Malformed(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }

    let rationale = verdict.rationale.unwrap_or_default().trim().to_string();
    if rationale.is_empty() {
        return Err(ProviderError::Malformed("rationale is empty".to_string()));
    }

    Ok(PairVerdict {
        confidence,
        rationale,
    })
}

/// Extract a JSON object from text that may wrap it in prose or markdown.
pub fn extract_json(s: &str) -> Option<String> {
    // Whole string
    let trimmed = s.trim();
    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    // Fenced code block
    let re = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let candidate = cap.get(1)?.as_str().trim();
        if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }

    // First balanced object
    let brace_start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s[brace_start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &s[brace_start..brace_start + i + 1];
                    return serde_json::from_str::<serde_json::Value>(candidate)
                        .is_ok()
                        .then(|| candidate.to_string());
                }
            }
            _ => {}
        }
    }

    None
}
