//! Extraction and validation of provider estimates
//!
//! Providers often wrap their JSON in prose or a fenced code block. The
//! first balanced top-level object that parses as JSON is taken as the
//! payload, then checked field by field.

use super::types::EstimationResponse;
use crate::corpus::Size;
use serde::Deserialize;

/// Why a provider payload was rejected
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("no JSON object found in provider response")]
    NoJsonObject,

    #[error("malformed estimate: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid estimate: {0}")]
    Invalid(String),
}

/// Payload as sent by the provider, before validation
#[derive(Debug, Deserialize)]
struct RawEstimation {
    estimated_hours: Option<f64>,
    estimated_size: Option<String>,
    story_points: Option<f64>,
    confidence_score: Option<f64>,
    reasoning: Option<String>,
    #[serde(default)]
    assumptions: Option<Vec<String>>,
    #[serde(default)]
    risks: Option<Vec<String>>,
    #[serde(default)]
    recommended_action: Option<String>,
}

/// Locate the first balanced top-level JSON object in free text
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        match balanced_object_end(&text[start..]) {
            Some(len) => {
                let candidate = &text[start..start + len];
                if serde_json::from_str::<serde_json::Value>(candidate)
                    .map(|v| v.is_object())
                    .unwrap_or(false)
                {
                    return Some(candidate);
                }
                search_from = start + 1;
            }
            // A stray brace in prose; a later one may still open the payload
            None => search_from = start + 1,
        }
    }
    None
}

/// Byte length of the object opening at the start of `text`, if it closes
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract, parse and validate an estimate from raw provider output
pub fn parse_estimation_response(text: &str) -> Result<EstimationResponse, ResponseError> {
    let json = extract_json_object(text).ok_or(ResponseError::NoJsonObject)?;
    let raw: RawEstimation = serde_json::from_str(json)?;
    validate(raw)
}

fn validate(raw: RawEstimation) -> Result<EstimationResponse, ResponseError> {
    let estimated_hours = required(raw.estimated_hours, "estimated_hours")?;
    if !estimated_hours.is_finite() || estimated_hours <= 0.0 {
        return Err(ResponseError::Invalid(format!(
            "estimated_hours must be positive, got {}",
            estimated_hours
        )));
    }

    let story_points = required(raw.story_points, "story_points")?;
    if !story_points.is_finite() || story_points < 0.0 {
        return Err(ResponseError::Invalid(format!(
            "story_points must be non-negative, got {}",
            story_points
        )));
    }

    let confidence_score = required(raw.confidence_score, "confidence_score")?;
    if !(0.0..=1.0).contains(&confidence_score) {
        return Err(ResponseError::Invalid(format!(
            "confidence_score must be between 0.0 and 1.0, got {}",
            confidence_score
        )));
    }

    let size_code = required(raw.estimated_size, "estimated_size")?;
    let estimated_size: Size = size_code.parse().map_err(ResponseError::Invalid)?;

    let reasoning = raw.reasoning.unwrap_or_default();
    if reasoning.trim().is_empty() {
        return Err(ResponseError::Invalid("reasoning is required".to_string()));
    }

    Ok(EstimationResponse {
        estimated_hours,
        estimated_size,
        story_points,
        confidence_score,
        reasoning,
        assumptions: raw.assumptions.unwrap_or_default(),
        risks: raw.risks.unwrap_or_default(),
        recommended_action: raw.recommended_action.filter(|a| !a.trim().is_empty()),
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ResponseError> {
    value.ok_or_else(|| ResponseError::Invalid(format!("{} is required", field)))
}
