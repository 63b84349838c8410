use std::sync::Arc;

use serde_json::Value;
use stampede_http::HttpResponse;

use crate::error::ConfigError;

/// Where a captured value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractSource {
    /// Response header, matched case-insensitively.
    Header(String),
    /// Field of a JSON body addressed by a dotted path (`user.id`, `items.0.sku`).
    JsonField(Vec<String>),
    /// The numeric status code.
    Status,
}

/// Capture one value from a response into the session under `into`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    pub source: ExtractSource,
    pub into: String,
}

impl ExtractionRule {
    pub fn header(name: impl Into<String>, into: impl Into<String>) -> Self {
        Self {
            source: ExtractSource::Header(name.into()),
            into: into.into(),
        }
    }

    /// `path` may start with `$.`; empty path segments are rejected.
    pub fn json(path: &str, into: impl Into<String>) -> Result<Self, ConfigError> {
        let into = into.into();
        let trimmed = path.strip_prefix("$.").unwrap_or(path);
        let segments: Vec<String> = trimmed.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidExtraction {
                into,
                reason: "json path has an empty segment",
            });
        }
        Ok(Self {
            source: ExtractSource::JsonField(segments),
            into,
        })
    }

    pub fn status(into: impl Into<String>) -> Self {
        Self {
            source: ExtractSource::Status,
            into: into.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("response has no `{0}` header")]
    MissingHeader(String),

    #[error("response body is not valid JSON")]
    BodyNotJson,

    #[error("json field `{0}` is missing or null")]
    MissingField(String),
}

/// A capture rule didn't match the response. Logged and counted; the request still counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    pub step: Arc<str>,
    pub key: String,
    pub failure: ExtractionFailure,
}

pub(crate) type SessionUpdates = Vec<(String, String)>;

/// Run every rule against `res`. The session is not touched here; callers apply the
/// returned updates at the point the step's ordering rules allow.
pub(crate) fn extract(
    step: &Arc<str>,
    rules: &[ExtractionRule],
    res: &HttpResponse,
) -> (SessionUpdates, Vec<ExtractionWarning>) {
    let mut updates = Vec::new();
    let mut warnings = Vec::new();

    // Parse the body at most once, and only if some rule needs it.
    let mut json: Option<Option<Value>> = None;

    for rule in rules {
        let value = match &rule.source {
            ExtractSource::Header(name) => res
                .header(name)
                .map(str::to_string)
                .ok_or_else(|| ExtractionFailure::MissingHeader(name.clone())),
            ExtractSource::Status => Ok(res.status.to_string()),
            ExtractSource::JsonField(path) => {
                let body = json.get_or_insert_with(|| serde_json::from_slice(&res.body).ok());
                match body {
                    None => Err(ExtractionFailure::BodyNotJson),
                    Some(body) => json_field(body, path)
                        .ok_or_else(|| ExtractionFailure::MissingField(path.join("."))),
                }
            }
        };

        match value {
            Ok(v) => updates.push((rule.into.clone(), v)),
            Err(failure) => warnings.push(ExtractionWarning {
                step: step.clone(),
                key: rule.into.clone(),
                failure,
            }),
        }
    }

    (updates, warnings)
}

fn json_field(root: &Value, path: &[String]) -> Option<String> {
    let mut cur = root;
    for segment in path {
        cur = match cur {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match cur {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
