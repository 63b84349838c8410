use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use stampede_http::HttpRequest;

use crate::config::HttpProtocol;
use crate::scenario::{BodySource, RequestStep, is_absolute};
use crate::session::SessionState;
use crate::template::UnresolvedReference;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    UnresolvedReference(#[from] UnresolvedReference),

    #[error("invalid url `{0}`")]
    InvalidUrl(String),
}

/// A step bound to one user's session. Owns everything needed to dispatch it.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub step: Arc<str>,
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResolvedRequest {
    pub fn to_http_request(&self, timeout: Duration) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: Some(timeout),
        }
    }
}

/// Substitute session references into `step`'s url, headers and body.
///
/// Protocol default headers sit beneath the step's own headers.
pub fn resolve_request(
    step: &RequestStep,
    session: &SessionState,
    protocol: &HttpProtocol,
) -> Result<ResolvedRequest, ResolveError> {
    let url = step.url.render(session)?;
    let url = absolute_url(&url, protocol.base_url())?;

    let headers = if protocol.default_headers.is_empty() {
        step.headers.render(session)?
    } else {
        protocol.default_headers.merge(&step.headers).render(session)?
    };

    let body = match &step.body {
        BodySource::Empty => Bytes::new(),
        BodySource::Bytes(bytes) => bytes.clone(),
        BodySource::Template(t) => Bytes::from(t.render(session)?.into_owned()),
    };

    Ok(ResolvedRequest {
        step: step.name.clone(),
        method: step.method.clone(),
        url,
        headers,
        body,
    })
}

fn absolute_url(url: &str, base_url: Option<&str>) -> Result<String, ResolveError> {
    if is_absolute(url) {
        return Ok(url.to_string());
    }

    let Some(base) = base_url else {
        return Err(ResolveError::InvalidUrl(url.to_string()));
    };
    let joined = if url.starts_with('/') {
        format!("{base}{url}")
    } else {
        format!("{base}/{url}")
    };

    if is_absolute(&joined) {
        Ok(joined)
    } else {
        Err(ResolveError::InvalidUrl(joined))
    }
}
