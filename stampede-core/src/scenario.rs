use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::HttpProtocol;
use crate::error::ConfigError;
use crate::extract::ExtractionRule;
use crate::template::{HeaderTemplate, Template};

/// A named, ordered step sequence. Shared read-only by every virtual user of a run.
#[derive(Debug, Clone)]
pub struct ScenarioDefinition {
    pub name: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone)]
pub enum Step {
    Request(RequestStep),
    Pause(PauseStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseStep {
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub enum BodySource {
    #[default]
    Empty,
    Bytes(Bytes),
    Template(Template),
}

/// One HTTP interaction, optionally followed by concurrently fetched resources.
#[derive(Debug, Clone)]
pub struct RequestStep {
    pub name: Arc<str>,
    pub method: http::Method,
    pub url: Template,
    pub headers: HeaderTemplate,
    pub body: BodySource,
    pub extract: Arc<[ExtractionRule]>,
    pub resources: Vec<RequestStep>,
}

impl RequestStep {
    pub fn new(name: &str, method: http::Method, url: Template) -> Self {
        Self {
            name: Arc::from(name),
            method,
            url,
            headers: HeaderTemplate::new(),
            body: BodySource::Empty,
            extract: Arc::from(Vec::new()),
            resources: Vec::new(),
        }
    }

    pub fn get(name: &str, url: Template) -> Self {
        Self::new(name, http::Method::GET, url)
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderTemplate) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: Template) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: BodySource) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_extract(mut self, rules: Vec<ExtractionRule>) -> Self {
        self.extract = Arc::from(rules);
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: RequestStep) -> Self {
        self.resources.push(resource);
        self
    }

    fn validate(&self, protocol: &HttpProtocol, is_resource: bool) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyStepName);
        }
        if is_resource && !self.resources.is_empty() {
            return Err(ConfigError::NestedResources(self.name.to_string()));
        }

        for (name, _) in self.headers.iter() {
            validate_header_name(name)?;
        }

        if protocol.base_url().is_none() && self.url.is_literal() && !is_absolute(self.url.as_str())
        {
            return Err(ConfigError::RelativeUrlWithoutBase {
                step: self.name.to_string(),
                url: self.url.as_str().to_string(),
            });
        }

        for resource in &self.resources {
            resource.validate(protocol, true)?;
        }
        Ok(())
    }
}

impl ScenarioDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn request(mut self, step: RequestStep) -> Self {
        self.steps.push(Step::Request(step));
        self
    }

    #[must_use]
    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Pause(PauseStep { duration }));
        self
    }

    /// Structural checks run once before any user starts.
    pub fn validate(&self, protocol: &HttpProtocol) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyScenarioName);
        }
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps(self.name.clone()));
        }

        for (name, _) in protocol.default_headers.iter() {
            validate_header_name(name)?;
        }

        for step in &self.steps {
            if let Step::Request(req) = step {
                req.validate(protocol, false)?;
            }
        }
        Ok(())
    }

    /// Primary requests plus their resources, in declaration order.
    pub fn request_count(&self) -> usize {
        self.steps
            .iter()
            .map(|s| match s {
                Step::Request(r) => 1 + r.resources.len(),
                Step::Pause(_) => 0,
            })
            .sum()
    }
}

fn validate_header_name(name: &str) -> Result<(), ConfigError> {
    http::HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidHeaderName(name.to_string()))
}

pub(crate) fn is_absolute(url: &str) -> bool {
    url::Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
