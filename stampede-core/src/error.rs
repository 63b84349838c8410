use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A malformed scenario, workload profile or run option. Fatal before the run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("scenario name must not be empty")]
    EmptyScenarioName,

    #[error("scenario `{0}` has no steps")]
    NoSteps(String),

    #[error("request step names must not be empty")]
    EmptyStepName,

    #[error("resource `{0}` declares its own resources (resources cannot be nested)")]
    NestedResources(String),

    #[error("`ratePerSecond` must be a positive, finite number")]
    InvalidRate,

    #[error("`duration` must be positive and at most one year")]
    InvalidDuration,

    #[error("pause in scenario `{0}` must be a finite duration")]
    InvalidPause(String),

    #[error(
        "invalid injection mode `{0}` (expected `constant-rate` or `constant-rate-randomized`)"
    )]
    InvalidMode(String),

    #[error("invalid jitter policy `{0}` (expected `uniform` or `poisson`)")]
    InvalidJitter(String),

    #[error("`request_timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("invalid template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: &'static str },

    #[error("invalid base url `{0}` (expected an absolute http:// or https:// url)")]
    InvalidBaseUrl(String),

    #[error("invalid http method `{0}`")]
    InvalidMethod(String),

    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    #[error("unknown header set `{0}`")]
    UnknownHeaderSet(String),

    #[error("step `{step}` uses relative url `{url}` but no base url is configured")]
    RelativeUrlWithoutBase { step: String, url: String },

    #[error("invalid extraction rule for `{into}`: {reason}")]
    InvalidExtraction { into: String, reason: &'static str },

    #[error("failed to load fixture `{}`: {source}", path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fixture `{}` is not valid UTF-8 and cannot be used as a template", .0.display())]
    FixtureNotUtf8(PathBuf),
}
