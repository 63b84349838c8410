use std::time::Duration;

use crate::error::ConfigError;
use crate::outcome::OutcomeSender;
use crate::run::StopHandle;
use crate::template::{HeaderTemplate, Template};

/// Per-request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest arrival window a profile may ask for (one year).
pub const MAX_RUN_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Settings shared by every request of a run.
#[derive(Debug, Clone, Default)]
pub struct HttpProtocol {
    base_url: Option<String>,
    /// Applied beneath each step's own headers.
    pub default_headers: HeaderTemplate,
}

impl HttpProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        let parsed =
            url::Url::parse(base_url).map_err(|_| ConfigError::InvalidBaseUrl(base_url.into()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUrl(base_url.to_string()));
        }
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        Ok(self)
    }

    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: Template) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}

/// Workload injection mode (the string form used in scenario documents and on the CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::EnumString, strum::Display)]
pub enum InjectionMode {
    /// One arrival every `1/rate` seconds.
    #[default]
    #[strum(to_string = "constant-rate", serialize = "constant")]
    ConstantRate,

    /// The same number of arrivals, jittered according to the profile's [`JitterPolicy`].
    #[strum(to_string = "constant-rate-randomized", serialize = "randomized")]
    ConstantRateRandomized,
}

/// How a randomized profile places arrivals in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::EnumString, strum::Display)]
pub enum JitterPolicy {
    /// Each one-second bucket's arrivals start at independent, uniformly random offsets
    /// within that bucket.
    #[default]
    #[strum(to_string = "uniform")]
    UniformInBucket,

    /// Exponentially distributed gaps between arrivals with mean `1/rate`.
    #[strum(to_string = "poisson")]
    Poisson,
}

/// Open-model arrival profile: `rate_per_second` new users for `duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadProfile {
    pub mode: InjectionMode,
    pub rate_per_second: f64,
    pub duration: Duration,
    pub jitter: JitterPolicy,
    /// Seed for randomized arrivals. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl WorkloadProfile {
    pub fn constant(rate_per_second: f64, duration: Duration) -> Self {
        Self {
            mode: InjectionMode::ConstantRate,
            rate_per_second,
            duration,
            jitter: JitterPolicy::default(),
            seed: None,
        }
    }

    pub fn randomized(rate_per_second: f64, duration: Duration) -> Self {
        Self {
            mode: InjectionMode::ConstantRateRandomized,
            ..Self::constant(rate_per_second, duration)
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate_per_second.is_finite() || self.rate_per_second <= 0.0 {
            return Err(ConfigError::InvalidRate);
        }
        if self.duration.is_zero() || self.duration > MAX_RUN_DURATION {
            return Err(ConfigError::InvalidDuration);
        }
        Ok(())
    }

    /// Arrivals scheduled over the whole run for the non-Poisson schedules.
    pub fn expected_arrivals(&self) -> u64 {
        arrivals_before(self.rate_per_second, self.duration.as_secs_f64())
    }
}

/// Number of arrivals at `rate` strictly before `t` seconds: `floor(rate * t)`.
pub(crate) fn arrivals_before(rate: f64, t: f64) -> u64 {
    // Small epsilon so e.g. 0.1 * 30.0 counts as 3, not 2.999...
    (rate * t + 1e-9).floor().max(0.0) as u64
}

/// Engine settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub protocol: HttpProtocol,
    pub request_timeout: Duration,
    /// Extra attempts after a transport error. Every attempt is reported.
    pub max_transport_retries: u32,
    /// Live outcome stream.
    pub outcomes: Option<OutcomeSender>,
    /// External hard stop, in addition to the profile's duration.
    pub stop: Option<StopHandle>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            protocol: HttpProtocol::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_transport_retries: 0,
            outcomes: None,
            stop: None,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn injection_modes_parse_with_aliases() {
        assert_eq!(
            "constant-rate".parse::<InjectionMode>().unwrap(),
            InjectionMode::ConstantRate
        );
        assert_eq!(
            "randomized".parse::<InjectionMode>().unwrap(),
            InjectionMode::ConstantRateRandomized
        );
        assert_eq!(
            InjectionMode::ConstantRateRandomized.to_string(),
            "constant-rate-randomized"
        );
        assert!("ramping".parse::<InjectionMode>().is_err());
        assert_eq!("poisson".parse::<JitterPolicy>().unwrap(), JitterPolicy::Poisson);
    }

    #[test]
    fn profile_validation_rejects_bad_rates_and_durations() {
        let ok = WorkloadProfile::constant(10.0, Duration::from_secs(60));
        assert!(ok.validate().is_ok());
        assert_eq!(ok.expected_arrivals(), 600);

        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                WorkloadProfile::constant(rate, Duration::from_secs(1)).validate(),
                Err(ConfigError::InvalidRate)
            ));
        }
        let too_long = MAX_RUN_DURATION + Duration::from_secs(1);
        for duration in [Duration::ZERO, too_long, Duration::MAX] {
            assert!(matches!(
                WorkloadProfile::randomized(1.0, duration).validate(),
                Err(ConfigError::InvalidDuration)
            ));
        }
        assert!(WorkloadProfile::constant(1.0, MAX_RUN_DURATION).validate().is_ok());
    }

    #[test]
    fn fractional_rates_count_whole_arrivals() {
        assert_eq!(arrivals_before(0.1, 30.0), 3);
        assert_eq!(arrivals_before(2.5, 1.0), 2);
        assert_eq!(arrivals_before(2.5, 2.0), 5);
    }

    #[test]
    fn base_url_must_be_absolute_http() {
        let p = HttpProtocol::new()
            .with_base_url("http://localhost:3000/")
            .unwrap();
        assert_eq!(p.base_url(), Some("http://localhost:3000"));

        assert!(HttpProtocol::new().with_base_url("/relative").is_err());
        assert!(HttpProtocol::new().with_base_url("ftp://host").is_err());
    }
}
