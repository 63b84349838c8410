//! Open-model scenario execution engine.
//!
//! A [`ScenarioDefinition`] is an ordered list of request and pause steps. [`run`] starts new
//! virtual users at the rate a [`WorkloadProfile`] prescribes, independent of how long earlier
//! users take, and each user walks the steps in order with its own [`SessionState`].

mod config;
mod error;
mod executor;
mod extract;
mod fanout;
mod fixture;
mod injector;
mod metrics;
mod outcome;
mod resolve;
mod run;
mod runner;
mod scenario;
mod session;
mod template;
mod transport;

pub use config::{
    DEFAULT_REQUEST_TIMEOUT, HttpProtocol, InjectionMode, JitterPolicy, MAX_RUN_DURATION,
    RunOptions, WorkloadProfile,
};
pub use error::{ConfigError, Error, Result};
pub use extract::{ExtractSource, ExtractionFailure, ExtractionRule, ExtractionWarning};
pub use fixture::{FixtureLoader, FsFixtureLoader, load_fixture, load_fixture_template};
pub use injector::ArrivalSchedule;
pub use metrics::{ActiveUser, MetricsAggregator, MetricsSnapshot, StatusClass, StepStats};
pub use outcome::{
    AbortReason, OutcomeClass, OutcomeEvent, OutcomeReceiver, OutcomeSender, RequestKind,
    RequestOutcome, UserOutcome, UserStatus, outcome_channel,
};
pub use resolve::{ResolveError, ResolvedRequest, resolve_request};
pub use run::{RunSummary, StopHandle, run};
pub use runner::UserState;
pub use scenario::{BodySource, PauseStep, RequestStep, ScenarioDefinition, Step};
pub use session::SessionState;
pub use template::{HeaderTemplate, Template, UnresolvedReference};
pub use transport::{HttpTransport, TransportError};

pub use stampede_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};
