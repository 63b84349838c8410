use std::sync::Arc;
use std::time::{Duration, SystemTime};

use stampede_http::HttpTransportErrorKind;
use tokio::sync::mpsc;

use crate::extract::ExtractionWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RequestKind {
    Primary,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeClass {
    /// Any HTTP status, including 4xx and 5xx.
    Success { status: u16 },
    TransportError {
        kind: HttpTransportErrorKind,
        message: String,
    },
    /// A resource whose request could not be built for this user.
    Skipped { reason: String },
}

impl OutcomeClass {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::TransportError { .. })
    }
}

/// One finished request attempt.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub scenario: Arc<str>,
    pub user_id: u64,
    pub step: Arc<str>,
    pub kind: RequestKind,
    /// 0 for the first attempt; retries count up from there.
    pub attempt: u32,
    pub class: OutcomeClass,
    /// Offset from run start at which the request was dispatched.
    pub started_at: Duration,
    pub latency: Duration,
    pub timestamp: SystemTime,
}

impl RequestOutcome {
    pub fn finished_at(&self) -> Duration {
        self.started_at + self.latency
    }
}

/// Why a virtual user stopped before its last step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    UnresolvedReference { step: Arc<str>, key: String },
    InvalidUrl { step: Arc<str>, url: String },
    Transport {
        step: Arc<str>,
        kind: HttpTransportErrorKind,
    },
}

impl AbortReason {
    /// Stable label used as a metric tag and summary key.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Transport { .. } => "transport_error",
        }
    }

    pub fn step(&self) -> &str {
        match self {
            Self::UnresolvedReference { step, .. }
            | Self::InvalidUrl { step, .. }
            | Self::Transport { step, .. } => step,
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedReference { step, key } => {
                write!(f, "step `{step}`: session key `{key}` is not set")
            }
            Self::InvalidUrl { step, url } => write!(f, "step `{step}`: invalid url `{url}`"),
            Self::Transport { step, kind } => write!(f, "step `{step}`: transport error ({kind})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStatus {
    Completed,
    Aborted(AbortReason),
}

/// Terminal record of one virtual user.
#[derive(Debug, Clone)]
pub struct UserOutcome {
    pub scenario: Arc<str>,
    pub user_id: u64,
    pub status: UserStatus,
    pub started_at: Duration,
    pub finished_at: Duration,
    pub requests: u64,
}

impl UserOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == UserStatus::Completed
    }
}

#[derive(Debug, Clone)]
pub enum OutcomeEvent {
    Request(RequestOutcome),
    User(UserOutcome),
    ExtractionWarning(ExtractionWarning),
}

pub type OutcomeSender = mpsc::UnboundedSender<OutcomeEvent>;
pub type OutcomeReceiver = mpsc::UnboundedReceiver<OutcomeEvent>;

/// Live outcome stream. Pass the sender in `RunOptions::outcomes`.
pub fn outcome_channel() -> (OutcomeSender, OutcomeReceiver) {
    mpsc::unbounded_channel()
}
