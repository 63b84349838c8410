use std::sync::Arc;
use std::time::SystemTime;

use stampede_http::HttpTransportErrorKind;
use tokio::task::JoinSet;

use crate::extract::{ExtractionRule, SessionUpdates};
use crate::outcome::{AbortReason, OutcomeClass, RequestKind, RequestOutcome};
use crate::resolve::{ResolveError, ResolvedRequest, resolve_request};
use crate::run::RunContext;
use crate::scenario::RequestStep;
use crate::session::SessionState;
use crate::transport::HttpTransport;

struct Dispatched {
    /// Attempts that reached the transport.
    attempts: u64,
    result: Result<SessionUpdates, HttpTransportErrorKind>,
}

/// Send `req`, retrying transport errors up to `max_transport_retries` times.
/// Every attempt is recorded.
async fn dispatch<T: HttpTransport>(
    ctx: &RunContext<T>,
    user_id: u64,
    kind: RequestKind,
    req: &ResolvedRequest,
    rules: &[ExtractionRule],
) -> Dispatched {
    let mut attempt: u32 = 0;
    loop {
        let a = ctx.executor.execute(req, rules).await;
        let failed = match &a.class {
            OutcomeClass::TransportError { kind, .. } => Some(*kind),
            _ => None,
        };

        ctx.record_request(RequestOutcome {
            scenario: ctx.scenario_name.clone(),
            user_id,
            step: req.step.clone(),
            kind,
            attempt,
            class: a.class,
            started_at: a.started_at,
            latency: a.latency,
            timestamp: a.timestamp,
        });
        for warning in a.warnings {
            ctx.record_warning(user_id, warning);
        }

        let attempts = u64::from(attempt) + 1;
        match failed {
            None => {
                return Dispatched {
                    attempts,
                    result: Ok(a.updates),
                };
            }
            Some(error) if attempt >= ctx.max_transport_retries => {
                return Dispatched {
                    attempts,
                    result: Err(error),
                };
            }
            Some(error) => {
                tracing::debug!(user_id, step = %req.step, %error, attempt, "retrying request");
                attempt += 1;
            }
        }
    }
}

fn abort_reason(step: &Arc<str>, err: ResolveError) -> AbortReason {
    match err {
        ResolveError::UnresolvedReference(r) => AbortReason::UnresolvedReference {
            step: step.clone(),
            key: r.key,
        },
        ResolveError::InvalidUrl(url) => AbortReason::InvalidUrl {
            step: step.clone(),
            url,
        },
    }
}

/// Run one request step: the parent first, then all of its resources concurrently.
///
/// The parent's session updates are applied before resources are resolved, so resources may
/// reference values the parent captured. Resource updates are applied once the whole group
/// has finished, in declaration order. `requests` is incremented by the number of attempts
/// that reached the transport.
pub(crate) async fn run_group<T: HttpTransport>(
    ctx: &Arc<RunContext<T>>,
    user_id: u64,
    step: &RequestStep,
    session: &mut SessionState,
    requests: &mut u64,
) -> Result<(), AbortReason> {
    let parent = resolve_request(step, session, &ctx.protocol)
        .map_err(|err| abort_reason(&step.name, err))?;

    let sent = dispatch(ctx, user_id, RequestKind::Primary, &parent, &step.extract).await;
    *requests += sent.attempts;
    match sent.result {
        Ok(updates) => session.apply(updates),
        Err(kind) => {
            return Err(AbortReason::Transport {
                step: step.name.clone(),
                kind,
            });
        }
    }

    if step.resources.is_empty() {
        return Ok(());
    }

    let mut group: JoinSet<(usize, Dispatched)> = JoinSet::new();
    for (idx, resource) in step.resources.iter().enumerate() {
        let req = match resolve_request(resource, session, &ctx.protocol) {
            Ok(req) => req,
            Err(err) => {
                tracing::debug!(user_id, step = %resource.name, error = %err, "resource skipped");
                ctx.record_request(RequestOutcome {
                    scenario: ctx.scenario_name.clone(),
                    user_id,
                    step: resource.name.clone(),
                    kind: RequestKind::Resource,
                    attempt: 0,
                    class: OutcomeClass::Skipped {
                        reason: err.to_string(),
                    },
                    started_at: ctx.elapsed(),
                    latency: std::time::Duration::ZERO,
                    timestamp: SystemTime::now(),
                });
                continue;
            }
        };

        let ctx = ctx.clone();
        let rules = resource.extract.clone();
        group.spawn(async move {
            let sent = dispatch(&ctx, user_id, RequestKind::Resource, &req, &rules).await;
            (idx, sent)
        });
    }

    let mut updates: Vec<Option<SessionUpdates>> = vec![None; step.resources.len()];
    while let Some(joined) = group.join_next().await {
        match joined {
            Ok((idx, sent)) => {
                *requests += sent.attempts;
                if let (Ok(u), Some(slot)) = (sent.result, updates.get_mut(idx)) {
                    *slot = Some(u);
                }
            }
            Err(err) => {
                tracing::error!(user_id, step = %step.name, error = %err, "resource task failed");
            }
        }
    }

    for u in updates.into_iter().flatten() {
        session.apply(u);
    }
    Ok(())
}
