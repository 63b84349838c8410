use std::sync::Arc;

use crate::fanout::run_group;
use crate::outcome::{AbortReason, UserOutcome, UserStatus};
use crate::run::RunContext;
use crate::scenario::Step;
use crate::session::SessionState;
use crate::transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum UserState {
    Pending,
    Running,
    Completed,
    Aborted,
}

/// One simulated user walking the scenario's steps in order with its own session.
pub(crate) struct VirtualUser<T> {
    id: u64,
    ctx: Arc<RunContext<T>>,
    session: SessionState,
    state: UserState,
}

impl<T: HttpTransport> VirtualUser<T> {
    pub(crate) fn new(id: u64, ctx: Arc<RunContext<T>>) -> Self {
        Self {
            id,
            ctx,
            session: SessionState::new(),
            state: UserState::Pending,
        }
    }

    pub(crate) async fn run(&mut self) -> UserOutcome {
        debug_assert_eq!(self.state, UserState::Pending);
        self.state = UserState::Running;
        let ctx = self.ctx.clone();
        let _active = ctx.metrics.user_started();

        let started_at = self.ctx.elapsed();
        let mut requests = 0;
        let status = match self.run_steps(&mut requests).await {
            Ok(()) => {
                self.state = UserState::Completed;
                UserStatus::Completed
            }
            Err(reason) => {
                tracing::debug!(
                    scenario = %self.ctx.scenario_name,
                    user_id = self.id,
                    reason = reason.label(),
                    "user aborted: {reason}"
                );
                self.state = UserState::Aborted;
                UserStatus::Aborted(reason)
            }
        };

        let outcome = UserOutcome {
            scenario: self.ctx.scenario_name.clone(),
            user_id: self.id,
            status,
            started_at,
            finished_at: self.ctx.elapsed(),
            requests,
        };
        self.ctx.record_user(outcome.clone());
        outcome
    }

    async fn run_steps(&mut self, requests: &mut u64) -> Result<(), AbortReason> {
        let ctx = self.ctx.clone();
        for step in &ctx.scenario.steps {
            match step {
                Step::Request(req) => {
                    run_group(&ctx, self.id, req, &mut self.session, requests).await?;
                }
                Step::Pause(pause) => tokio::time::sleep(pause.duration).await,
            }
        }
        Ok(())
    }
}
