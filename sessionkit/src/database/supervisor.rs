// sessionkit/src/database/supervisor.rs
//
// Reconnection supervisor: one background task per session.
//
//   PROBING --ok--> HEALTHY --interval--> PROBING
//   PROBING --err-> RECOVERING --new handle--> HEALTHY
//   RECOVERING --attempts exhausted--> STOPPED (fail-stop)
//   any state --cancel--> STOPPED
//
// The first probe runs immediately. Probes and reconnect attempts never
// overlap for one session.
//

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SupervisorSettings;
use crate::database::driver::ClusterDriver;
use crate::database::factory::ConnectionFactory;
use crate::database::options::ClusterOption;
use crate::database::probe::LivenessProber;
use crate::database::session::Session;
use crate::errors::SessionError;
use crate::metrics;

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorState {
    Probing,
    Healthy,
    Recovering { attempt: u32 },
    Stopped(SupervisorExit),
}

/// Why a supervisor stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorExit {
    Cancelled,
    /// Fail-stop: the session keeps its last (dead) handle.
    Exhausted { attempts: u32, last_error: String },
    /// The task panicked or was aborted.
    Aborted(String),
}

impl SupervisorExit {
    pub fn label(&self) -> &'static str {
        match self {
            SupervisorExit::Cancelled => "cancelled",
            SupervisorExit::Exhausted { .. } => "exhausted",
            SupervisorExit::Aborted(_) => "aborted",
        }
    }

    /// The exit as an error, `None` for a requested shutdown.
    pub fn into_error(self) -> Option<SessionError> {
        match self {
            SupervisorExit::Cancelled => None,
            SupervisorExit::Exhausted {
                attempts,
                last_error,
            } => Some(SessionError::ExhaustedRecoveryError {
                attempts,
                last_error,
            }),
            SupervisorExit::Aborted(reason) => Some(SessionError::SupervisorAborted(reason)),
        }
    }
}

pub struct Supervisor<D: ClusterDriver> {
    session: Session<D::Handle>,
    factory: ConnectionFactory<D>,
    prober: LivenessProber,
    settings: SupervisorSettings,
    state: watch::Sender<SupervisorState>,
}

impl<D: ClusterDriver> Supervisor<D> {
    pub fn new(
        session: Session<D::Handle>,
        factory: ConnectionFactory<D>,
        settings: SupervisorSettings,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Probing);
        Self {
            session,
            factory,
            prober: LivenessProber::new(),
            settings,
            state,
        }
    }

    /// Start the supervision loop on the tokio runtime.
    ///
    /// The task stops when `cancel` (or [`SupervisorHandle::cancel`]) fires.
    pub fn spawn(self, cancel: CancellationToken) -> SupervisorHandle {
        let cancel = cancel.child_token();
        let state = self.state.subscribe();
        let span = info_span!("supervisor", hosts = ?self.session.config().hosts);
        let task = tokio::spawn(self.run(cancel.clone()).instrument(span));

        SupervisorHandle {
            state,
            cancel,
            task,
        }
    }

    /// Drive the supervision loop on the current task until it stops.
    pub async fn run(self, cancel: CancellationToken) -> SupervisorExit {
        info!(
            "Supervisor started (probe interval {:?}, {} reconnect attempts)",
            self.settings.probe_interval, self.settings.max_reconnect_attempts
        );

        let mut wait = Duration::ZERO;
        let exit = loop {
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = sleep(wait) => false,
            };
            if cancelled {
                break SupervisorExit::Cancelled;
            }

            self.set_state(SupervisorState::Probing);
            let handle = self.session.unwrap_handle();
            let probe = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.prober.probe(&*handle) => Some(result),
            };
            drop(handle);

            match probe {
                None => break SupervisorExit::Cancelled,
                Some(Ok(())) => debug!("Session healthy"),
                Some(Err(e)) => {
                    warn!(kind = e.kind(), "Liveness probe failed: {}", e);
                    if let Err(exit) = self.recover(&cancel, e).await {
                        break exit;
                    }
                }
            }

            self.set_state(SupervisorState::Healthy);
            wait = self.settings.probe_interval;
        };

        match &exit {
            SupervisorExit::Cancelled => info!("Supervisor cancelled"),
            other => error!("Supervisor stopped: {:?}", other),
        }
        metrics::record_supervisor_exit(exit.label());
        self.set_state(SupervisorState::Stopped(exit.clone()));
        exit
    }

    async fn recover(&self, cancel: &CancellationToken, cause: SessionError) -> Result<(), SupervisorExit> {
        let max_attempts = self.settings.max_reconnect_attempts;
        let mut last_error = cause;

        for attempt in 1..=max_attempts {
            self.set_state(SupervisorState::Recovering { attempt });

            if let (true, Some(backoff)) = (attempt > 1, &self.settings.reconnect_backoff) {
                let delay = backoff.delay_for(attempt - 2);
                let cancelled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = sleep(delay) => false,
                };
                if cancelled {
                    return Err(SupervisorExit::Cancelled);
                }
            }

            let established = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.factory.establish(self.session.config()) => Some(result),
            };

            match established {
                None => return Err(SupervisorExit::Cancelled),
                Some(Ok(handle)) => {
                    metrics::record_reconnect(true);
                    let generation = self.session.replace_handle(handle);
                    info!(
                        "Reconnected on attempt {}/{} (generation {})",
                        attempt, max_attempts, generation
                    );
                    return Ok(());
                }
                Some(Err(e)) => {
                    metrics::record_reconnect(false);
                    warn!("Reconnect attempt {}/{} failed: {}", attempt, max_attempts, e);
                    let retryable = e.is_retryable();
                    last_error = e;
                    // configuration errors are final
                    if !retryable {
                        return Err(SupervisorExit::Exhausted {
                            attempts: attempt,
                            last_error: last_error.to_string(),
                        });
                    }
                }
            }
        }

        Err(SupervisorExit::Exhausted {
            attempts: max_attempts,
            last_error: last_error.to_string(),
        })
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
    }
}

/// Caller-side view of a running supervisor.
pub struct SupervisorHandle {
    state: watch::Receiver<SupervisorState>,
    cancel: CancellationToken,
    task: JoinHandle<SupervisorExit>,
}

impl SupervisorHandle {
    /// Latest published state.
    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state transition, including the final stop.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Stop this supervisor only; the caller's token is left untouched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the supervisor to stop and return why it stopped.
    pub async fn join(self) -> SupervisorExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) if e.is_cancelled() => SupervisorExit::Aborted("task aborted".to_string()),
            Err(e) => SupervisorExit::Aborted(e.to_string()),
        }
    }
}

/// Connect and start supervising the new session in one step.
pub async fn connect_supervised<D: ClusterDriver>(
    factory: ConnectionFactory<D>,
    overrides: &[ClusterOption],
    settings: SupervisorSettings,
    cancel: CancellationToken,
) -> Result<(Session<D::Handle>, SupervisorHandle), SessionError> {
    let session = factory.connect(overrides).await?;
    let handle = Supervisor::new(session.clone(), factory, settings).spawn(cancel);
    Ok((session, handle))
}
