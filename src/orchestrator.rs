//! Session orchestration
//!
//! Consumes wake signals and keeps at most one conversation session alive: every wake
//! cancels the current session's token and starts a fresh session under a new child
//! of the root token. Root cancellation stops the loop and gives in-flight sessions
//! a bounded grace period to exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::conversation::{Services, Session, SessionReport, SessionSettings};
use crate::signal::Listener;

/// Default time sessions get to exit after shutdown is requested
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The live session, as seen by the orchestrator
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    token: CancellationToken,
    task: AbortHandle,
}

impl SessionHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether the session task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

/// Top-level wake/session loop
pub struct Orchestrator {
    services: Services,
    settings: Arc<SessionSettings>,
    root: CancellationToken,
    grace: Duration,
    current: Option<SessionHandle>,
    sessions: JoinSet<()>,
    next_id: u64,
    reports: Option<mpsc::UnboundedSender<SessionReport>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(services: Services, settings: SessionSettings, root: CancellationToken) -> Self {
        Self {
            services,
            settings: Arc::new(settings),
            root,
            grace: DEFAULT_SHUTDOWN_GRACE,
            current: None,
            sessions: JoinSet::new(),
            next_id: 0,
            reports: None,
        }
    }

    /// Set how long sessions get to exit at shutdown
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Forward every finished session's report to `reports`
    #[must_use]
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<SessionReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// The most recently started session, if any
    #[must_use]
    pub const fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// Handle wake signals until the root token is cancelled
    pub async fn run(mut self, mut wake: Listener) {
        tracing::info!("orchestrator started");

        loop {
            tokio::select! {
                biased;
                () = self.root.cancelled() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                woke = wake.recv() => {
                    if !woke {
                        tracing::warn!("wake signal source closed");
                        break;
                    }
                    self.start_session();
                }
            }
        }

        self.shutdown().await;
    }

    /// Cancel the current session (if any) and start a new one
    pub fn start_session(&mut self) -> u64 {
        self.reap();

        if let Some(previous) = self.current.take() {
            if !previous.is_finished() {
                tracing::info!(session = previous.id, "preempting active session");
            }
            previous.cancel();
        }

        self.next_id += 1;
        let id = self.next_id;
        let token = self.root.child_token();
        let session = Session::new(
            id,
            self.services.clone(),
            Arc::clone(&self.settings),
            token.clone(),
        );

        let reports = self.reports.clone();
        let task = self.sessions.spawn(async move {
            let report = session.run().await;
            if let Some(reports) = reports {
                let _ = reports.send(report);
            }
        });

        self.current = Some(SessionHandle { id, token, task });
        id
    }

    /// Drop results of sessions that already exited
    fn reap(&mut self) {
        while let Some(joined) = self.sessions.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "session task failed");
            }
        }
    }

    async fn shutdown(mut self) {
        if let Some(current) = self.current.take() {
            current.cancel();
        }

        let pending = self.sessions.len();
        let sessions = &mut self.sessions;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = sessions.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "session task failed");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                grace_ms = self.grace.as_millis(),
                "sessions still running after grace period, aborting"
            );
            self.sessions.abort_all();
        }

        tracing::info!(sessions = pending, "orchestrator stopped");
    }
}
