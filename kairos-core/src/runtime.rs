//! The Local Runtime (spec §4.7): process-wide lifecycle owning the
//! background approval sweeper and the entry point agents are run through.
//!
//! Grounded in the teacher's `cli_run` module (`run_agent`, `RunOptions`,
//! `DEFAULT_WORKING_FOLDER`): that module is "one CLI invocation drives one
//! agent run"; this generalizes it to "a process-wide lifecycle owning N
//! agents plus a background sweeper," per spec §4.7's wider remit. The
//! sweeper itself talks to `ApprovalExpirer` implementations rather than to
//! `kairos-a2a` directly, for the same dependency-inversion reason
//! `agent::ApprovalSink` does — `kairos-a2a` depends on `kairos-core`, never
//! the reverse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentOutcome};
use crate::error::{AgentError, ErrorKind, Result};

/// Implemented by an approval store (`kairos-a2a`'s `ApprovalStore`) so the
/// Runtime's sweeper can reject approvals past their `expires_at` without
/// this crate depending on the A2A data model.
#[async_trait]
pub trait ApprovalExpirer: Send + Sync {
    /// Rejects every expired pending approval this expirer owns; returns how
    /// many were expired.
    async fn expire_approvals(&self) -> Result<u64>;
}

/// How often, and under what per-sweep timeout, the Approval sweeper runs.
/// `interval` of zero (the default) disables the sweeper entirely, matching
/// spec §4.7 "default 0 = off".
#[derive(Clone, Copy, Debug)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub sweep_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            sweep_timeout: Duration::from_secs(5),
        }
    }
}

impl SweeperConfig {
    pub fn enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

struct SweeperHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Process-wide owner of the approval sweeper and the agents it runs (spec
/// §4.7). `run` refuses before `start`; `stop` waits for the sweeper to
/// exit before returning (graceful shutdown).
pub struct Runtime {
    expirers: Arc<Mutex<Vec<Arc<dyn ApprovalExpirer>>>>,
    sweeper_config: SweeperConfig,
    sweeper: Mutex<Option<SweeperHandle>>,
    started: AtomicBool,
}

impl Runtime {
    pub fn new(sweeper_config: SweeperConfig) -> Self {
        Self {
            expirers: Arc::new(Mutex::new(Vec::new())),
            sweeper_config,
            sweeper: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Registers an `ApprovalExpirer` the sweeper will invoke on every
    /// sweep. Typically called once per `kairos-a2a` `ApprovalStore`. Safe
    /// to call before or after `start` — the sweeper reads the same shared
    /// registration list either way.
    pub async fn register_expirer(&self, expirer: Arc<dyn ApprovalExpirer>) {
        self.expirers.lock().await.push(expirer);
    }

    /// Starts the runtime: spawns the Approval sweeper if its interval is
    /// non-zero. Idempotent — calling `start` twice is a no-op.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.sweeper_config.enabled() {
            info!("approval sweeper disabled (interval=0)");
            return;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let config = self.sweeper_config;
        let shutdown_for_task = shutdown.clone();
        let expirers = self.expirers.clone();

        let join = tokio::spawn(sweep_loop(config, expirers, shutdown_for_task));
        *self.sweeper.lock().await = Some(SweeperHandle { shutdown, join });
        info!(interval_secs = config.interval.as_secs(), "approval sweeper started");
    }

    /// Stops the runtime, waiting for the sweeper task to exit (spec §4.7
    /// "graceful shutdown waits for the sweeper to exit before returning").
    pub async fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.shutdown.store(true, Ordering::SeqCst);
            if let Err(err) = handle.join.await {
                warn!(error = %err, "approval sweeper task panicked during shutdown");
            }
        }
        self.started.store(false, Ordering::SeqCst);
    }

    /// Runs `agent` against `input`, refusing if the Runtime has not been
    /// started. Injects a fresh `run_id` when the caller supplies none.
    #[instrument(skip(self, agent, input))]
    pub async fn run(
        &self,
        agent: &Agent,
        input: &str,
        session_id: Option<&str>,
        run_id: Option<String>,
    ) -> Result<AgentOutcome> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(AgentError::new(
                ErrorKind::InvalidInput,
                "Runtime::run called before Runtime::start",
            ));
        }
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        agent.run_with_id(Some(run_id), input, session_id).await
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(SweeperConfig::default())
    }
}

async fn sweep_loop(config: SweeperConfig, expirers: Arc<Mutex<Vec<Arc<dyn ApprovalExpirer>>>>, shutdown: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(config.interval);
    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        run_one_sweep(&config, &expirers).await;
    }
}

#[instrument(skip(config, expirers), fields(trace_id = %Uuid::new_v4()))]
async fn run_one_sweep(config: &SweeperConfig, expirers: &Arc<Mutex<Vec<Arc<dyn ApprovalExpirer>>>>) {
    let span_id = Uuid::new_v4().to_string();
    let started = tokio::time::Instant::now();
    let snapshot: Vec<Arc<dyn ApprovalExpirer>> = expirers.lock().await.clone();
    let mut total_expired = 0u64;
    for expirer in &snapshot {
        let result = tokio::time::timeout(config.sweep_timeout, expirer.expire_approvals()).await;
        match result {
            Ok(Ok(count)) => total_expired += count,
            Ok(Err(err)) => warn!(span_id = %span_id, error = %err, "approval expirer returned an error"),
            Err(_) => warn!(span_id = %span_id, "approval expirer timed out during sweep"),
        }
    }
    info!(
        span_id = %span_id,
        expired = total_expired,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "approval sweep completed"
    );
}
