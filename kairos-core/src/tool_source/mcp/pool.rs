//! MCP connection pool: ref-counted, keyed by server name, with idle
//! reaping and background health-checking (spec §4.2, §5, §8 property 7).
//!
//! Has no direct teacher equivalent (the teacher's `McpToolSource` is built
//! once per server and held for the process lifetime); shaped after the
//! general "keyed pool of reusable async resources with a background
//! reaper" pattern in the retrieval pack's MCP pool sketch
//! (`other_examples` kaijutsu `mcp_pool.rs`), extended here with the
//! reference-counting and idle-timeout behavior spec §4.2 requires (the
//! sketch pools connections but does not refcount checkouts).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AgentError, ErrorKind, Result};

use super::McpToolSource;

/// How a pooled server is reached.
#[derive(Clone, Debug)]
pub enum McpServerSpec {
    Stdio {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
    Http {
        url: String,
        headers: Vec<(String, String)>,
    },
}

#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub max_per_server: usize,
    pub idle_timeout: Duration,
    pub health_check_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_server: 10,
            idle_timeout: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(60),
        }
    }
}

struct Entry {
    source: Arc<McpToolSource>,
    ref_count: usize,
    last_released: Instant,
}

struct Inner {
    config: PoolConfig,
    specs: HashMap<String, McpServerSpec>,
    entries: Mutex<HashMap<String, Vec<Entry>>>,
    closed: AtomicBool,
}

/// A reference-counted handle to a pooled `McpToolSource`. Dropping it does
/// not close the underlying session; call `Pool::release` explicitly (spec
/// §4.2: sessions are reused across calls, not torn down per-call).
pub struct Lease {
    pub server: String,
    pub source: Arc<McpToolSource>,
}

/// Owns zero or more live `McpToolSource` connections per named MCP server,
/// handing out ref-counted leases and reaping connections idle past
/// `idle_timeout`. `spawn_background_tasks` starts the health-checker and
/// idle-reaper; both exit when `shutdown` is called, and `shutdown` waits
/// for them (spec §4.7 "graceful shutdown drains background tasks").
pub struct Pool {
    inner: Arc<Inner>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    health_checker: Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
    pub fn new(specs: HashMap<String, McpServerSpec>, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                specs,
                entries: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
            reaper: Mutex::new(None),
            health_checker: Mutex::new(None),
        }
    }

    /// Starts the idle-reaper and health-checker background tasks. Safe to
    /// call once per `Pool`; a second call is a no-op.
    pub async fn spawn_background_tasks(&self) {
        let mut reaper_guard = self.reaper.lock().await;
        if reaper_guard.is_none() {
            let inner = Arc::clone(&self.inner);
            *reaper_guard = Some(tokio::spawn(reap_idle_loop(inner)));
        }
        let mut health_guard = self.health_checker.lock().await;
        if health_guard.is_none() {
            let inner = Arc::clone(&self.inner);
            *health_guard = Some(tokio::spawn(health_check_loop(inner)));
        }
    }

    /// Checks out a connection for `server`, creating a new one (up to
    /// `max_per_server`) if every existing connection is already leased.
    pub async fn get(&self, server: &str) -> Result<Lease> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(AgentError::new(ErrorKind::PoolClosed, "mcp pool is closed"));
        }
        let spec = self
            .inner
            .specs
            .get(server)
            .cloned()
            .ok_or_else(|| AgentError::not_found(format!("no mcp server named '{server}'")))?;

        let mut entries = self.inner.entries.lock().await;
        let bucket = entries.entry(server.to_string()).or_default();

        if let Some(entry) = bucket.iter_mut().find(|e| e.ref_count == 0) {
            entry.ref_count += 1;
            debug!(server, "reused idle mcp connection from pool");
            return Ok(Lease {
                server: server.to_string(),
                source: Arc::clone(&entry.source),
            });
        }

        if bucket.len() >= self.inner.config.max_per_server {
            return Err(AgentError::new(
                ErrorKind::PoolClosed,
                format!("mcp pool exhausted for server '{server}'"),
            ));
        }

        let source = Arc::new(connect(&spec).await?);
        bucket.push(Entry {
            source: Arc::clone(&source),
            ref_count: 1,
            last_released: Instant::now(),
        });
        info!(server, pool_size = bucket.len(), "opened new mcp connection");
        Ok(Lease {
            server: server.to_string(),
            source,
        })
    }

    /// Returns a lease to the pool. The underlying connection stays open,
    /// available for immediate reuse, until it idles past `idle_timeout`.
    pub async fn release(&self, lease: Lease) {
        let mut entries = self.inner.entries.lock().await;
        if let Some(bucket) = entries.get_mut(&lease.server) {
            if let Some(entry) = bucket
                .iter_mut()
                .find(|e| Arc::ptr_eq(&e.source, &lease.source))
            {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.last_released = Instant::now();
            }
        }
    }

    /// Returns the number of currently-open connections for `server` (leased
    /// or idle), for tests and diagnostics.
    pub async fn connection_count(&self, server: &str) -> usize {
        self.inner
            .entries
            .lock()
            .await
            .get(server)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// One-shot close (spec §5 "`close` is one-shot (CAS); subsequent ops
    /// return `pool_closed`", §8 property 7 "`close` is idempotent (second
    /// call returns `pool_closed`)"). The first call marks the pool closed
    /// and returns `Ok`; every later call observes the already-closed flag
    /// and returns the typed error instead of re-running teardown.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(AgentError::new(ErrorKind::PoolClosed, "mcp pool already closed"));
        }
        if let Some(handle) = self.reaper.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = self.health_checker.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        Ok(())
    }

    /// Alias for `close`, kept for callers that think in terms of graceful
    /// runtime shutdown (spec §4.7) rather than the pool's CAS contract;
    /// closing twice is harmless here too, the second call's error is just
    /// discarded.
    pub async fn shutdown(&self) {
        let _ = self.close().await;
    }
}

async fn connect(spec: &McpServerSpec) -> Result<McpToolSource> {
    match spec {
        McpServerSpec::Stdio { command, args, env } => {
            McpToolSource::new_with_env(command.clone(), args.clone(), env.clone(), false).await
        }
        McpServerSpec::Http { url, headers } => {
            McpToolSource::new_http(url.clone(), headers.clone()).await
        }
    }
}

/// Decides which entries in one server's bucket survive a reap pass, given
/// each entry's `(ref_count, time since last release)`. An entry survives if
/// it's leased (`ref_count > 0`) or still within `idle_timeout` — except
/// that if every entry in the bucket would otherwise be reaped, the single
/// most-recently-released one is kept anyway, so a server is never left with
/// zero warm connections (spec §4.2 "always keep ≥1 warm per server").
fn reap_keep_mask(entries: &[(usize, Duration)], idle_timeout: Duration) -> Vec<bool> {
    let mut keep: Vec<bool> = entries.iter().map(|&(ref_count, elapsed)| ref_count > 0 || elapsed < idle_timeout).collect();
    if !entries.is_empty() && !keep.iter().any(|&k| k) {
        let freshest = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, &(_, elapsed))| elapsed)
            .map(|(idx, _)| idx)
            .expect("entries is non-empty");
        keep[freshest] = true;
    }
    keep
}

async fn reap_idle_loop(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.config.idle_timeout.min(Duration::from_secs(30)));
    loop {
        ticker.tick().await;
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut entries = inner.entries.lock().await;
        for (server, bucket) in entries.iter_mut() {
            let before = bucket.len();
            let ages: Vec<(usize, Duration)> = bucket.iter().map(|e| (e.ref_count, e.last_released.elapsed())).collect();
            let keep = reap_keep_mask(&ages, inner.config.idle_timeout);
            let mut idx = 0usize;
            bucket.retain(|_| {
                let survive = keep[idx];
                idx += 1;
                survive
            });
            if bucket.len() != before {
                debug!(server, reaped = before - bucket.len(), "reaped idle mcp connections");
            }
        }
    }
}

async fn health_check_loop(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.config.health_check_interval);
    loop {
        ticker.tick().await;
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let entries = inner.entries.lock().await;
        for (server, bucket) in entries.iter() {
            for entry in bucket {
                if entry.ref_count == 0 {
                    if let Err(err) = entry.source.list_tools().await {
                        warn!(server, error = %err, "mcp health check failed for idle connection");
                    }
                }
            }
        }
    }
}
