//! Live call tracking
//!
//! Bridges are owned by their socket task; the manager only tracks which
//! calls are live so capacity and idle timeouts can be enforced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::ServerError;

struct CallEntry {
    started_at: Instant,
    last_activity: Instant,
}

/// Registry of live calls with capacity and idle-timeout enforcement
pub struct CallManager {
    calls: RwLock<HashMap<String, CallEntry>>,
    max_calls: usize,
    call_timeout: Duration,
}

impl CallManager {
    pub fn new(max_calls: usize, call_timeout: Duration) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            max_calls,
            call_timeout,
        }
    }

    /// Claim a call slot; the returned guard releases it on drop
    pub fn begin_call(self: &Arc<Self>, call_id: &str) -> Result<CallGuard, ServerError> {
        let mut calls = self.calls.write();

        if calls.contains_key(call_id) {
            return Err(ServerError::DuplicateCall(call_id.to_string()));
        }

        if calls.len() >= self.max_calls {
            self.sweep_expired_locked(&mut calls);
            if calls.len() >= self.max_calls {
                metrics::counter!("calls_rejected_total", "reason" => "capacity").increment(1);
                return Err(ServerError::CapacityReached);
            }
        }

        let now = Instant::now();
        calls.insert(
            call_id.to_string(),
            CallEntry {
                started_at: now,
                last_activity: now,
            },
        );
        metrics::gauge!("active_calls").set(calls.len() as f64);

        Ok(CallGuard {
            manager: Arc::clone(self),
            call_id: call_id.to_string(),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.read().len()
    }

    /// Refresh the call's idle clock; false when the sweeper discarded it
    fn touch(&self, call_id: &str) -> bool {
        match self.calls.write().get_mut(call_id) {
            Some(entry) => {
                entry.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    fn end_call(&self, call_id: &str) {
        let mut calls = self.calls.write();
        if let Some(entry) = calls.remove(call_id) {
            metrics::histogram!("call_duration_seconds")
                .record(entry.started_at.elapsed().as_secs_f64());
        }
        metrics::gauge!("active_calls").set(calls.len() as f64);
    }

    /// Discard calls idle past the timeout
    pub fn sweep_expired(&self) -> usize {
        let mut calls = self.calls.write();
        self.sweep_expired_locked(&mut calls)
    }

    fn sweep_expired_locked(&self, calls: &mut HashMap<String, CallEntry>) -> usize {
        let timeout = self.call_timeout;
        let expired: Vec<String> = calls
            .iter()
            .filter(|(_, entry)| entry.last_activity.elapsed() > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            calls.remove(id);
            tracing::info!(call_id = %id, "Discarded idle call");
        }
        if !expired.is_empty() {
            metrics::gauge!("active_calls").set(calls.len() as f64);
        }
        expired.len()
    }

    /// Background sweeper; the returned sender stops it
    pub fn start_sweep_task(self: &Arc<Self>, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = manager.sweep_expired();
                        if removed > 0 {
                            tracing::info!(removed, remaining = manager.count(), "Call sweep");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Call sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

/// Slot held for the lifetime of one socket
pub struct CallGuard {
    manager: Arc<CallManager>,
    call_id: String,
}

impl std::fmt::Debug for CallGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGuard")
            .field("call_id", &self.call_id)
            .finish()
    }
}

impl CallGuard {
    /// Refresh the idle clock; false when the call was swept
    pub fn touch(&self) -> bool {
        self.manager.touch(&self.call_id)
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.manager.end_call(&self.call_id);
    }
}
