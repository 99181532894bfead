//! Registry of in-flight correlated requests.
//!
//! Each outstanding request owns exactly one entry, keyed by a fresh
//! [`CorrelationId`]. The entry is destroyed by the first matching response
//! ([`PendingCorrelations::complete`]), by the caller giving up
//! ([`PendingCorrelations::cancel`]) or by the sweeper once its deadline passed.

use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{sync::oneshot, task::JoinHandle, time::Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::Message;

/// Unique token echoed by a response to match it with its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

struct PendingCorrelation {
    sender: oneshot::Sender<Message>,
    context: String,
    created_at: Instant,
    deadline: Instant,
}

/// What happened to a response handed to [`PendingCorrelations::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The waiting caller received the response.
    Delivered,
    /// The entry existed but its caller already went away.
    Abandoned,
    /// No entry for this identifier: someone else's response, or a late one.
    Unknown,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Requests registered.
    pub registered: AtomicU64,
    /// Requests answered in time.
    pub completed: AtomicU64,
    /// Requests given up by their caller.
    pub cancelled: AtomicU64,
    /// Entries removed by the sweeper after their deadline.
    pub expired: AtomicU64,
}

/// Correlation identifier to waiting task map.
#[derive(Default)]
pub struct PendingCorrelations {
    entries: DashMap<CorrelationId, PendingCorrelation>,
    stats: PendingStats,
}

impl PendingCorrelations {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and obtain the receiver its response will be sent to.
    pub fn register(
        &self,
        id: CorrelationId,
        context: impl Into<String>,
        timeout: Duration,
    ) -> oneshot::Receiver<Message> {
        let (sender, receiver) = oneshot::channel();
        let now = Instant::now();
        let context = context.into();

        debug!(correlation_id = %id, context = %context, "registered pending correlation");
        self.entries.insert(
            id,
            PendingCorrelation {
                sender,
                context,
                created_at: now,
                deadline: now + timeout,
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);

        receiver
    }

    /// Resolve the entry for `id` with `message`, removing it.
    pub fn complete(&self, id: &CorrelationId, message: Message) -> Completion {
        let Some((_, pending)) = self.entries.remove(id) else {
            return Completion::Unknown;
        };

        let elapsed = pending.created_at.elapsed();
        match pending.sender.send(message) {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    context = %pending.context,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "correlated response delivered"
                );
                Completion::Delivered
            }
            Err(_) => {
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, context = %pending.context, "caller went away before response");
                Completion::Abandoned
            }
        }
    }

    /// Discard the entry for `id`. Returns `false` if it was already gone.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every entry whose deadline has passed. Returns how many were removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|id, pending| {
            if now < pending.deadline {
                return true;
            }
            warn!(
                correlation_id = %id,
                context = %pending.context,
                waited_ms = now.duration_since(pending.created_at).as_millis() as u64,
                "removing expired pending correlation"
            );
            removed += 1;
            false
        });

        self.stats
            .expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Whether `id` is still waiting for a response.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Periodically purge expired entries left behind by callers that vanished.
pub fn spawn_sweeper(pending: Arc<PendingCorrelations>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = pending.remove_expired();
            if removed > 0 {
                debug!(removed, "pending correlation sweep");
            }
        }
    })
}
