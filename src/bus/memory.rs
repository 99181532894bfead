//! In-process [`MessageBus`] backed by Tokio channels.
//!
//! Every subscription gets its own copy of each message published on its
//! subject. A nacked delivery is offered again to the same subscription after
//! [`RedeliveryPolicy::delay`] until [`RedeliveryPolicy::max_deliveries`] is
//! reached. Delayed messages are held by a spawned task; they do not survive a
//! process restart.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, warn};

use super::{Acknowledge, BusError, BusResult, Delivery, Message, MessageBus, Subscription};

/// How rejected deliveries are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Pause before a nacked message is offered again.
    pub delay: Duration,
    /// Total delivery attempts per subscription before the message is dropped.
    pub max_deliveries: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            max_deliveries: 5,
        }
    }
}

/// Cloneable handle to a shared in-memory bus.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscribers: DashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>,
    closed: AtomicBool,
    redelivery: RedeliveryPolicy,
    published: AtomicU64,
}

impl InMemoryBus {
    /// Create a bus with the default redelivery policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with a custom redelivery policy.
    pub fn with_redelivery(redelivery: RedeliveryPolicy) -> Self {
        Self {
            inner: Arc::new(BusInner {
                redelivery,
                ..BusInner::default()
            }),
        }
    }

    /// Shut the bus down: pending subscriptions end and every later call fails.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subscribers.clear();
    }

    /// Whether [`InMemoryBus::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.inner
            .subscribers
            .get(subject)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Total number of messages fanned out so far (immediate and delayed).
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

impl BusInner {
    fn fan_out(&self, message: Message) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let Some(mut senders) = self.subscribers.get_mut(&message.subject) else {
            debug!(subject = %message.subject, message_id = %message.id, "no subscribers; message dropped");
            return;
        };

        senders.retain(|tx| !tx.is_closed());
        for tx in senders.iter() {
            deliver(tx.clone(), message.clone(), 1, self.redelivery);
        }
    }
}

fn deliver(
    tx: mpsc::UnboundedSender<Delivery>,
    message: Message,
    attempt: u32,
    policy: RedeliveryPolicy,
) {
    let acker = MemoryAcker {
        tx: tx.clone(),
        message: message.clone(),
        attempt,
        policy,
    };
    // A closed receiver means the subscriber went away; nothing to redeliver to.
    let _ = tx.send(Delivery::new(message, attempt, Box::new(acker)));
}

struct MemoryAcker {
    tx: mpsc::UnboundedSender<Delivery>,
    message: Message,
    attempt: u32,
    policy: RedeliveryPolicy,
}

impl Acknowledge for MemoryAcker {
    fn ack(self: Box<Self>) {}

    fn nack(self: Box<Self>) {
        let MemoryAcker {
            tx,
            message,
            attempt,
            policy,
        } = *self;

        if attempt >= policy.max_deliveries {
            warn!(
                subject = %message.subject,
                message_id = %message.id,
                attempt,
                "delivery attempts exhausted; dropping message"
            );
            return;
        }

        tokio::spawn(async move {
            sleep(policy.delay).await;
            deliver(tx, message, attempt + 1, policy);
        });
    }
}

impl MessageBus for InMemoryBus {
    fn publish(&self, message: Message) -> BoxFuture<'static, BusResult<()>> {
        let bus = self.clone();
        Box::pin(async move {
            bus.ensure_open()?;
            bus.inner.fan_out(message);
            Ok(())
        })
    }

    fn publish_at(
        &self,
        deliver_at: OffsetDateTime,
        message: Message,
    ) -> BoxFuture<'static, BusResult<()>> {
        let bus = self.clone();
        Box::pin(async move {
            bus.ensure_open()?;

            // Instants in the past convert to an error and deliver immediately.
            let delay = Duration::try_from(deliver_at - OffsetDateTime::now_utc()).unwrap_or_default();
            debug!(
                subject = %message.subject,
                message_id = %message.id,
                delay_ms = delay.as_millis() as u64,
                "accepted delayed message"
            );

            tokio::spawn(async move {
                sleep(delay).await;
                if bus.is_closed() {
                    warn!(subject = %message.subject, message_id = %message.id, "bus closed before delayed delivery");
                    return;
                }
                bus.inner.fan_out(message);
            });

            Ok(())
        })
    }

    fn subscribe(&self, subject: &str) -> BoxFuture<'static, BusResult<Subscription>> {
        let bus = self.clone();
        let subject = subject.to_string();
        Box::pin(async move {
            bus.ensure_open()?;
            let (tx, rx) = mpsc::unbounded_channel();
            bus.inner
                .subscribers
                .entry(subject.clone())
                .or_default()
                .push(tx);
            debug!(subject = %subject, "subscription opened");
            Ok(Subscription::new(subject, rx))
        })
    }
}
