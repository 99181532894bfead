//! Correlated request/response over the message bus.
//!
//! [`RequestGateway::request`] publishes a request stamped with a fresh
//! [`CorrelationId`] and suspends only the calling task until the matching
//! response arrives or the timeout elapses. One dispatcher task per response
//! subject routes incoming responses to their waiting callers; responses
//! nobody here is waiting for are nacked so they stay available to their
//! real recipient.

pub mod lookups;
pub mod pending;
pub mod responder;

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle, time::timeout};
use tracing::{debug, warn};

use crate::bus::{
    BusError, CORRELATION_ID_KEY, Message, MessageBus, Subscription, subjects,
};

pub use self::pending::{Completion, CorrelationId, PendingCorrelations};

/// Result alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures of a correlated request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No matching response arrived in time.
    #[error("no response on `{subject}` within {timeout:?}")]
    Timeout { subject: String, timeout: Duration },
    /// The request could not be published or the response subject subscribed.
    #[error(transparent)]
    Transport(#[from] BusError),
    /// The matching response did not have the expected shape.
    #[error("malformed response on `{subject}`")]
    Decode {
        subject: String,
        #[source]
        source: serde_json::Error,
    },
    /// The gateway shut down while the request was outstanding.
    #[error("gateway closed before `{subject}` was answered")]
    Closed { subject: String },
}

/// A request subject paired with the subject its responses come back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Subject requests are published to.
    pub request: &'static str,
    /// Subject responses are received from.
    pub response: &'static str,
}

/// Ranking tag lookups owned by the leaderboard context.
pub const TAG_NUMBER_ROUTE: Route = Route {
    request: subjects::TAG_NUMBER_REQUEST,
    response: subjects::TAG_NUMBER_RESPONSE,
};

/// Permission role lookups owned by the user context.
pub const ROLE_LOOKUP_ROUTE: Route = Route {
    request: subjects::ROLE_LOOKUP_REQUEST,
    response: subjects::ROLE_LOOKUP_RESPONSE,
};

/// Cloneable handle issuing correlated requests.
#[derive(Clone)]
pub struct RequestGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    bus: Arc<dyn MessageBus>,
    pending: Arc<PendingCorrelations>,
    dispatchers: Mutex<HashMap<&'static str, JoinHandle<()>>>,
    default_timeout: Duration,
}

impl Drop for GatewayInner {
    fn drop(&mut self) {
        for handle in self.dispatchers.get_mut().values() {
            handle.abort();
        }
    }
}

impl RequestGateway {
    /// Create a gateway over `bus` answering with `default_timeout` when none is given.
    pub fn new(bus: Arc<dyn MessageBus>, default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                bus,
                pending: Arc::new(PendingCorrelations::new()),
                dispatchers: Mutex::new(HashMap::new()),
                default_timeout,
            }),
        }
    }

    /// Registry of in-flight requests.
    pub fn pending(&self) -> Arc<PendingCorrelations> {
        self.inner.pending.clone()
    }

    /// Timeout applied by [`RequestGateway::request`].
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Issue a request on `route` and wait for its correlated response.
    pub async fn request<Req, Resp>(
        &self,
        route: Route,
        payload: &Req,
        context: impl Into<String>,
    ) -> GatewayResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.request_with_timeout(route, payload, context, self.inner.default_timeout)
            .await
    }

    /// Same as [`RequestGateway::request`] with an explicit timeout.
    pub async fn request_with_timeout<Req, Resp>(
        &self,
        route: Route,
        payload: &Req,
        context: impl Into<String>,
        limit: Duration,
    ) -> GatewayResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        // The response subscription must exist before the request goes out.
        self.ensure_dispatcher(route.response).await?;

        let id = CorrelationId::new();
        let message =
            Message::json(route.request, payload)?.with_metadata(CORRELATION_ID_KEY, id.to_string());
        let mut receiver = self.inner.pending.register(id, context, limit);

        if let Err(err) = self.inner.bus.publish(message).await {
            self.inner.pending.cancel(&id);
            return Err(err.into());
        }

        match timeout(limit, &mut receiver).await {
            Ok(Ok(response)) => {
                serde_json::from_value(response.payload).map_err(|source| GatewayError::Decode {
                    subject: route.response.to_string(),
                    source,
                })
            }
            Ok(Err(_)) => Err(GatewayError::Closed {
                subject: route.response.to_string(),
            }),
            Err(_) => {
                self.inner.pending.cancel(&id);
                debug!(correlation_id = %id, subject = route.request, "correlated request timed out");
                Err(GatewayError::Timeout {
                    subject: route.response.to_string(),
                    timeout: limit,
                })
            }
        }
    }

    async fn ensure_dispatcher(&self, subject: &'static str) -> GatewayResult<()> {
        let mut dispatchers = self.inner.dispatchers.lock().await;
        if dispatchers
            .get(subject)
            .is_some_and(|handle| !handle.is_finished())
        {
            return Ok(());
        }

        let subscription = self.inner.bus.subscribe(subject).await?;
        let handle = tokio::spawn(dispatch(subscription, self.inner.pending.clone()));
        dispatchers.insert(subject, handle);
        Ok(())
    }
}

async fn dispatch(mut subscription: Subscription, pending: Arc<PendingCorrelations>) {
    while let Some(delivery) = subscription.recv().await {
        let Some(id) = delivery
            .message()
            .correlation_id()
            .and_then(|raw| raw.parse::<CorrelationId>().ok())
        else {
            warn!(
                subject = subscription.subject(),
                message_id = %delivery.message().id,
                "response without a usable correlation id; discarding"
            );
            delivery.ack();
            continue;
        };

        match pending.complete(&id, delivery.message().clone()) {
            Completion::Delivered | Completion::Abandoned => delivery.ack(),
            Completion::Unknown => {
                debug!(
                    correlation_id = %id,
                    subject = subscription.subject(),
                    attempt = delivery.attempt(),
                    "response for another caller; rejecting"
                );
                delivery.nack();
            }
        }
    }
    debug!(subject = subscription.subject(), "response dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::{InMemoryBus, RedeliveryPolicy};
    use serde_json::{Value, json};
    use std::sync::atomic::Ordering;

    const ROUTE: Route = Route {
        request: "test.request",
        response: "test.response",
    };

    fn gateway(bus: &InMemoryBus, limit: Duration) -> RequestGateway {
        RequestGateway::new(Arc::new(bus.clone()), limit)
    }

    /// Answers every request on `ROUTE` with `answer`, after `delay`.
    async fn echo_responder(bus: InMemoryBus, delay: Duration, answer: Value) {
        let mut requests = bus.subscribe(ROUTE.request).await.unwrap();
        tokio::spawn(async move {
            while let Some(delivery) = requests.recv().await {
                let id = delivery.message().correlation_id().unwrap().to_string();
                delivery.ack();
                let bus = bus.clone();
                let answer = answer.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let response = Message::json(ROUTE.response, &answer)
                        .unwrap()
                        .with_metadata(CORRELATION_ID_KEY, id);
                    let _ = bus.publish(response).await;
                });
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn matching_response_is_returned() {
        let bus = InMemoryBus::new();
        echo_responder(bus.clone(), Duration::from_millis(50), json!({ "value": 7 })).await;
        let gateway = gateway(&bus, Duration::from_secs(3));

        let response: Value = gateway
            .request(ROUTE, &json!({ "user_id": "p1" }), "test")
            .await
            .unwrap();

        assert_eq!(response, json!({ "value": 7 }));
        assert!(gateway.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_and_releases_its_entry() {
        let bus = InMemoryBus::new();
        let gateway = gateway(&bus, Duration::from_millis(200));

        let err = gateway
            .request::<_, Value>(ROUTE, &json!({}), "test")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(gateway.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_does_not_resurrect_a_timed_out_request() {
        let bus = InMemoryBus::with_redelivery(RedeliveryPolicy {
            delay: Duration::from_millis(10),
            max_deliveries: 2,
        });
        echo_responder(bus.clone(), Duration::from_secs(5), json!({ "value": 1 })).await;
        let gateway = gateway(&bus, Duration::from_secs(1));

        let err = gateway
            .request::<_, Value>(ROUTE, &json!({}), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));

        tokio::time::sleep(Duration::from_secs(10)).await;

        let pending = gateway.pending();
        let stats = pending.stats();
        assert_eq!(stats.completed.load(Ordering::Relaxed), 0);
        assert_eq!(stats.cancelled.load(Ordering::Relaxed), 1);
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_correlation_ids_are_never_returned() {
        let bus = InMemoryBus::new();
        let gateway = gateway(&bus, Duration::from_millis(500));

        let foreign = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let stray = Message::json(ROUTE.response, &json!({ "value": "stray" }))
                .unwrap()
                .with_metadata(CORRELATION_ID_KEY, CorrelationId::new().to_string());
            foreign.publish(stray).await.unwrap();
        });

        let result = gateway.request::<_, Value>(ROUTE, &json!({}), "test").await;
        assert!(matches!(result, Err(GatewayError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_each_get_their_own_response() {
        let bus = InMemoryBus::new();
        let mut requests = bus.subscribe(ROUTE.request).await.unwrap();
        let responder = bus.clone();
        tokio::spawn(async move {
            while let Some(delivery) = requests.recv().await {
                let message = delivery.message().clone();
                delivery.ack();
                let response = Message::json(ROUTE.response, &message.payload)
                    .unwrap()
                    .with_metadata(CORRELATION_ID_KEY, message.correlation_id().unwrap());
                responder.publish(response).await.unwrap();
            }
        });
        let gateway = gateway(&bus, Duration::from_secs(3));

        let body_a = json!({ "user_id": "a" });
        let body_b = json!({ "user_id": "b" });
        let (a, b) = tokio::join!(
            gateway.request::<_, Value>(ROUTE, &body_a, "a"),
            gateway.request::<_, Value>(ROUTE, &body_b, "b"),
        );

        assert_eq!(a.unwrap(), json!({ "user_id": "a" }));
        assert_eq!(b.unwrap(), json!({ "user_id": "b" }));
    }

    #[tokio::test]
    async fn closed_bus_surfaces_transport_error() {
        let bus = InMemoryBus::new();
        let gateway = gateway(&bus, Duration::from_secs(1));
        bus.close();

        let err = gateway
            .request::<_, Value>(ROUTE, &json!({}), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(BusError::Closed)));
    }
}
