//! Answering side of a lookup route.
//!
//! The coordinator never answers lookups in production; other contexts do.
//! This responder stands in for them in tests and in the binary's demo
//! directory.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    Route,
    lookups::{LookupRequest, LookupResponse},
};
use crate::{
    bus::{BusResult, CORRELATION_ID_KEY, Message, MessageBus},
    state::round::UserId,
};

/// Identity to value table served by [`serve_lookups`].
pub type Directory<T> = Arc<DashMap<UserId, T>>;

/// Subscribe to `route.request` and answer every request from `directory`.
///
/// The subscription is open when this returns; answers are produced by the
/// returned task until the bus closes.
pub async fn serve_lookups<T>(
    bus: Arc<dyn MessageBus>,
    route: Route,
    directory: Directory<T>,
) -> BusResult<JoinHandle<()>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let mut requests = bus.subscribe(route.request).await?;

    Ok(tokio::spawn(async move {
        while let Some(delivery) = requests.recv().await {
            let message = delivery.message();
            let Some(correlation_id) = message.correlation_id().map(str::to_string) else {
                warn!(subject = route.request, message_id = %message.id, "lookup without correlation id");
                delivery.ack();
                continue;
            };
            let request: LookupRequest = match message.decode() {
                Ok(request) => request,
                Err(err) => {
                    warn!(subject = route.request, error = %err, "undecodable lookup request");
                    delivery.ack();
                    continue;
                }
            };

            let response = match directory.get(&request.user_id) {
                Some(value) => LookupResponse::Found {
                    user_id: request.user_id.clone(),
                    value: value.clone(),
                },
                None => LookupResponse::NotFound {
                    user_id: request.user_id.clone(),
                },
            };

            let outcome = match Message::json(route.response, &response) {
                Ok(reply) => {
                    bus.publish(reply.with_metadata(CORRELATION_ID_KEY, correlation_id))
                        .await
                }
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => {
                    debug!(subject = route.response, user_id = %request.user_id, "lookup answered");
                    delivery.ack();
                }
                Err(err) => {
                    warn!(subject = route.response, error = %err, "failed to answer lookup");
                    delivery.nack();
                }
            }
        }
    }))
}
