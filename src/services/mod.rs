/// Score completion detection.
pub mod completion;
/// Bus consumers for scheduled events and inbound commands.
pub mod consumers;
/// OpenAPI documentation generation.
pub mod documentation;
/// Downstream publication of finalized rounds.
pub mod finalization;
/// Health check service.
pub mod health_service;
/// Outbound lifecycle notifications.
pub mod lifecycle_events;
/// Round lifecycle orchestration.
pub mod round_service;

#[cfg(test)]
pub(crate) mod test_support;
