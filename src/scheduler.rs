//! Delayed delivery of round lifecycle events.
//!
//! Nothing is timed locally: every event is handed to the bus's delayed
//! delivery and the round consumers react when it comes back. Each payload
//! carries the start instant it was computed from so that events made stale
//! by a reschedule can be recognised and dropped.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    bus::{BusResult, Message, MessageBus, subjects},
    state::round::RoundId,
};

/// Schedules messages for delivery at a future instant.
pub trait Scheduler: Send + Sync {
    /// Hand `payload` to the transport for delivery on `subject` at or after `at`.
    ///
    /// Returns as soon as the transport accepted it.
    fn schedule_at(
        &self,
        at: OffsetDateTime,
        subject: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'static, BusResult<()>>;
}

/// [`Scheduler`] backed by [`MessageBus::publish_at`].
#[derive(Clone)]
pub struct BusScheduler {
    bus: Arc<dyn MessageBus>,
}

impl BusScheduler {
    /// Wrap a bus.
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

impl Scheduler for BusScheduler {
    fn schedule_at(
        &self,
        at: OffsetDateTime,
        subject: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'static, BusResult<()>> {
        let bus = self.bus.clone();
        let message = Message::json(subject, &payload);
        Box::pin(async move { bus.publish_at(at, message?).await })
    }
}

/// What a scheduled round event does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledKind {
    /// First reminder, one hour before the start by default.
    OneHourReminder,
    /// Second reminder, thirty minutes before the start by default.
    ThirtyMinuteReminder,
    /// Start the round.
    Start,
}

impl ScheduledKind {
    /// Outbound subject announcing a reminder, `None` for the start.
    pub fn reminder_subject(self) -> Option<&'static str> {
        match self {
            Self::OneHourReminder => Some(subjects::ROUND_REMINDER_ONE_HOUR),
            Self::ThirtyMinuteReminder => Some(subjects::ROUND_REMINDER_THIRTY_MINUTES),
            Self::Start => None,
        }
    }
}

/// Payload of a delayed round event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRoundEvent {
    /// Round the event belongs to.
    pub round_id: RoundId,
    /// What to do when it fires.
    pub kind: ScheduledKind,
    /// Start instant the event was computed from.
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
}

impl ScheduledRoundEvent {
    /// Internal subject the event is delivered on.
    pub fn subject(&self) -> &'static str {
        match self.kind {
            ScheduledKind::OneHourReminder | ScheduledKind::ThirtyMinuteReminder => {
                subjects::SCHEDULED_REMINDER
            }
            ScheduledKind::Start => subjects::SCHEDULED_START,
        }
    }

    /// Whether the event was computed for a start instant the round no longer has.
    pub fn is_stale(&self, current_start: OffsetDateTime) -> bool {
        self.start_time != current_start
    }
}

/// A (subject, payload, instant) triple ready to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// Delivery instant.
    pub at: OffsetDateTime,
    /// Payload.
    pub event: ScheduledRoundEvent,
}

/// Offsets of the two reminders before the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderOffsets {
    /// Lead time of the first reminder.
    pub one_hour: Duration,
    /// Lead time of the second reminder.
    pub thirty_minutes: Duration,
}

impl Default for ReminderOffsets {
    fn default() -> Self {
        Self {
            one_hour: Duration::hours(1),
            thirty_minutes: Duration::minutes(30),
        }
    }
}

/// The three events of a round starting at `start_time`, in firing order.
pub fn round_schedule(
    round_id: RoundId,
    start_time: OffsetDateTime,
    offsets: ReminderOffsets,
) -> [ScheduledEvent; 3] {
    let event = |kind| ScheduledRoundEvent {
        round_id,
        kind,
        start_time,
    };

    [
        ScheduledEvent {
            at: start_time - offsets.one_hour,
            event: event(ScheduledKind::OneHourReminder),
        },
        ScheduledEvent {
            at: start_time - offsets.thirty_minutes,
            event: event(ScheduledKind::ThirtyMinuteReminder),
        },
        ScheduledEvent {
            at: start_time,
            event: event(ScheduledKind::Start),
        },
    ]
}

/// Schedule the three events of a round. Stops at the first transport failure.
pub async fn schedule_round(
    scheduler: &dyn Scheduler,
    round_id: RoundId,
    start_time: OffsetDateTime,
    offsets: ReminderOffsets,
) -> BusResult<()> {
    for scheduled in round_schedule(round_id, start_time, offsets) {
        let subject = scheduled.event.subject();
        let payload = serde_json::to_value(scheduled.event).map_err(|source| {
            crate::bus::BusError::Encode {
                subject: subject.to_string(),
                source,
            }
        })?;
        scheduler.schedule_at(scheduled.at, subject, payload).await?;
        debug!(round_id = %round_id, subject, at = %scheduled.at, "scheduled round event");
    }
    Ok(())
}
