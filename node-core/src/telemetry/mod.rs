//! Structured event history shared by the firmware and the emulator.
//!
//! The core never logs directly. Lifecycle steps, finished cycles, probe
//! results, alarm programming and wake-ups are written into a fixed-size
//! ring; the binaries drain it into their own log sinks.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::calendar::{CalendarError, TimeOfDay};
use crate::lifecycle::{ConnectionState, CycleOutcome, CycleReport};

/// Sequential identifier assigned to each record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic instant used to timestamp records.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Milliseconds from the node's tick counter.
///
/// The counter wraps after about 49 days and stops while the node sleeps,
/// so durations are only meaningful within one wake period.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Millis(pub u32);

impl TelemetryInstant for Millis {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(u64::from(self.0.wrapping_sub(earlier.0)))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    StateStep(ConnectionState),
    CycleComplete(CycleOutcome),
    ProbeFinished,
    AlarmArmed,
    AlarmFailed,
    Wake,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::StateStep(state) => write!(f, "step {state}"),
            TelemetryEventKind::CycleComplete(outcome) => write!(f, "cycle {outcome}"),
            TelemetryEventKind::ProbeFinished => f.write_str("probe finished"),
            TelemetryEventKind::AlarmArmed => f.write_str("alarm armed"),
            TelemetryEventKind::AlarmFailed => f.write_str("alarm failed"),
            TelemetryEventKind::Wake => f.write_str("wake"),
        }
    }
}

/// Extra detail carried by a record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryPayload {
    None,
    Step(StepTelemetry),
    Cycle(CycleTelemetry),
    Probe(ProbeTelemetry),
    Alarm(TimeOfDay),
    AlarmError(CalendarError),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StepTelemetry {
    pub succeeded: bool,
    /// Retries consumed when the step finished.
    pub retries: u8,
    pub elapsed_since_previous: Option<Duration>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleTelemetry {
    pub transitions: u8,
    pub retries: u8,
    pub final_state: ConnectionState,
    pub duration: Duration,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProbeTelemetry {
    pub passed: u8,
    pub failed: u8,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant = Millis, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_step_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_step_at: None,
            next_event_id: 0,
        }
    }

    /// Records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Id the next record will receive; records from `since` onward are new.
    #[must_use]
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records one executed lifecycle step and the time since the previous one.
    pub fn record_step(
        &mut self,
        state: ConnectionState,
        succeeded: bool,
        retries: u32,
        timestamp: TInstant,
    ) -> EventId {
        let elapsed = self
            .last_step_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_step_at = Some(timestamp);

        self.record(
            TelemetryEventKind::StateStep(state),
            TelemetryPayload::Step(StepTelemetry {
                succeeded,
                retries: saturate(retries),
                elapsed_since_previous: elapsed,
            }),
            timestamp,
        )
    }

    /// Records the end of a lifecycle pass.
    pub fn record_cycle(
        &mut self,
        report: &CycleReport,
        started_at: TInstant,
        timestamp: TInstant,
    ) -> EventId {
        self.last_step_at = None;
        self.record(
            TelemetryEventKind::CycleComplete(report.outcome),
            TelemetryPayload::Cycle(CycleTelemetry {
                transitions: saturate(report.transitions),
                retries: saturate(report.retries),
                final_state: report.final_state,
                duration: timestamp.saturating_duration_since(started_at),
            }),
            timestamp,
        )
    }

    pub fn record_probe(&mut self, passed: u32, failed: u32, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::ProbeFinished,
            TelemetryPayload::Probe(ProbeTelemetry {
                passed: saturate(passed),
                failed: saturate(failed),
            }),
            timestamp,
        )
    }

    /// Records the outcome of arming the wake alarm.
    pub fn record_alarm(
        &mut self,
        outcome: Result<TimeOfDay, CalendarError>,
        timestamp: TInstant,
    ) -> EventId {
        match outcome {
            Ok(alarm) => self.record(
                TelemetryEventKind::AlarmArmed,
                TelemetryPayload::Alarm(alarm),
                timestamp,
            ),
            Err(error) => self.record(
                TelemetryEventKind::AlarmFailed,
                TelemetryPayload::AlarmError(error),
                timestamp,
            ),
        }
    }

    pub fn record_wake(&mut self, timestamp: TInstant) -> EventId {
        self.record(TelemetryEventKind::Wake, TelemetryPayload::None, timestamp)
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

fn saturate(count: u32) -> u8 {
    u8::try_from(count).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_elapsed_between_steps() {
        let mut recorder = TelemetryRecorder::<Millis>::new();

        let first = recorder.record_step(ConnectionState::ModemInit, true, 0, Millis(100));
        assert_eq!(first, 0);
        let second = recorder.record_step(ConnectionState::ReadTime, false, 0, Millis(350));
        assert_eq!(second, 1);

        let latest = recorder.latest().copied().expect("record");
        assert_eq!(
            latest.event,
            TelemetryEventKind::StateStep(ConnectionState::ReadTime)
        );
        match latest.details {
            TelemetryPayload::Step(step) => {
                assert!(!step.succeeded);
                assert_eq!(step.elapsed_since_previous, Some(Duration::from_millis(250)));
            }
            other => panic!("expected step payload, got {other:?}"),
        }
    }

    #[test]
    fn millis_survive_counter_wrap() {
        let before = Millis(u32::MAX - 4);
        let after = Millis(5);
        assert_eq!(
            after.saturating_duration_since(before),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn ring_keeps_latest_records() {
        let mut recorder = TelemetryRecorder::<Millis, 4>::new();
        for tick in 0..6 {
            recorder.record_wake(Millis(tick));
        }

        assert_eq!(recorder.len(), 4);
        assert_eq!(recorder.next_id(), 6);
        let ids: heapless::Vec<EventId, 4> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);
    }

    #[test]
    fn alarm_failure_is_recorded_with_reason() {
        let mut recorder = TelemetryRecorder::<Millis>::new();
        recorder.record_alarm(Err(CalendarError::AlarmNotWritable), Millis(0));

        let latest = recorder.latest().copied().expect("record");
        assert_eq!(latest.event, TelemetryEventKind::AlarmFailed);
        assert_eq!(
            latest.details,
            TelemetryPayload::AlarmError(CalendarError::AlarmNotWritable)
        );
    }
}
