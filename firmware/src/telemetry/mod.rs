//! Forwards the core's telemetry ring to the debug log.
//!
//! The control loop drains the recorder after each boot and wake period;
//! records are rendered once into a fixed buffer so the same text reaches
//! `defmt` on the target and stdout on the host.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write;

use heapless::String;
use node_core::telemetry::{EventId, Millis, TelemetryPayload, TelemetryRecord, TelemetryRecorder};

/// Longest rendered record; longer lines are cut short.
pub const LINE_CAPACITY: usize = 128;

pub type LogLine = String<LINE_CAPACITY>;

/// Logs every record from `from` onwards and returns the id to resume at.
pub fn drain(recorder: &TelemetryRecorder<Millis>, from: EventId) -> EventId {
    for record in recorder.oldest_first().filter(|record| record.id >= from) {
        emit_log(record.timestamp.0, describe(record).as_str());
    }
    recorder.next_id()
}

/// Renders one record as `#id event detail`.
pub fn describe(record: &TelemetryRecord<Millis>) -> LogLine {
    let mut line = LogLine::new();
    // A full buffer truncates the line; nothing else can fail here.
    let _ = write!(line, "#{} {}", record.id, record.event);
    let _ = match record.details {
        TelemetryPayload::None => Ok(()),
        TelemetryPayload::Step(step) => {
            let outcome = if step.succeeded { "ok" } else { "fail" };
            match step.elapsed_since_previous {
                Some(elapsed) => write!(
                    line,
                    " {outcome} retries={} +{}ms",
                    step.retries,
                    elapsed.as_millis()
                ),
                None => write!(line, " {outcome} retries={}", step.retries),
            }
        }
        TelemetryPayload::Cycle(cycle) => write!(
            line,
            " transitions={} retries={} final={} took={}ms",
            cycle.transitions,
            cycle.retries,
            cycle.final_state.label(),
            cycle.duration.as_millis()
        ),
        TelemetryPayload::Probe(probe) => {
            write!(line, " passed={} failed={}", probe.passed, probe.failed)
        }
        TelemetryPayload::Alarm(at) => write!(line, " at {at}"),
        TelemetryPayload::AlarmError(error) => write!(line, " {error}"),
    };
    line
}

#[cfg(target_os = "none")]
fn emit_log(timestamp_ms: u32, line: &str) {
    defmt::info!("telemetry t={}ms {}", timestamp_ms, line);
}

#[cfg(not(target_os = "none"))]
fn emit_log(timestamp_ms: u32, line: &str) {
    println!("telemetry t={timestamp_ms}ms {line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use node_core::calendar::TimeOfDay;
    use node_core::lifecycle::ConnectionState;
    use node_core::telemetry::{StepTelemetry, TelemetryEventKind};

    fn record(event: TelemetryEventKind, details: TelemetryPayload) -> TelemetryRecord<Millis> {
        TelemetryRecord {
            id: 7,
            timestamp: Millis(1_200),
            event,
            details,
        }
    }

    #[test]
    fn step_records_carry_outcome_and_gap() {
        let line = describe(&record(
            TelemetryEventKind::StateStep(ConnectionState::Send),
            TelemetryPayload::Step(StepTelemetry {
                succeeded: false,
                retries: 2,
                elapsed_since_previous: Some(Duration::from_millis(35)),
            }),
        ));
        assert!(line.starts_with("#7 step "));
        assert!(line.ends_with(" fail retries=2 +35ms"));
    }

    #[test]
    fn alarm_records_show_the_match_time() {
        let line = describe(&record(
            TelemetryEventKind::AlarmArmed,
            TelemetryPayload::Alarm(TimeOfDay::new(21, 15, 0)),
        ));
        assert_eq!(line.as_str(), "#7 alarm armed at 21:15:00");
    }

    #[test]
    fn drain_resumes_after_the_last_record() {
        let mut recorder = TelemetryRecorder::<Millis>::new();
        recorder.record_wake(Millis(10));
        let resume = drain(&recorder, 0);
        assert_eq!(resume, recorder.next_id());
        recorder.record_wake(Millis(20));
        assert_eq!(drain(&recorder, resume), resume + 1);
    }
}
