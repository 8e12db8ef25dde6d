use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use node_core::at::{AtEngine, AtError, ExchangeObserver};
use node_core::calendar::Calendar;
use node_core::config::NodeConfig;
use node_core::diagnostics::run_probe;
use node_core::lifecycle::{CycleContext, CycleReport, NodeOperations, StepFailure, run_cycle};
use node_core::modem::Modem;
use node_core::power::{PowerSequencer, sleep_cycle};
use node_core::status::NodeStatus;
use node_core::telemetry::{EventId, Millis, TelemetryPayload, TelemetryRecord, TelemetryRecorder};

use crate::esp32::{Esp32, Fault};
use crate::hardware::{Host, SimPower, SimRtc, SimTick};

/// Everything chosen on the command line.
#[derive(Clone, Debug)]
pub struct Options {
    pub cycles: u32,
    pub faults: Vec<Fault>,
    pub transcript: Option<PathBuf>,
    pub verbose: bool,
    pub config: NodeConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cycles: 2,
            faults: Vec::new(),
            transcript: None,
            verbose: false,
            config: NodeConfig::defaults(),
        }
    }
}

type SimModem<'h> = Modem<'h, Esp32<'h>, &'h Host, ExchangeLog<'h>>;

/// One emulated node: boot, then repeated wake cycles.
pub struct Session<'h> {
    host: &'h Host,
    modem: SimModem<'h>,
    calendar: Calendar<SimRtc<'h>>,
    sequencer: PowerSequencer<SimPower<'h>, SimTick<'h>>,
    status: NodeStatus,
    telemetry: TelemetryRecorder<Millis>,
    config: NodeConfig,
    verbose: bool,
    transcript: Option<TranscriptLogger>,
    reported_up_to: EventId,
    completed: u32,
}

impl<'h> Session<'h> {
    pub fn new(host: &'h Host, options: Options) -> io::Result<Self> {
        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::new)
            .transpose()?;
        let engine = AtEngine::new(Esp32::new(host, options.faults), host, &host.rx)
            .with_observer(ExchangeLog { host });

        Ok(Self {
            host,
            modem: Modem::new(engine),
            calendar: Calendar::new(SimRtc::new(host)),
            sequencer: PowerSequencer::new(SimPower::new(host), SimTick::new(host)),
            status: NodeStatus::new(),
            telemetry: TelemetryRecorder::new(),
            config: options.config,
            verbose: options.verbose,
            transcript,
            reported_up_to: 0,
            completed: 0,
        })
    }

    /// Power-on: RTC bring-up and the modem self test.
    pub fn boot(&mut self) -> io::Result<Vec<String>> {
        let mut lines = vec!["*** sensor node boot ***".to_string()];

        match self.calendar.init(&self.config.initial_calendar) {
            Ok(report) if report.is_complete() => {
                lines.push(format!("RTC initialised at {}", self.calendar.now()));
            }
            Ok(report) => lines.push(format!(
                "RTC initialised with rejected fields: {:?}",
                report.into_result()
            )),
            Err(error) => lines.push(format!("RTC init failed: {error}")),
        }

        let report = run_probe(&mut self.modem, &mut self.status, &self.config);
        let now = self.now();
        self.telemetry.record_probe(report.passed(), report.failed(), now);
        if report.woke_modem {
            lines.push("modem woken from sleep".to_string());
        }
        lines.extend(report.to_string().lines().map(str::to_string));
        lines.push(format!(
            "self test: {} passed, {} failed",
            report.passed(),
            report.failed()
        ));

        self.finish(lines)
    }

    /// One wake period: lifecycle pass, then sleep until the RTC alarm.
    pub fn run_cycle(&mut self, number: u32) -> io::Result<Vec<String>> {
        let mut lines = vec![format!("=== cycle {number} at {} ===", self.calendar.now())];

        if let Err(error) = self.modem.query_status(&mut self.status) {
            lines.push(format!("status query failed: {error}"));
        }

        let (report, failure, reply) = {
            let mut ops = NodeOperations::new(&mut self.modem, &mut self.calendar);
            let mut ctx = CycleContext {
                status: &mut self.status,
                config: &self.config,
                clock: self.host,
                telemetry: &mut self.telemetry,
            };
            let report = run_cycle(&mut ops, &mut ctx, self.config.max_retries);
            (report, ops.last_failure(), ops.last_reply().map(str::to_string))
        };
        if report.is_completed() {
            self.completed += 1;
        }
        lines.extend(describe_cycle(&report, failure, reply.as_deref()));

        let alarm = sleep_cycle(
            &mut self.sequencer,
            &mut self.calendar,
            &self.host.wake,
            self.config.sleep_interval_secs,
        );
        let now = self.now();
        self.telemetry.record_alarm(alarm, now);
        match alarm {
            Ok(at) => {
                self.telemetry.record_wake(now);
                lines.push(format!("woke at {at}"));
            }
            Err(error) => lines.push(format!("alarm not armed, staying awake: {error}")),
        }

        self.finish(lines)
    }

    /// Cycles that reached `Stop`, and the faults that never fired.
    pub fn summary(&mut self, cycles: u32) -> io::Result<Vec<String>> {
        let mut lines = vec![format!(
            "{} of {cycles} cycles completed, {} modem commands",
            self.completed,
            self.modem.engine_mut().transport_mut().commands()
        )];
        for fault in self.modem.engine_mut().transport_mut().pending_faults() {
            lines.push(format!(
                "fault `{}` did not fire {} time(s)",
                fault.command, fault.remaining
            ));
        }
        self.finish(lines)
    }

    fn now(&self) -> Millis {
        Millis(self.host.ticks())
    }

    /// Appends hardware notes and new telemetry, then writes the transcript.
    fn finish(&mut self, lines: Vec<String>) -> io::Result<Vec<String>> {
        let notes = self.host.take_notes();
        let mut lines = lines.into_iter();
        let mut output: Vec<String> = lines.by_ref().take(1).collect();
        if self.verbose {
            output.extend(notes.iter().map(|note| format!("  {note}")));
        }
        output.extend(lines);
        let mut lines = output;

        let fresh: Vec<String> = self
            .telemetry
            .oldest_first()
            .filter(|record| record.id >= self.reported_up_to)
            .map(describe_record)
            .collect();
        self.reported_up_to = self.telemetry.next_id();
        lines.extend(fresh);

        if let Some(transcript) = self.transcript.as_mut() {
            for note in &notes {
                transcript.append_line(self.host.ticks(), TranscriptRole::Hardware, note)?;
            }
            for line in &lines {
                transcript.append_line(self.host.ticks(), TranscriptRole::Node, line)?;
            }
        }
        Ok(lines)
    }
}

/// Routes each AT exchange into the host's event notes.
pub struct ExchangeLog<'h> {
    host: &'h Host,
}

impl ExchangeObserver for ExchangeLog<'_> {
    fn on_exchange(&mut self, command: &str, reply: &[u8], outcome: Result<(), AtError>) {
        self.host.note(format!(">> {command}"));
        for line in String::from_utf8_lossy(reply)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
        {
            self.host.note(format!("<< {line}"));
        }
        if let Err(error) = outcome {
            self.host.note(format!("!! {error}"));
        }
    }
}

fn describe_cycle(
    report: &CycleReport,
    failure: Option<StepFailure>,
    reply: Option<&str>,
) -> Vec<String> {
    let mut lines: Vec<String> = report
        .trace
        .iter()
        .map(|step| {
            format!(
                "{:<32} {}",
                step.state.label(),
                if step.succeeded { "OK" } else { "FAIL" }
            )
        })
        .collect();
    let traced = u32::try_from(report.trace.len()).unwrap_or(u32::MAX);
    if report.steps > traced {
        lines.push(format!("... {} more steps", report.steps - traced));
    }
    lines.push(format!(
        "cycle {}: {} transitions, {} retries, final state {}",
        report.outcome, report.transitions, report.retries, report.final_state
    ));
    if let Some(failure) = failure {
        lines.push(format!(
            "last failure in {}: {}",
            failure.state, failure.error
        ));
    }
    if let Some(reply) = reply {
        lines.push(format!("server replied: {reply}"));
    }
    lines
}

fn describe_record(record: &TelemetryRecord<Millis>) -> String {
    let detail = match record.details {
        TelemetryPayload::None => String::new(),
        TelemetryPayload::Step(step) => format!(
            " ok={} retries={}{}",
            step.succeeded,
            step.retries,
            step.elapsed_since_previous
                .map_or_else(String::new, |elapsed| format!(" +{}ms", elapsed.as_millis()))
        ),
        TelemetryPayload::Cycle(cycle) => format!(
            " transitions={} retries={} final={:?} took={}ms",
            cycle.transitions,
            cycle.retries,
            cycle.final_state,
            cycle.duration.as_millis()
        ),
        TelemetryPayload::Probe(probe) => {
            format!(" passed={} failed={}", probe.passed, probe.failed)
        }
        TelemetryPayload::Alarm(at) => format!(" at={at}"),
        TelemetryPayload::AlarmError(error) => format!(" error={error}"),
    };
    format!(
        "[{:>8} ms] #{:<4} {}{detail}",
        record.timestamp.0, record.id, record.event
    )
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Sensor node emulator transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are node ticks; the tick stops while the node sleeps"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, ticks: u32, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(self.writer, "[+{ticks:>8} ms] {} {line}", role.prefix())?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Node,
    Hardware,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Node => "NODE|",
            TranscriptRole::Hardware => "HW  |",
        }
    }
}
