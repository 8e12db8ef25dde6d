use defmt::Display2Format;
use node_core::calendar::Calendar;
use node_core::config::NodeConfig;
use node_core::diagnostics::run_probe;
use node_core::lifecycle::{CycleContext, NodeOperations, run_cycle};
use node_core::modem::Modem;
use node_core::power::{PowerSequencer, sleep_cycle};
use node_core::status::NodeStatus;
use node_core::telemetry::{EventId, Millis, TelemetryRecorder};
use node_core::time::Monotonic;

use super::alarm::ALARM_WAKE;
use super::exchange_log::ExchangeLog;
use crate::hw::power::StopMode;
use crate::hw::rtc::PacRtc;
use crate::hw::tick::{SysTickClock, SysTickGate};
use crate::hw::uart::UartTransport;
use crate::telemetry;

pub type NodeModem = Modem<'static, UartTransport, SysTickClock, ExchangeLog>;

/// The control thread: boot once, then wake, report and sleep forever.
pub struct Node {
    modem: NodeModem,
    calendar: Calendar<PacRtc>,
    sequencer: PowerSequencer<StopMode, SysTickGate>,
    status: NodeStatus,
    telemetry: TelemetryRecorder<Millis>,
    config: NodeConfig,
    reported_up_to: EventId,
}

impl Node {
    #[must_use]
    pub fn new(modem: NodeModem, config: NodeConfig) -> Self {
        Self {
            modem,
            calendar: Calendar::new(PacRtc::new()),
            sequencer: PowerSequencer::new(StopMode, SysTickGate),
            status: NodeStatus::new(),
            telemetry: TelemetryRecorder::new(),
            config,
            reported_up_to: 0,
        }
    }

    pub fn run(mut self) -> ! {
        self.boot();
        let mut cycle: u32 = 0;
        loop {
            cycle = cycle.wrapping_add(1);
            self.wake_period(cycle);
        }
    }

    fn boot(&mut self) {
        match self.calendar.init(&self.config.initial_calendar) {
            Ok(report) => match report.into_result() {
                Ok(()) => defmt::info!(
                    "rtc: running from {}",
                    Display2Format(&self.calendar.now())
                ),
                Err(error) => defmt::warn!(
                    "rtc: initial calendar partly rejected: {}",
                    Display2Format(&error)
                ),
            },
            Err(error) => defmt::error!("rtc: init failed: {}", Display2Format(&error)),
        }

        let report = run_probe(&mut self.modem, &mut self.status, &self.config);
        if report.woke_modem {
            defmt::info!("probe: modem woken from sleep");
        }
        defmt::info!("probe:\n{}", Display2Format(&report));
        defmt::info!(
            "probe: {} passed, {} failed",
            report.passed(),
            report.failed()
        );
        let now = Self::now();
        self.telemetry
            .record_probe(report.passed(), report.failed(), now);
        self.drain_telemetry();
    }

    fn wake_period(&mut self, cycle: u32) {
        defmt::info!(
            "cycle {}: awake at {}",
            cycle,
            Display2Format(&self.calendar.now())
        );

        if let Err(error) = self.modem.query_status(&mut self.status) {
            defmt::warn!("cycle {}: status query failed: {}", cycle, Display2Format(&error));
        }

        let report = {
            let mut ops = NodeOperations::new(&mut self.modem, &mut self.calendar);
            let mut ctx = CycleContext {
                status: &mut self.status,
                config: &self.config,
                clock: &SysTickClock,
                telemetry: &mut self.telemetry,
            };
            let report = run_cycle(&mut ops, &mut ctx, self.config.max_retries);
            if let Some(failure) = ops.last_failure() {
                defmt::warn!(
                    "cycle {}: last failure in {=str}: {}",
                    cycle,
                    failure.state.label(),
                    Display2Format(&failure.error)
                );
            }
            if let Some(reply) = ops.last_reply() {
                defmt::info!("cycle {}: server replied {=str}", cycle, reply);
            }
            report
        };
        defmt::info!(
            "cycle {}: {} with {} transitions, {} retries, final state {=str}",
            cycle,
            Display2Format(&report.outcome),
            report.transitions,
            report.retries,
            report.final_state.label()
        );

        let alarm = sleep_cycle(
            &mut self.sequencer,
            &mut self.calendar,
            &ALARM_WAKE,
            self.config.sleep_interval_secs,
        );
        let now = Self::now();
        self.telemetry.record_alarm(alarm, now);
        match alarm {
            Ok(at) => {
                self.telemetry.record_wake(now);
                defmt::info!("cycle {}: woke at {}", cycle, Display2Format(&at));
            }
            Err(error) => defmt::error!(
                "cycle {}: alarm not armed, staying awake: {}",
                cycle,
                Display2Format(&error)
            ),
        }
        self.drain_telemetry();
    }

    fn now() -> Millis {
        Millis(SysTickClock.now_ms())
    }

    fn drain_telemetry(&mut self) {
        self.reported_up_to = telemetry::drain(&self.telemetry, self.reported_up_to);
    }
}
