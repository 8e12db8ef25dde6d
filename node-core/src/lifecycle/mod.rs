//! Connection lifecycle for one wake period.
//!
//! A pass walks modem bring-up, time sync, socket open/send/receive/close and
//! modem power-down. Every state has one successor on success and one on
//! failure; failures draw on a shared retry budget and the pass ends either
//! at [`ConnectionState::Stop`] or when the budget is spent.

mod operations;

use core::fmt;

use heapless::Vec;

pub use operations::{NodeOperations, StepFailure};

use crate::config::NodeConfig;
use crate::status::NodeStatus;
use crate::telemetry::{Millis, TelemetryRecorder};
use crate::time::Monotonic;

/// Steps retained in a [`CycleReport`] trace.
pub const MAX_TRACE: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    ModemInit,
    ReadTime,
    OpenSocket,
    Send,
    Receive,
    Close,
    PowerDown,
    Stop,
}

impl ConnectionState {
    #[must_use]
    pub const fn on_success(self) -> Self {
        match self {
            ConnectionState::ModemInit => ConnectionState::ReadTime,
            ConnectionState::ReadTime => ConnectionState::OpenSocket,
            ConnectionState::OpenSocket => ConnectionState::Send,
            ConnectionState::Send => ConnectionState::Receive,
            ConnectionState::Receive => ConnectionState::Close,
            ConnectionState::Close => ConnectionState::PowerDown,
            ConnectionState::PowerDown | ConnectionState::Stop => ConnectionState::Stop,
        }
    }

    /// A failed receive retries the send; a failed close retries the open.
    #[must_use]
    pub const fn on_failure(self) -> Self {
        match self {
            ConnectionState::ModemInit => ConnectionState::PowerDown,
            ConnectionState::ReadTime | ConnectionState::PowerDown => ConnectionState::ModemInit,
            ConnectionState::OpenSocket | ConnectionState::Send => ConnectionState::Close,
            ConnectionState::Receive => ConnectionState::Send,
            ConnectionState::Close => ConnectionState::OpenSocket,
            ConnectionState::Stop => ConnectionState::Stop,
        }
    }

    /// Numbered label used in the diagnostic log.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ConnectionState::ModemInit => "[0] WIFI CONNECTION",
            ConnectionState::ReadTime => "[1] READ TIME FROM NTP SERVER",
            ConnectionState::OpenSocket => "[2] OPEN UDP CONNECTION",
            ConnectionState::Send => "[3] SEND UDP DATA",
            ConnectionState::Receive => "[4] RECEIVE UDP DATA",
            ConnectionState::Close => "[5] CLOSE CONNECTION",
            ConnectionState::PowerDown => "[6] POWER DOWN",
            ConnectionState::Stop => "[7] STOP",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a pass ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    Completed,
    RetriesExhausted,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleOutcome::Completed => "completed",
            CycleOutcome::RetriesExhausted => "retries exhausted",
        })
    }
}

/// One executed state and its result.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StepRecord {
    pub state: ConnectionState,
    pub succeeded: bool,
}

/// Summary of one lifecycle pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CycleReport {
    /// State changes taken, successful or not.
    pub transitions: u32,
    pub retries: u32,
    /// `Stop` when completed, otherwise the state whose step exhausted the
    /// budget.
    pub final_state: ConnectionState,
    pub outcome: CycleOutcome,
    /// First [`MAX_TRACE`] executed steps.
    pub trace: Vec<StepRecord, MAX_TRACE>,
    /// Steps executed, including any beyond the trace.
    pub steps: u32,
}

impl CycleReport {
    const fn new() -> Self {
        Self {
            transitions: 0,
            retries: 0,
            final_state: ConnectionState::ModemInit,
            outcome: CycleOutcome::Completed,
            trace: Vec::new(),
            steps: 0,
        }
    }

    fn push_step(&mut self, state: ConnectionState, succeeded: bool) {
        self.steps += 1;
        // The trace is best effort once full.
        let _ = self.trace.push(StepRecord { state, succeeded });
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Completed)
    }
}

/// Shared state handed to every step of a pass.
pub struct CycleContext<'a, C> {
    pub status: &'a mut NodeStatus,
    pub config: &'a NodeConfig,
    pub clock: &'a C,
    pub telemetry: &'a mut TelemetryRecorder<Millis>,
}

impl<C> CycleContext<'_, C>
where
    C: Monotonic,
{
    #[must_use]
    pub fn now(&self) -> Millis {
        Millis(self.clock.now_ms())
    }
}

/// Work performed in each state.
pub trait StateOperations {
    /// Runs the work for `state`; `true` on success.
    fn execute<C: Monotonic>(
        &mut self,
        state: ConnectionState,
        ctx: &mut CycleContext<'_, C>,
    ) -> bool;
}

/// Runs one lifecycle pass starting at [`ConnectionState::ModemInit`].
///
/// The retry budget is checked after each step runs and before its result
/// is applied, so the step that meets `max_retries` is executed but leads
/// nowhere.
pub fn run_cycle<O, C>(
    ops: &mut O,
    ctx: &mut CycleContext<'_, C>,
    max_retries: u32,
) -> CycleReport
where
    O: StateOperations,
    C: Monotonic,
{
    let started_at = ctx.now();
    let mut report = CycleReport::new();
    let mut current = ConnectionState::ModemInit;

    loop {
        let succeeded = ops.execute(current, ctx);
        report.push_step(current, succeeded);
        let now = ctx.now();
        ctx.telemetry.record_step(current, succeeded, report.retries, now);

        if report.retries == max_retries {
            report.outcome = CycleOutcome::RetriesExhausted;
            break;
        }

        current = if succeeded {
            current.on_success()
        } else {
            report.retries += 1;
            current.on_failure()
        };
        report.transitions += 1;

        if current == ConnectionState::Stop {
            report.outcome = CycleOutcome::Completed;
            break;
        }
    }

    report.final_state = current;
    let now = ctx.now();
    ctx.telemetry.record_cycle(&report, started_at, now);
    report
}
