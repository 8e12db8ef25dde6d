use super::{ConnectionState, CycleContext, StateOperations};
use crate::at::schema::FieldText;
use crate::at::{ExchangeObserver, Transport};
use crate::calendar::{Calendar, RtcRegisters};
use crate::modem::{Modem, ModemError};
use crate::time::Monotonic;

/// Why the last failed step failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StepFailure {
    pub state: ConnectionState,
    pub error: ModemError,
}

/// Lifecycle steps backed by the modem driver and the RTC.
pub struct NodeOperations<'m, 'r, T, MC, O, R, const N: usize> {
    modem: &'m mut Modem<'r, T, MC, O, N>,
    calendar: &'m mut Calendar<R>,
    last_reply: Option<FieldText>,
    last_failure: Option<StepFailure>,
}

impl<'m, 'r, T, MC, O, R, const N: usize> NodeOperations<'m, 'r, T, MC, O, R, N>
where
    T: Transport,
    MC: Monotonic,
    O: ExchangeObserver,
    R: RtcRegisters,
{
    #[must_use]
    pub fn new(modem: &'m mut Modem<'r, T, MC, O, N>, calendar: &'m mut Calendar<R>) -> Self {
        Self {
            modem,
            calendar,
            last_reply: None,
            last_failure: None,
        }
    }

    /// Data the server sent back during this pass, if any.
    #[must_use]
    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    #[must_use]
    pub fn last_failure(&self) -> Option<StepFailure> {
        self.last_failure
    }

    fn step<C: Monotonic>(
        &mut self,
        state: ConnectionState,
        ctx: &mut CycleContext<'_, C>,
    ) -> Result<(), ModemError> {
        match state {
            ConnectionState::ModemInit => self.modem.join_network(ctx.status, ctx.config),
            ConnectionState::ReadTime => {
                let time = self.modem.sync_time(ctx.config)?;
                self.calendar.set(&time)?.into_result()?;
                Ok(())
            }
            ConnectionState::OpenSocket => self.modem.open_socket(ctx.config),
            ConnectionState::Send => self.modem.send_telemetry(ctx.status).map(|_| ()),
            ConnectionState::Receive => {
                self.last_reply = Some(self.modem.receive()?);
                Ok(())
            }
            ConnectionState::Close => self.modem.close_socket(),
            ConnectionState::PowerDown => self.modem.power_down(),
            ConnectionState::Stop => Ok(()),
        }
    }
}

impl<T, MC, O, R, const N: usize> StateOperations for NodeOperations<'_, '_, T, MC, O, R, N>
where
    T: Transport,
    MC: Monotonic,
    O: ExchangeObserver,
    R: RtcRegisters,
{
    fn execute<C: Monotonic>(
        &mut self,
        state: ConnectionState,
        ctx: &mut CycleContext<'_, C>,
    ) -> bool {
        match self.step(state, ctx) {
            Ok(()) => true,
            Err(error) => {
                self.last_failure = Some(StepFailure { state, error });
                false
            }
        }
    }
}
