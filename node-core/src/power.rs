//! Sleep and wake hand-off between cycles.
//!
//! The tick interrupt is gated off for the whole sleep, so the tick counter
//! does not advance while the node is halted and deadlines must never span
//! a sleep.

use portable_atomic::{AtomicBool, Ordering};

use crate::calendar::{Calendar, CalendarError, RtcRegisters, TimeOfDay};

/// Periodic tick interrupt control.
pub trait TickGate {
    fn disable_tick(&mut self);
    fn enable_tick(&mut self);
}

/// Low-power entry and exit for the processor and its peripherals.
pub trait PowerControl {
    /// Puts unused peripherals and pins in their lowest-power state.
    fn quiesce_peripherals(&mut self);
    /// Brings the system clock back after stop mode.
    fn restore_clocks(&mut self);
    fn resume_peripherals(&mut self);
    /// Enters the deepest halt that an RTC alarm can end; returns after the
    /// next interrupt.
    fn enter_stop_mode(&mut self);
}

pub struct PowerSequencer<P, G> {
    control: P,
    tick: G,
}

impl<P, G> PowerSequencer<P, G>
where
    P: PowerControl,
    G: TickGate,
{
    #[must_use]
    pub const fn new(control: P, tick: G) -> Self {
        Self { control, tick }
    }

    pub fn control_mut(&mut self) -> &mut P {
        &mut self.control
    }

    pub fn prepare(&mut self) {
        self.control.quiesce_peripherals();
    }

    /// Halts until an interrupt arrives.
    pub fn sleep(&mut self) {
        self.tick.disable_tick();
        self.control.enter_stop_mode();
    }

    pub fn wake(&mut self) {
        self.control.restore_clocks();
        self.control.resume_peripherals();
        self.tick.enable_tick();
    }
}

/// Alarm interrupt handling, shared between the interrupt and the main loop.
pub struct AlarmWake {
    fired: AtomicBool,
}

impl AlarmWake {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Interrupt body: acknowledges the alarm and wakes the node.
    ///
    /// Returns `false` without waking when no alarm was pending.
    pub fn on_interrupt<R, P, G>(
        &self,
        calendar: &mut Calendar<R>,
        sequencer: &mut PowerSequencer<P, G>,
    ) -> bool
    where
        R: RtcRegisters,
        P: PowerControl,
        G: TickGate,
    {
        if !calendar.acknowledge_alarm() {
            return false;
        }
        sequencer.wake();
        self.fired.store(true, Ordering::Release);
        true
    }

    pub fn clear(&self) {
        self.fired.store(false, Ordering::Release);
    }

    /// Returns whether an alarm woke the node since the last call.
    #[must_use]
    pub fn take(&self) -> bool {
        self.fired.swap(false, Ordering::AcqRel)
    }
}

impl Default for AlarmWake {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps for `seconds` of calendar time.
///
/// Arms the RTC alarm, then halts until [`AlarmWake`] reports the alarm;
/// other interrupts put the node straight back to sleep. When the alarm
/// cannot be armed the tick is restored and the node does not halt.
///
/// # Errors
///
/// Returns the [`CalendarError`] from arming the alarm.
pub fn sleep_cycle<R, P, G>(
    sequencer: &mut PowerSequencer<P, G>,
    calendar: &mut Calendar<R>,
    wake: &AlarmWake,
    seconds: u32,
) -> Result<TimeOfDay, CalendarError>
where
    R: RtcRegisters,
    P: PowerControl,
    G: TickGate,
{
    sequencer.tick.disable_tick();
    let alarm = match calendar.schedule_alarm(seconds) {
        Ok(alarm) => alarm,
        Err(error) => {
            sequencer.tick.enable_tick();
            return Err(error);
        }
    };

    wake.clear();
    sequencer.prepare();
    while !wake.take() {
        sequencer.sleep();
    }
    Ok(alarm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: heapless::Vec<&'static str, 16>,
    }

    impl Recorder {
        fn log(&mut self, call: &'static str) {
            self.calls.push(call).expect("capacity");
        }
    }

    impl PowerControl for Recorder {
        fn quiesce_peripherals(&mut self) {
            self.log("quiesce");
        }
        fn restore_clocks(&mut self) {
            self.log("clocks");
        }
        fn resume_peripherals(&mut self) {
            self.log("resume");
        }
        fn enter_stop_mode(&mut self) {
            self.log("stop");
        }
    }

    #[derive(Default)]
    struct Tick {
        enabled: bool,
    }

    impl TickGate for Tick {
        fn disable_tick(&mut self) {
            self.enabled = false;
        }
        fn enable_tick(&mut self) {
            self.enabled = true;
        }
    }

    #[test]
    fn sleep_gates_tick_before_halting() {
        let mut sequencer = PowerSequencer::new(Recorder::default(), Tick { enabled: true });
        sequencer.prepare();
        sequencer.sleep();
        assert!(!sequencer.tick.enabled);
        sequencer.wake();
        assert!(sequencer.tick.enabled);
        assert_eq!(
            sequencer.control.calls.as_slice(),
            &["quiesce", "stop", "clocks", "resume"]
        );
    }

    #[test]
    fn wake_flag_is_consumed_once() {
        let wake = AlarmWake::new();
        wake.fired.store(true, Ordering::Release);
        assert!(wake.take());
        assert!(!wake.take());
    }
}
